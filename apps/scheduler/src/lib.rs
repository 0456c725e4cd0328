//! Scheduler Service
//!
//! Launches the adaptive job scheduling engine: wires an in-process data
//! store, an HTTP-backed reasoner provider, and an HTTP endpoint caller
//! into the engine, starts its periodic cycle, and serves a health/metrics
//! endpoint alongside it.
//!
//! ## Architecture
//!
//! ```text
//! InMemoryDataStoreGateway ─┐
//! HttpReasonerProvider ─────┼─▶ EngineLifecycle ──▶ CycleOrchestrator ──▶ JobProcessor
//! ReqwestEndpointCaller ────┘
//! ```
//!
//! ## Features
//!
//! - Structured, env-aware logging (JSON for prod, pretty for dev)
//! - Prometheus metrics at `/metrics`
//! - Liveness/readiness probes at `/health`, `/ready`
//! - Graceful shutdown handling (SIGINT/SIGTERM)

use axum::Router;
use core_config::{env_or_default, Environment, FromEnv};
use domain_scheduler_jobs::{HttpReasonerProvider, InMemoryDataStoreGateway, ReqwestEndpointCaller};
use eyre::{Result, WrapErr};
use scheduler_engine::{
    health_router, CircuitRegistry, CycleOrchestrator, CycleOrchestratorConfig, EndpointExecutor,
    EngineConfig, EngineLifecycle, ExponentialBackoffPolicy, HealthState, JobProcessor,
    JobProcessorConfig, NullEvents, ReasonerGateway, TracingEvents,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Static app identity surfaced on the `/health` endpoint.
struct AppInfo {
    name: &'static str,
    version: &'static str,
}

const APP_INFO: AppInfo = AppInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
};

async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the scheduler service.
///
/// This is the main entry point. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Loads the engine configuration from the environment
/// 3. Wires the data store, reasoner, and endpoint caller into the engine
/// 4. Starts the engine's periodic cycle and the health server, with
///    graceful shutdown handling
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    scheduler_engine::metrics::init_metrics();

    info!(name = %APP_INFO.name, version = %APP_INFO.version, "Starting scheduler service");
    info!("Environment: {:?}", environment);

    let health_port: u16 = std::env::var("SCHEDULER_HEALTH_PORT")
        .or_else(|_| std::env::var("HEALTH_PORT"))
        .unwrap_or_else(|_| "8082".to_string())
        .parse()
        .unwrap_or(8082);

    let engine_config = EngineConfig::from_env().wrap_err("Failed to load engine configuration")?;
    info!(
        model = %engine_config.ai_agent.model,
        max_batch_size = %engine_config.scheduler.max_batch_size,
        processing_interval_ms = %engine_config.scheduler.processing_interval_ms,
        job_processing_concurrency = %engine_config.scheduler.job_processing_concurrency,
        "Engine configuration loaded"
    );

    let reasoner_url = env_or_default("REASONER_ENDPOINT_URL", "http://localhost:4000/invoke");

    let store: Arc<dyn scheduler_engine::DataStoreGateway> =
        Arc::new(InMemoryDataStoreGateway::new());
    let reasoner_provider: Arc<dyn scheduler_engine::ReasonerProvider> = Arc::new(
        HttpReasonerProvider::new(reasoner_url, engine_config.ai_agent.model.clone(), engine_config.ai_agent.temperature),
    );
    let endpoint_caller: Arc<dyn scheduler_engine::EndpointCaller> =
        Arc::new(ReqwestEndpointCaller::new().wrap_err("Failed to build endpoint caller")?);

    let events: Arc<dyn scheduler_engine::EngineEvents> = Arc::new(TracingEvents);

    let reasoner = Arc::new(ReasonerGateway::new(
        reasoner_provider,
        engine_config.ai_agent.as_reasoner_gateway_config(),
        Arc::clone(&events),
    ));

    let circuits = Arc::new(CircuitRegistry::new(engine_config.circuit_breaker.clone()));
    let retry_policy: Arc<dyn scheduler_engine::RetryPolicy> =
        Arc::new(ExponentialBackoffPolicy::default());
    let executor = Arc::new(EndpointExecutor::new(
        endpoint_caller,
        circuits,
        retry_policy,
        engine_config.execution.clone(),
        Arc::clone(&events),
    ));

    let processor = Arc::new(JobProcessor::new(
        Arc::clone(&store),
        reasoner,
        executor,
        JobProcessorConfig {
            stale_lock_threshold_ms: engine_config.scheduler.stale_lock_threshold_ms,
            allow_cancellation: engine_config.allow_cancellation,
            escalation_thresholds: engine_config.escalation,
        },
    ));

    let orchestrator = Arc::new(CycleOrchestrator::new(
        Arc::clone(&store),
        processor,
        events,
        CycleOrchestratorConfig {
            max_batch_size: engine_config.scheduler.max_batch_size,
            job_processing_concurrency: engine_config.scheduler.job_processing_concurrency,
        },
    ));

    let lifecycle = Arc::new(EngineLifecycle::new(
        orchestrator,
        engine_config.scheduler.processing_interval_ms,
    ));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        Arc::clone(&store),
        Arc::clone(&lifecycle),
        APP_INFO.name,
        APP_INFO.version,
    );

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Starting engine lifecycle...");
    lifecycle.start().await.map_err(|e| eyre::eyre!("{}", e))?;

    let _ = shutdown_rx.changed().await;
    info!("Shutdown signal received, stopping engine...");
    lifecycle.stop().await.map_err(|e| eyre::eyre!("{}", e))?;

    info!("Scheduler service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
