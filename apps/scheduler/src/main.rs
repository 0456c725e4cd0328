//! Scheduler Service - Entry Point
//!
//! Runs the adaptive job scheduling engine as a standalone process.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    scheduler::run().await
}
