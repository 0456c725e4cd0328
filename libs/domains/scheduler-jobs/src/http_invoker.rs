//! `reqwest`-backed implementation of `EndpointCaller`, the transport the
//! Endpoint Executor calls out through.

use async_trait::async_trait;
use scheduler_engine::{EndpointCaller, EngineError, EngineResult, HttpCallOutcome};
use std::collections::HashMap;
use std::time::Duration;

pub struct ReqwestEndpointCaller {
    client: reqwest::Client,
}

impl ReqwestEndpointCaller {
    pub fn new() -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for ReqwestEndpointCaller {
    fn default() -> Self {
        Self::new().expect("failed to build default reqwest client")
    }
}

#[async_trait]
impl EndpointCaller for ReqwestEndpointCaller {
    async fn call(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<serde_json::Value>,
        timeout: Duration,
        cancellation: Option<tokio::sync::watch::Receiver<bool>>,
    ) -> EngineResult<HttpCallOutcome> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let mut request = self.client.request(method, url).timeout(timeout);
        for (key, value) in &headers {
            request = request.header(key, value);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let send = request.send();

        let response = match cancellation {
            Some(mut cancellation) => tokio::select! {
                result = send => result,
                _ = wait_for_cancel(&mut cancellation) => {
                    return Err(EngineError::Aborted);
                }
            },
            None => send.await,
        };

        match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let is_timeout = false;
                let body = response.text().await.unwrap_or_default();
                Ok(HttpCallOutcome {
                    status_code: Some(status_code),
                    body,
                    is_timeout,
                })
            }
            Err(e) if e.is_timeout() => Ok(HttpCallOutcome {
                status_code: None,
                body: String::new(),
                is_timeout: true,
            }),
            Err(e) => Err(EngineError::EndpointTransport(e.to_string())),
        }
    }
}

async fn wait_for_cancel(rx: &mut tokio::sync::watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_default_client() {
        let _caller = ReqwestEndpointCaller::new().unwrap();
    }
}
