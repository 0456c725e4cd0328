//! `reqwest`-backed implementation of `ReasonerProvider`: posts a
//! system/user prompt pair plus the expected JSON schema to a configured
//! HTTP endpoint and parses the structured response. The reasoning model
//! itself is out of scope; only the wire shape matters here.

use async_trait::async_trait;
use scheduler_engine::{EngineError, EngineResult, ProviderResponse, ProviderUsage, ReasonerProvider};
use serde::Deserialize;
use serde_json::Value;

pub struct HttpReasonerProvider {
    client: reqwest::Client,
    endpoint_url: String,
    model: String,
    temperature: f64,
}

impl HttpReasonerProvider {
    pub fn new(endpoint_url: impl Into<String>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_url: endpoint_url.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[derive(Deserialize)]
struct RawResponseUsage {
    #[serde(rename = "inputTokens", default)]
    input_tokens: u64,
    #[serde(rename = "outputTokens", default)]
    output_tokens: u64,
    #[serde(rename = "totalTokens", default)]
    total_tokens: u64,
    #[serde(rename = "reasoningTokens", default)]
    reasoning_tokens: Option<u64>,
    #[serde(rename = "cachedInputTokens", default)]
    cached_input_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct RawResponse {
    value: Value,
    #[serde(default)]
    usage: Option<RawResponseUsage>,
}

#[async_trait]
impl ReasonerProvider for HttpReasonerProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> EngineResult<ProviderResponse> {
        let payload = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "systemPrompt": system_prompt,
            "userPrompt": user_prompt,
            "schema": schema,
        });

        let response = self
            .client
            .post(&self.endpoint_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::ReasonerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::ReasonerUnavailable(format!(
                "reasoner endpoint returned {}",
                response.status()
            )));
        }

        let raw: RawResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ReasonerUnavailable(e.to_string()))?;

        Ok(ProviderResponse {
            value: raw.value,
            usage: raw.usage.map(|u| ProviderUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
                reasoning_tokens: u.reasoning_tokens,
                cached_input_tokens: u.cached_input_tokens,
            }),
        })
    }
}
