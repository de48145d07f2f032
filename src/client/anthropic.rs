//! Anthropic-compatible provider client.
//!
//! Anthropic's messages API differs from the OpenAI shape in three ways
//! that matter here: auth rides in `x-api-key` (plus a pinned
//! `anthropic-version` header), the system prompt is a top-level field,
//! and completions come back as a content-block list.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::ProviderClient;
use crate::telemetry;
use crate::types::{
    GenerateRequest, GenerateResponse, HealthStatus, ModelInfo, ProviderCapabilities, Usage,
};
use crate::{Result, SqlForgeError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Construction parameters for [`AnthropicClient`].
#[derive(Debug, Clone)]
pub struct AnthropicClientConfig {
    pub name: String,
    /// Normalized base URL (no trailing slash).
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    pub models: Vec<ModelInfo>,
}

/// Anthropic messages-API client.
pub struct AnthropicClient {
    config: AnthropicClientConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SqlForgeError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("anthropic-version", ANTHROPIC_VERSION);
        match &self.config.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let body = MessagesRequest {
            model,
            // Anthropic requires the cap; fall back to a generous default.
            max_tokens: request
                .max_tokens
                .or(self.config.max_tokens)
                .unwrap_or(2_048),
            system: request.system_prompt.as_deref(),
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature.or(self.config.temperature),
        };

        let started = Instant::now();
        let response = self
            .headers(self.http.post(self.url("messages")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => SqlForgeError::AuthenticationFailed,
                429 => SqlForgeError::RateLimited,
                code => SqlForgeError::Api {
                    status: code,
                    message,
                },
            });
        }

        let completion: MessagesResponse = response.json().await?;
        let text: String = completion
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(SqlForgeError::transient("empty response from model"));
        }

        let usage = completion
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => self.config.name.clone(), "direction" => "prompt")
        .increment(u64::from(usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => self.config.name.clone(), "direction" => "completion")
        .increment(u64::from(usage.completion_tokens));

        Ok(GenerateResponse {
            text,
            usage,
            model: completion.model.unwrap_or_else(|| model.to_string()),
            request_id: completion
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            confidence: 1.0,
            processing_time: Some(started.elapsed()),
        })
    }

    async fn capabilities(&self) -> Result<ProviderCapabilities> {
        Ok(ProviderCapabilities {
            models: self.config.models.clone(),
            features: vec![
                "generate".into(),
                "sql-generation".into(),
                "health-check".into(),
            ],
            rate_limits: None,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        let started = Instant::now();
        let response = self.headers(self.http.get(self.url("models"))).send().await?;
        let elapsed = started.elapsed();
        if response.status().is_success() {
            Ok(HealthStatus::healthy("ok", elapsed))
        } else {
            Ok(HealthStatus::unhealthy(
                format!("http {}", response.status().as_u16()),
                elapsed,
            ))
        }
    }

    async fn close(&self) -> Result<()> {
        debug!(client = %self.config.name, "closing anthropic client");
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
