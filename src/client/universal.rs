//! Universal client for OpenAI-compatible providers.
//!
//! Serves openai, deepseek, moonshot, zhipu, baichuan, custom deployments,
//! and Ollama (which exposes the same chat-completions surface). Provider
//! differences are confined to the base URL, the auth header, and the
//! health-probe path; the request/response shapes are shared.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ProviderClient, ProviderKind};
use crate::telemetry;
use crate::types::{
    GenerateRequest, GenerateResponse, HealthStatus, ModelInfo, ProviderCapabilities, Usage,
};
use crate::{Result, SqlForgeError};

/// Construction parameters for [`UniversalClient`].
#[derive(Debug, Clone)]
pub struct UniversalClientConfig {
    /// Registry name, e.g. the service name from configuration.
    pub name: String,
    pub kind: ProviderKind,
    /// Normalized base URL (no trailing slash).
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Token cap applied when the request carries none.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    /// Catalog-sourced model listing reported by `capabilities`.
    pub models: Vec<ModelInfo>,
}

/// OpenAI-compatible provider client.
pub struct UniversalClient {
    config: UniversalClientConfig,
    http: reqwest::Client,
}

impl UniversalClient {
    pub fn new(config: UniversalClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SqlForgeError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Compose an API URL. Bases that already end in a version segment
    /// (`/v1`, `/v4`, ...) get the path appended directly; others get the
    /// standard `/v1/` prefix. Combined with endpoint normalization in the
    /// factory this keeps path building idempotent.
    fn endpoint_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base_has_version_segment(base) {
            format!("{base}/{path}")
        } else {
            format!("{base}/v1/{path}")
        }
    }

    fn tags_url(&self) -> String {
        format!(
            "{}/api/tags",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Query a running Ollama daemon for its installed models.
    async fn ollama_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self.http.get(self.tags_url()).send().await?;
        if !response.status().is_success() {
            return Err(SqlForgeError::Api {
                status: response.status().as_u16(),
                message: "tags query failed".into(),
            });
        }
        let tags: OllamaTags = response.json().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                display_name: m.name.clone(),
                id: m.name,
                description: "local model".into(),
                context_window: 8_192,
                input_cost_per_1k: 0.0,
                output_cost_per_1k: 0.0,
                tags: vec!["local".into(), "chat".into()],
            })
            .collect())
    }
}

/// Whether the last path segment looks like an API version (`v1`, `v4`, ...).
fn base_has_version_segment(base: &str) -> bool {
    base.rsplit('/')
        .next()
        .is_some_and(|segment| {
            let mut chars = segment.chars();
            chars.next() == Some('v') && chars.clone().next().is_some() && chars.all(|c| c.is_ascii_digit())
        })
}

#[async_trait]
impl ProviderClient for UniversalClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: request
                .max_tokens
                .or(self.config.max_tokens)
                .unwrap_or(2_048),
            temperature: request.temperature.or(self.config.temperature),
        };

        let started = Instant::now();
        let response = self
            .authorize(self.http.post(self.endpoint_url("chat/completions")))
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
                    message: truncate(&message, 512),
                },
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if text.is_empty() {
            // Tagged retryable: empty completions usually heal on retry.
            return Err(SqlForgeError::transient("empty response from model"));
        }

        let usage = completion
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
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
        let models = if self.config.kind == ProviderKind::Ollama {
            // Prefer the live listing; fall back to the catalog rows.
            match self.ollama_models().await {
                Ok(models) if !models.is_empty() => models,
                _ => self.config.models.clone(),
            }
        } else {
            self.config.models.clone()
        };
        Ok(ProviderCapabilities {
            models,
            features: vec![
                "generate".into(),
                "sql-generation".into(),
                "health-check".into(),
            ],
            rate_limits: None,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        let url = if self.config.kind == ProviderKind::Ollama {
            self.tags_url()
        } else {
            self.endpoint_url("models")
        };
        let started = Instant::now();
        let response = self.authorize(self.http.get(url)).send().await?;
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
        // The HTTP pool is dropped with the client; nothing external held.
        debug!(client = %self.config.name, "closing universal client");
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTagModel>,
}

#[derive(Deserialize)]
struct OllamaTagModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_segment_detection() {
        assert!(base_has_version_segment("https://api.openai.com/v1"));
        assert!(base_has_version_segment("https://open.bigmodel.cn/api/paas/v4"));
        assert!(!base_has_version_segment("http://localhost:11434"));
        assert!(!base_has_version_segment("https://api.example.com/vault"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
