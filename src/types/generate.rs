//! Types for provider-facing text generation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single generation request dispatched to a provider client.
///
/// Immutable per call: the manager and the retry engine may dispatch the
/// same request several times, so nothing in here is mutated in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Natural-language prompt. Must be non-empty UTF-8.
    pub prompt: String,

    /// Optional system prompt prepended by the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model override; falls back to the client's configured model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-request token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    /// Create a request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Set the model override.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the per-request token cap.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Usage with a consistent total.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Response from a provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text.
    pub text: String,

    /// Tokens the provider billed for this call.
    pub usage: Usage,

    /// Model the provider actually used.
    pub model: String,

    /// Provider- or client-assigned request id.
    pub request_id: String,

    /// Confidence score in `[0, 1]`.
    pub confidence: f32,

    /// Wall-clock time the provider call took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = GenerateRequest::new("list users")
            .system_prompt("you generate sql")
            .model("gpt-4o-mini")
            .max_tokens(512)
            .temperature(0.2);
        assert_eq!(req.prompt, "list users");
        assert_eq!(req.system_prompt.as_deref(), Some("you generate sql"));
        assert_eq!(req.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.temperature, Some(0.2));
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = Usage::new(10, 32);
        assert_eq!(usage.total_tokens, 42);
    }
}
