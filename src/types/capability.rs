//! Provider capability and health reporting types.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Description of a single model a provider can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider-scoped model identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Context window in tokens.
    pub context_window: u32,
    /// Cost per 1K input tokens, in USD. Zero when unknown.
    #[serde(default)]
    pub input_cost_per_1k: f64,
    /// Cost per 1K output tokens, in USD. Zero when unknown.
    #[serde(default)]
    pub output_cost_per_1k: f64,
    /// Capability tags such as "chat" or "sql".
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ModelInfo {
    /// Whether either per-1K cost is known.
    pub fn has_cost_info(&self) -> bool {
        self.input_cost_per_1k > 0.0 || self.output_cost_per_1k > 0.0
    }
}

/// Declared rate limits for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
}

/// Capability record reported by a provider client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Models the provider can serve.
    pub models: Vec<ModelInfo>,
    /// Declared feature flags ("chat", "sql-generation", ...).
    pub features: Vec<String>,
    /// Declared rate limits, when the provider publishes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimits>,
}

/// Outcome of a health probe against a single client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Free-form status string ("ok", "offline", an error message).
    pub status: String,
    /// Measured round-trip time of the probe.
    pub response_time: Duration,
    /// When the probe ran.
    pub checked_at: SystemTime,
    /// Error details, when any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl HealthStatus {
    /// A successful probe result.
    pub fn healthy(status: impl Into<String>, response_time: Duration) -> Self {
        Self {
            healthy: true,
            status: status.into(),
            response_time,
            checked_at: SystemTime::now(),
            errors: Vec::new(),
        }
    }

    /// A failed probe result carrying the error text.
    pub fn unhealthy(status: impl Into<String>, response_time: Duration) -> Self {
        let status = status.into();
        Self {
            healthy: false,
            status: status.clone(),
            response_time,
            checked_at: SystemTime::now(),
            errors: vec![status],
        }
    }
}

/// One discovered provider, local (probed) or cloud (catalog-sourced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Registry name, e.g. "ollama" or "deepseek".
    pub name: String,
    /// Provider kind string accepted by the client factory.
    pub kind: String,
    /// Endpoint URL.
    pub endpoint: String,
    /// Whether the provider is currently usable. Local providers are
    /// probed; cloud providers are listed available and gated on keys.
    pub available: bool,
    /// Whether requests need an API key.
    pub requires_api_key: bool,
    /// Model identifiers known for this provider.
    #[serde(default)]
    pub models: Vec<String>,
}

/// Result of a one-off connection test against a provider config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    pub response_time: Duration,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
