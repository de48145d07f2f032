//! Provider clients: the capability set, concrete transports, and the factory.
//!
//! Everything upstream (manager, balancer, generator) programs against
//! [`ProviderClient`], never against a concrete provider struct. A client
//! is scoped to its registry entry: whoever removes, replaces, or displaces
//! it calls [`ProviderClient::close`] exactly once.

mod anthropic;
mod factory;
mod universal;

use std::str::FromStr;

use async_trait::async_trait;

use crate::Result;
use crate::types::{GenerateRequest, GenerateResponse, HealthStatus, ProviderCapabilities};

pub use anthropic::{AnthropicClient, AnthropicClientConfig};
pub use factory::{ClientFactory, normalize_endpoint};
pub use universal::{UniversalClient, UniversalClientConfig};

/// The capability set every provider client implements.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The name this client was registered under; appears in logs and
    /// stats.
    fn name(&self) -> &str;

    /// Dispatch one generation request.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Report models, features, and limits.
    async fn capabilities(&self) -> Result<ProviderCapabilities>;

    /// Probe reachability. Transport failures are `Err`; a reachable but
    /// unhappy provider is `Ok` with `healthy: false`.
    async fn health_check(&self) -> Result<HealthStatus>;

    /// Release held resources. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Provider kinds the factory can build clients for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    /// `local` is accepted as an alias.
    Ollama,
    DeepSeek,
    Moonshot,
    Zhipu,
    Baichuan,
    /// Requires an explicit endpoint.
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::DeepSeek => "deepseek",
            Self::Moonshot => "moonshot",
            Self::Zhipu => "zhipu",
            Self::Baichuan => "baichuan",
            Self::Custom => "custom",
        }
    }

    /// Whether the kind speaks the OpenAI-compatible wire protocol and is
    /// served by [`UniversalClient`].
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self, Self::Anthropic)
    }

    /// Whether endpoint normalization strips a trailing `/v1`.
    ///
    /// Only OpenAI and DeepSeek publish bases both with and without the
    /// version segment; stripping keeps universal path building idempotent.
    pub(crate) fn strips_v1_suffix(&self) -> bool {
        matches!(self, Self::OpenAi | Self::DeepSeek)
    }
}

impl FromStr for ProviderKind {
    type Err = crate::SqlForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" | "local" => Ok(Self::Ollama),
            "deepseek" => Ok(Self::DeepSeek),
            "moonshot" => Ok(Self::Moonshot),
            "zhipu" => Ok(Self::Zhipu),
            "baichuan" => Ok(Self::Baichuan),
            "custom" => Ok(Self::Custom),
            other => Err(crate::SqlForgeError::ProviderNotSupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
