//! Client factory: typed service config in, provider client out.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::anthropic::{AnthropicClient, AnthropicClientConfig};
use super::universal::{UniversalClient, UniversalClientConfig};
use super::{ProviderClient, ProviderKind};
use crate::catalog::Catalog;
use crate::config::ServiceConfig;
use crate::types::ModelInfo;
use crate::{Result, SqlForgeError};

/// Default per-request timeout when the service config carries none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback local endpoint when the catalog has no ollama row.
const OLLAMA_FALLBACK_ENDPOINT: &str = "http://localhost:11434";

/// Builds provider clients from service configs, consulting the catalog
/// for endpoint and model defaults.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    catalog: Arc<Catalog>,
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new(Arc::new(Catalog::load()))
    }
}

impl ClientFactory {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Check that a provider kind is known and the config is usable,
    /// without building anything.
    pub fn validate(&self, provider: &str, config: &ServiceConfig) -> Result<()> {
        let kind = ProviderKind::from_str(provider)?;
        if kind == ProviderKind::Custom
            && config.endpoint.as_deref().is_none_or(str::is_empty)
        {
            return Err(SqlForgeError::InvalidConfig(
                "custom provider requires an explicit endpoint".into(),
            ));
        }
        Ok(())
    }

    /// Build a client named `name` from `config`.
    pub fn build(&self, name: &str, config: &ServiceConfig) -> Result<Arc<dyn ProviderClient>> {
        let kind = ProviderKind::from_str(&config.provider)?;
        let base_url = self.resolve_endpoint(kind, config.endpoint.as_deref())?;
        let model = self.resolve_model(kind, config.model.as_deref())?;
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let models = self.catalog_models(kind);
        debug!(client = name, provider = %kind, endpoint = %base_url, %model, "building client");

        let client: Arc<dyn ProviderClient> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicClient::new(AnthropicClientConfig {
                name: name.to_string(),
                base_url,
                api_key: config.api_key.clone(),
                model,
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout,
                models,
            })?),
            _ => Arc::new(UniversalClient::new(UniversalClientConfig {
                name: name.to_string(),
                kind,
                base_url,
                api_key: config.api_key.clone(),
                model,
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout,
                models,
            })?),
        };
        Ok(client)
    }

    /// Pick the endpoint: explicit config, then catalog default. `custom`
    /// has no default and must be explicit.
    fn resolve_endpoint(&self, kind: ProviderKind, explicit: Option<&str>) -> Result<String> {
        if let Some(endpoint) = explicit.filter(|e| !e.trim().is_empty()) {
            return Ok(normalize_endpoint(kind, endpoint));
        }
        if kind == ProviderKind::Custom {
            return Err(SqlForgeError::InvalidConfig(
                "custom provider requires an explicit endpoint".into(),
            ));
        }
        let default = self
            .catalog
            .endpoint_for(kind)
            .map(str::to_string)
            .or_else(|| {
                (kind == ProviderKind::Ollama).then(|| OLLAMA_FALLBACK_ENDPOINT.to_string())
            })
            .ok_or_else(|| {
                SqlForgeError::InvalidConfig(format!("no catalog endpoint for provider {kind}"))
            })?;
        Ok(normalize_endpoint(kind, &default))
    }

    /// Pick the model: explicit config, then catalog default.
    fn resolve_model(&self, kind: ProviderKind, explicit: Option<&str>) -> Result<String> {
        explicit
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.catalog.default_model_for(kind).map(str::to_string))
            .ok_or_else(|| {
                SqlForgeError::InvalidConfig(format!("no model configured for provider {kind}"))
            })
    }

    fn catalog_models(&self, kind: ProviderKind) -> Vec<ModelInfo> {
        self.catalog
            .entry_for(kind)
            .map(|entry| {
                entry
                    .models
                    .iter()
                    .map(|m| ModelInfo {
                        id: m.id.clone(),
                        display_name: m.display_name.clone(),
                        description: m.description.clone(),
                        context_window: m.context_window,
                        input_cost_per_1k: m.input_cost_per_1k,
                        output_cost_per_1k: m.output_cost_per_1k,
                        tags: vec!["chat".into()],
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Normalize an endpoint URL: trailing slashes always come off, and for
/// OpenAI/DeepSeek a trailing `/v1` comes off too, so the universal
/// client's path composition stays idempotent.
pub fn normalize_endpoint(kind: ProviderKind, endpoint: &str) -> String {
    let mut base = endpoint.trim().trim_end_matches('/');
    if kind.strips_v1_suffix() {
        base = base.strip_suffix("/v1").unwrap_or(base);
        base = base.trim_end_matches('/');
    }
    base.to_string()
}
