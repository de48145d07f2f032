//! Runtime-override client cache.
//!
//! A caller may supply its own provider, endpoint, model, and API key for
//! a single request. Those clients are cached under a key derived from
//! (provider, endpoint, model) and guarded by an API-key fingerprint — a
//! SHA-256 hash compared instead of the key itself, so no plaintext
//! secret is ever retained. A fingerprint mismatch means the tenant
//! rotated the key: the new client replaces the old one, and the
//! displaced client is closed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::client::{ClientFactory, ProviderClient};
use crate::config::ServiceConfig;
use crate::telemetry;
use crate::Result;

/// Per-request provider override.
#[derive(Debug, Clone)]
pub struct RuntimeOverride {
    pub provider: String,
    /// Empty means the catalog default for the provider kind.
    pub endpoint: Option<String>,
    /// Empty means the catalog default model.
    pub model: Option<String>,
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

struct RuntimeEntry {
    client: Arc<dyn ProviderClient>,
    fingerprint: Option<String>,
}

/// Cache of runtime-override clients, keyed on (provider, endpoint, model).
#[derive(Default)]
pub struct RuntimeClientCache {
    entries: RwLock<HashMap<String, RuntimeEntry>>,
}

impl RuntimeClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live cached clients.
    pub fn len(&self) -> usize {
        self.entries.read().expect("runtime cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the cached client for an override, building (and installing)
    /// a fresh one when the entry is missing or its key fingerprint
    /// differs. The write path re-checks under the lock: a racer that
    /// installed a matching entry first wins, and the redundant client
    /// built here is closed.
    pub async fn get_or_create(
        &self,
        factory: &ClientFactory,
        spec: &RuntimeOverride,
    ) -> Result<Arc<dyn ProviderClient>> {
        let key = cache_key(
            &spec.provider,
            spec.endpoint.as_deref().unwrap_or(""),
            spec.model.as_deref().unwrap_or(""),
        );
        let fingerprint = api_key_fingerprint(&spec.api_key);

        {
            let entries = self.entries.read().expect("runtime cache lock poisoned");
            if let Some(entry) = entries.get(&key) {
                if entry.fingerprint == fingerprint {
                    return Ok(entry.client.clone());
                }
            }
        }

        // Build outside the lock; client construction may be slow.
        let client = factory.build(&format!("runtime-{}", spec.provider), &self.service_config(spec))?;
        metrics::counter!(telemetry::RUNTIME_CLIENTS_BUILT_TOTAL,
            "provider" => spec.provider.clone())
        .increment(1);

        enum Installed {
            Fresh(Option<Arc<dyn ProviderClient>>),
            LostRace(Arc<dyn ProviderClient>),
        }

        let outcome = {
            let mut entries = self.entries.write().expect("runtime cache lock poisoned");
            match entries.get(&key) {
                Some(entry) if entry.fingerprint == fingerprint => {
                    Installed::LostRace(entry.client.clone())
                }
                _ => Installed::Fresh(
                    entries
                        .insert(
                            key,
                            RuntimeEntry {
                                client: client.clone(),
                                fingerprint,
                            },
                        )
                        .map(|old| old.client),
                ),
            }
        };

        match outcome {
            Installed::LostRace(winner) => {
                debug!(provider = %spec.provider, "runtime client race lost, discarding fresh build");
                self.close_client(&spec.provider, client).await;
                Ok(winner)
            }
            Installed::Fresh(displaced) => {
                if let Some(old) = displaced {
                    debug!(provider = %spec.provider, "api key rotated, closing displaced runtime client");
                    self.close_client(&spec.provider, old).await;
                }
                Ok(client)
            }
        }
    }

    /// Close every cached client. Close failures are logged, never raised.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn ProviderClient>)> = {
            let mut entries = self.entries.write().expect("runtime cache lock poisoned");
            entries
                .drain()
                .map(|(key, entry)| (key, entry.client))
                .collect()
        };
        for (key, client) in drained {
            if let Err(e) = client.close().await {
                warn!(cache_key = %key, error = %e, "failed to close runtime client");
            }
        }
    }

    async fn close_client(&self, provider: &str, client: Arc<dyn ProviderClient>) {
        metrics::counter!(telemetry::RUNTIME_CLIENTS_CLOSED_TOTAL,
            "provider" => provider.to_string())
        .increment(1);
        if let Err(e) = client.close().await {
            warn!(provider, error = %e, "failed to close runtime client");
        }
    }

    fn service_config(&self, spec: &RuntimeOverride) -> ServiceConfig {
        let mut config = ServiceConfig::new(spec.provider.clone());
        if let Some(endpoint) = spec.endpoint.as_deref().filter(|e| !e.is_empty()) {
            config = config.endpoint(endpoint);
        }
        if !spec.api_key.is_empty() {
            config = config.api_key(spec.api_key.clone());
        }
        if let Some(model) = spec.model.as_deref().filter(|m| !m.is_empty()) {
            config = config.model(model);
        }
        config.max_tokens = spec.max_tokens;
        config.timeout = spec.timeout;
        config
    }
}

/// Cache key over (provider, endpoint, model). Hashed so the key is a
/// fixed-width handle rather than raw caller input.
fn cache_key(provider: &str, endpoint: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update(b"|");
    hasher.update(endpoint.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hex(&hasher.finalize())
}

/// SHA-256 fingerprint of an API key; a missing key is a null fingerprint.
fn api_key_fingerprint(api_key: &str) -> Option<String> {
    if api_key.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    Some(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_varies_on_each_component() {
        let base = cache_key("deepseek", "https://api.deepseek.com", "deepseek-chat");
        assert_ne!(base, cache_key("openai", "https://api.deepseek.com", "deepseek-chat"));
        assert_ne!(base, cache_key("deepseek", "", "deepseek-chat"));
        assert_ne!(base, cache_key("deepseek", "https://api.deepseek.com", "deepseek-reasoner"));
        assert_eq!(
            base,
            cache_key("deepseek", "https://api.deepseek.com", "deepseek-chat")
        );
    }

    #[test]
    fn fingerprint_is_null_for_missing_key() {
        assert!(api_key_fingerprint("").is_none());
        let fp = api_key_fingerprint("sk-secret").unwrap();
        // The fingerprint must not leak the key.
        assert!(!fp.contains("secret"));
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, api_key_fingerprint("sk-secret").unwrap());
        assert_ne!(fp, api_key_fingerprint("sk-other").unwrap());
    }
}
