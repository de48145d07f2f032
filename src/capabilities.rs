//! Capability detector: TTL-cached aggregation of models, databases,
//! features, health, and resource limits.
//!
//! One snapshot is cached per detector under an async RW lock with
//! double-checked refresh: readers return filtered copies while the
//! snapshot is fresh, the first writer past the TTL rebuilds it, and
//! racers that lose the write race reuse the rebuilt snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::manager::ClientManager;
use crate::telemetry;
use crate::Result;

/// Default snapshot time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Which snapshot sections the caller wants. Resource limits are always
/// included regardless of flags.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRequest {
    pub include_models: bool,
    pub include_databases: bool,
    pub include_features: bool,
    pub check_health: bool,
}

impl Default for CapabilityRequest {
    fn default() -> Self {
        Self {
            include_models: true,
            include_databases: true,
            include_features: true,
            check_health: false,
        }
    }
}

/// One model row in the aggregated snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Client name serving this model.
    pub provider: String,
    pub context_window: u32,
    /// Present iff either per-1K cost is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostInfo>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<String>,
}

/// Per-1K token cost data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub currency: String,
}

/// One database dialect row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSupport {
    pub name: String,
    pub versions: Vec<String>,
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<String>,
}

/// One feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    pub description: String,
}

/// Aggregated component health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// AND of every component flag.
    pub overall: bool,
    pub components: HashMap<String, bool>,
}

/// Static processing limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_concurrent_requests: u32,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub max_memory_mb: u32,
    pub max_processing_time: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            requests_per_minute: 60,
            requests_per_hour: 1_000,
            max_memory_mb: 512,
            max_processing_time: Duration::from_secs(30),
        }
    }
}

/// The full aggregated snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub models: Vec<ModelEntry>,
    pub databases: Vec<DatabaseSupport>,
    pub features: Vec<FeatureFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthReport>,
    pub limits: ResourceLimits,
}

struct CacheRecord {
    snapshot: Option<CapabilitySnapshot>,
    stored_at: Option<Instant>,
    ttl: Duration,
}

impl CacheRecord {
    fn is_valid(&self) -> bool {
        match (self.snapshot.as_ref(), self.stored_at) {
            (Some(_), Some(at)) => at.elapsed() < self.ttl,
            _ => false,
        }
    }
}

/// TTL-cached capability aggregation over a [`ClientManager`].
pub struct CapabilityDetector {
    manager: Arc<ClientManager>,
    cache: RwLock<CacheRecord>,
}

impl CapabilityDetector {
    pub fn new(manager: Arc<ClientManager>) -> Self {
        Self {
            manager,
            cache: RwLock::new(CacheRecord {
                snapshot: None,
                stored_at: None,
                ttl: DEFAULT_CACHE_TTL,
            }),
        }
    }

    /// Aggregate capabilities, serving the cached snapshot while fresh.
    pub async fn get_capabilities(&self, request: CapabilityRequest) -> Result<CapabilitySnapshot> {
        {
            let cache = self.cache.read().await;
            if cache.is_valid() {
                metrics::counter!(telemetry::CAPABILITY_CACHE_HITS_TOTAL).increment(1);
                let snapshot = cache.snapshot.as_ref().expect("valid cache has data");
                return Ok(filter_snapshot(snapshot, request));
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if cache.is_valid() {
            metrics::counter!(telemetry::CAPABILITY_CACHE_HITS_TOTAL).increment(1);
            let snapshot = cache.snapshot.as_ref().expect("valid cache has data");
            return Ok(filter_snapshot(snapshot, request));
        }

        metrics::counter!(telemetry::CAPABILITY_CACHE_MISSES_TOTAL).increment(1);
        let snapshot = self.build_snapshot(request.check_health).await;
        cache.snapshot = Some(snapshot.clone());
        cache.stored_at = Some(Instant::now());
        debug!(ttl_secs = cache.ttl.as_secs(), "capability snapshot refreshed");
        Ok(filter_snapshot(&snapshot, request))
    }

    /// Drop the cached snapshot; the next call rebuilds.
    pub async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.snapshot = None;
        cache.stored_at = None;
    }

    /// Change the snapshot time-to-live.
    pub async fn set_cache_ttl(&self, ttl: Duration) {
        let mut cache = self.cache.write().await;
        cache.ttl = ttl;
    }

    async fn build_snapshot(&self, check_health: bool) -> CapabilitySnapshot {
        let models = self.collect_models().await;
        let health = if check_health {
            Some(self.collect_health().await)
        } else {
            None
        };
        CapabilitySnapshot {
            models,
            databases: supported_databases(),
            features: self.feature_flags(),
            health,
            limits: ResourceLimits::default(),
        }
    }

    /// Ask every registered client for its models. A failing client
    /// contributes a single unavailable entry carrying the error text.
    async fn collect_models(&self) -> Vec<ModelEntry> {
        let mut entries = Vec::new();
        for (name, client) in self.manager.clients_snapshot() {
            match client.capabilities().await {
                Ok(caps) => {
                    for model in caps.models {
                        let cost = model.has_cost_info().then(|| CostInfo {
                            input_per_1k: model.input_cost_per_1k,
                            output_per_1k: model.output_cost_per_1k,
                            currency: "USD".into(),
                        });
                        entries.push(ModelEntry {
                            id: model.id,
                            display_name: model.display_name,
                            description: model.description,
                            provider: name.clone(),
                            context_window: model.context_window,
                            cost,
                            tags: model.tags,
                            available: true,
                            limitation: None,
                        });
                    }
                }
                Err(e) => {
                    entries.push(ModelEntry {
                        id: name.clone(),
                        display_name: name.clone(),
                        description: String::new(),
                        provider: name.clone(),
                        context_window: 0,
                        cost: None,
                        tags: Vec::new(),
                        available: false,
                        limitation: Some(e.to_string()),
                    });
                }
            }
        }
        entries
    }

    fn feature_flags(&self) -> Vec<FeatureFlag> {
        let primary_available = self.manager.primary_client().is_some();
        vec![
            FeatureFlag {
                name: "sql-generation".into(),
                enabled: true,
                description: "natural language to SQL".into(),
            },
            FeatureFlag {
                name: "sql-validation".into(),
                enabled: true,
                description: "dialect-aware validation of generated SQL".into(),
            },
            FeatureFlag {
                name: "sql-optimization".into(),
                enabled: primary_available,
                description: "optimization suggestions for generated SQL".into(),
            },
            FeatureFlag {
                name: "query-explanation".into(),
                enabled: true,
                description: "plain-language explanation alongside SQL".into(),
            },
            FeatureFlag {
                name: "schema-aware-prompts".into(),
                enabled: true,
                description: "table schemas folded into prompts".into(),
            },
            FeatureFlag {
                name: "dialect-transform".into(),
                enabled: true,
                description: "cross-dialect SQL conversion".into(),
            },
            FeatureFlag {
                name: "provider-failover".into(),
                enabled: true,
                description: "retry and failover across providers".into(),
            },
        ]
    }

    /// Probe the internal components plus every provider; overall health
    /// is the AND of every flag.
    async fn collect_health(&self) -> HealthReport {
        let mut components = HashMap::new();
        components.insert("engine".to_string(), true);
        components.insert("cache".to_string(), true);
        components.insert("config".to_string(), true);
        for (name, status) in self.manager.health_check_all().await {
            components.insert(format!("provider:{name}"), status.healthy);
        }
        let overall = components.values().all(|healthy| *healthy);
        HealthReport {
            overall,
            components,
        }
    }
}

/// Static database support matrix.
fn supported_databases() -> Vec<DatabaseSupport> {
    vec![
        DatabaseSupport {
            name: "mysql".into(),
            versions: vec!["5.7".into(), "8.0".into(), "8.1".into()],
            supported: true,
            limitation: None,
        },
        DatabaseSupport {
            name: "postgresql".into(),
            versions: vec![
                "12".into(),
                "13".into(),
                "14".into(),
                "15".into(),
                "16".into(),
            ],
            supported: true,
            limitation: None,
        },
        DatabaseSupport {
            name: "sqlite".into(),
            versions: vec!["3.x".into()],
            supported: true,
            limitation: None,
        },
        DatabaseSupport {
            name: "oracle".into(),
            versions: Vec::new(),
            supported: false,
            limitation: Some("not-implemented".into()),
        },
        DatabaseSupport {
            name: "sqlserver".into(),
            versions: Vec::new(),
            supported: false,
            limitation: Some("not-implemented".into()),
        },
    ]
}

/// Copy a snapshot, blanking the sections the request did not ask for.
/// Limits always come through.
fn filter_snapshot(snapshot: &CapabilitySnapshot, request: CapabilityRequest) -> CapabilitySnapshot {
    CapabilitySnapshot {
        models: if request.include_models {
            snapshot.models.clone()
        } else {
            Vec::new()
        },
        databases: if request.include_databases {
            snapshot.databases.clone()
        } else {
            Vec::new()
        },
        features: if request.include_features {
            snapshot.features.clone()
        } else {
            Vec::new()
        },
        health: if request.check_health {
            snapshot.health.clone()
        } else {
            None
        },
        limits: snapshot.limits.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_matrix_lists_supported_and_stubbed_engines() {
        let databases = supported_databases();
        let supported: Vec<&str> = databases
            .iter()
            .filter(|d| d.supported)
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(supported, vec!["mysql", "postgresql", "sqlite"]);
        let oracle = databases.iter().find(|d| d.name == "oracle").unwrap();
        assert!(!oracle.supported);
        assert_eq!(oracle.limitation.as_deref(), Some("not-implemented"));
    }

    #[test]
    fn filter_blanks_unrequested_sections() {
        let snapshot = CapabilitySnapshot {
            models: vec![],
            databases: supported_databases(),
            features: vec![FeatureFlag {
                name: "sql-generation".into(),
                enabled: true,
                description: String::new(),
            }],
            health: None,
            limits: ResourceLimits::default(),
        };
        let filtered = filter_snapshot(
            &snapshot,
            CapabilityRequest {
                include_models: false,
                include_databases: true,
                include_features: false,
                check_health: false,
            },
        );
        assert!(filtered.models.is_empty());
        assert!(filtered.features.is_empty());
        assert_eq!(filtered.databases.len(), 5);
        // Limits survive every filter combination.
        assert_eq!(filtered.limits, ResourceLimits::default());
    }
}
