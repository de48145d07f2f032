use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlforge::capabilities::{CapabilityDetector, CapabilityRequest};
use sqlforge::retry::RetryConfig;
use sqlforge::{
    Catalog, ClientFactory, ClientManager, GenerateRequest, GenerateResponse, HealthStatus,
    ModelInfo, ProviderCapabilities, ProviderClient, Result, SqlForgeError, Usage,
};

/// Mock client whose reported model id changes with every capabilities
/// call, making cache staleness observable.
struct CountingClient {
    name: String,
    capability_calls: AtomicU32,
    fail_capabilities: bool,
    healthy: bool,
}

impl CountingClient {
    fn arc(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capability_calls: AtomicU32::new(0),
            fail_capabilities: false,
            healthy: true,
        })
    }

    fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capability_calls: AtomicU32::new(0),
            fail_capabilities: true,
            healthy: true,
        })
    }

    fn unhealthy(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capability_calls: AtomicU32::new(0),
            fail_capabilities: false,
            healthy: false,
        })
    }
}

#[async_trait]
impl ProviderClient for CountingClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: "sql:SELECT 1;".into(),
            usage: Usage::default(),
            model: "mock".into(),
            request_id: "r".into(),
            confidence: 1.0,
            processing_time: None,
        })
    }

    async fn capabilities(&self) -> Result<ProviderCapabilities> {
        if self.fail_capabilities {
            return Err(SqlForgeError::Http("connection reset".into()));
        }
        let generation = self.capability_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderCapabilities {
            models: vec![ModelInfo {
                id: format!("model-gen-{generation}"),
                display_name: "Mock Model".into(),
                description: String::new(),
                context_window: 8_192,
                input_cost_per_1k: 0.001,
                output_cost_per_1k: 0.002,
                tags: vec!["chat".into()],
            }],
            features: vec!["generate".into()],
            rate_limits: None,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if self.healthy {
            Ok(HealthStatus::healthy("ok", Duration::from_millis(1)))
        } else {
            Ok(HealthStatus::unhealthy("offline", Duration::from_millis(1)))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn empty_manager() -> Arc<ClientManager> {
    Arc::new(ClientManager::new(
        ClientFactory::new(Arc::new(Catalog::builtin())),
        RetryConfig::disabled(),
        "primary",
    ))
}

#[tokio::test]
async fn databases_only_request_on_an_empty_detector() {
    let detector = CapabilityDetector::new(empty_manager());
    let snapshot = detector
        .get_capabilities(CapabilityRequest {
            include_models: false,
            include_databases: true,
            include_features: false,
            check_health: false,
        })
        .await
        .unwrap();

    let supported: Vec<&str> = snapshot
        .databases
        .iter()
        .filter(|d| d.supported)
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(supported, vec!["mysql", "postgresql", "sqlite"]);
    assert!(snapshot.models.is_empty());
    assert!(snapshot.features.is_empty());
    assert!(snapshot.health.is_none());
}

#[tokio::test]
async fn limits_are_always_included() {
    let detector = CapabilityDetector::new(empty_manager());
    let snapshot = detector
        .get_capabilities(CapabilityRequest {
            include_models: false,
            include_databases: false,
            include_features: false,
            check_health: false,
        })
        .await
        .unwrap();
    assert!(snapshot.limits.max_concurrent_requests > 0);
    assert!(snapshot.limits.max_processing_time > Duration::ZERO);
}

#[tokio::test]
async fn models_aggregate_from_live_clients_with_cost_info() {
    let manager = empty_manager();
    manager.register_client("primary", CountingClient::arc("primary")).await;
    let detector = CapabilityDetector::new(manager);

    let snapshot = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    assert_eq!(snapshot.models.len(), 1);
    let model = &snapshot.models[0];
    assert!(model.available);
    assert_eq!(model.provider, "primary");
    let cost = model.cost.as_ref().expect("cost info present");
    assert!((cost.input_per_1k - 0.001).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failing_client_becomes_an_unavailable_model_entry() {
    let manager = empty_manager();
    manager.register_client("broken", CountingClient::failing("broken")).await;
    let detector = CapabilityDetector::new(manager);

    let snapshot = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    assert_eq!(snapshot.models.len(), 1);
    let entry = &snapshot.models[0];
    assert!(!entry.available);
    assert!(entry.limitation.as_deref().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn snapshot_is_cached_until_invalidated() {
    let manager = empty_manager();
    let client = CountingClient::arc("primary");
    manager.register_client("primary", client.clone()).await;
    let detector = CapabilityDetector::new(manager);
    detector.set_cache_ttl(Duration::from_secs(3600)).await;

    let first = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    // The mock mutates its listing on every call; a cached snapshot
    // must not reflect that.
    let second = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    assert_eq!(first.models[0].id, second.models[0].id);
    assert_eq!(client.capability_calls.load(Ordering::SeqCst), 1);

    detector.invalidate_cache().await;
    let third = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    assert_ne!(first.models[0].id, third.models[0].id);
}

#[tokio::test]
async fn expired_ttl_triggers_a_rebuild() {
    let manager = empty_manager();
    let client = CountingClient::arc("primary");
    manager.register_client("primary", client.clone()).await;
    let detector = CapabilityDetector::new(manager);
    detector.set_cache_ttl(Duration::from_millis(10)).await;

    let _ = detector.get_capabilities(CapabilityRequest::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;
    let _ = detector.get_capabilities(CapabilityRequest::default()).await.unwrap();
    assert_eq!(client.capability_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sql_optimization_feature_tracks_primary_availability() {
    // No clients: feature disabled.
    let detector = CapabilityDetector::new(empty_manager());
    let snapshot = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    let optimization = snapshot
        .features
        .iter()
        .find(|f| f.name == "sql-optimization")
        .unwrap();
    assert!(!optimization.enabled);

    // With a healthy client: enabled.
    let manager = empty_manager();
    manager.register_client("primary", CountingClient::arc("primary")).await;
    let detector = CapabilityDetector::new(manager);
    let snapshot = detector
        .get_capabilities(CapabilityRequest::default())
        .await
        .unwrap();
    let optimization = snapshot
        .features
        .iter()
        .find(|f| f.name == "sql-optimization")
        .unwrap();
    assert!(optimization.enabled);
}

#[tokio::test]
async fn health_aggregation_ands_component_flags() {
    let manager = empty_manager();
    manager.register_client("up", CountingClient::arc("up")).await;
    manager.register_client("down", CountingClient::unhealthy("down")).await;
    let detector = CapabilityDetector::new(manager);

    let snapshot = detector
        .get_capabilities(CapabilityRequest {
            check_health: true,
            ..CapabilityRequest::default()
        })
        .await
        .unwrap();
    let health = snapshot.health.expect("health requested");
    assert!(!health.overall);
    assert_eq!(health.components["provider:up"], true);
    assert_eq!(health.components["provider:down"], false);
    assert_eq!(health.components["engine"], true);
    assert_eq!(health.components["cache"], true);
    assert_eq!(health.components["config"], true);
}
