use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlforge::retry::RetryConfig;
use sqlforge::{
    Catalog, ClientFactory, ClientManager, GenerateRequest, GenerateResponse, HealthStatus,
    ProviderCapabilities, ProviderClient, Result, SqlForgeError, Strategy, Usage,
};

/// Configurable mock provider client.
struct MockClient {
    name: String,
    failures_before_success: AtomicU32,
    generate_calls: AtomicU32,
    close_calls: AtomicU32,
    healthy: AtomicBool,
    fail_close: bool,
    health_error: bool,
}

impl MockClient {
    fn healthy(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures_before_success: AtomicU32::new(0),
            generate_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            fail_close: false,
            health_error: false,
        })
    }

    fn failing_n_times(name: &str, failures: u32) -> Arc<Self> {
        let client = Self::healthy(name);
        client.failures_before_success.store(failures, Ordering::SeqCst);
        client
    }

    fn offline(name: &str) -> Arc<Self> {
        let client = Self::healthy(name);
        client.healthy.store(false, Ordering::SeqCst);
        client
    }

    fn with_close_failure(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures_before_success: AtomicU32::new(0),
            generate_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            fail_close: true,
            health_error: false,
        })
    }

    fn with_health_error(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures_before_success: AtomicU32::new(0),
            generate_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            fail_close: false,
            health_error: true,
        })
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_before_success.load(Ordering::SeqCst) > 0 {
            self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
            return Err(SqlForgeError::Provider("500 internal server error".into()));
        }
        Ok(GenerateResponse {
            text: format!("sql:SELECT '{}' AS origin;", self.name),
            usage: Usage::new(10, 5),
            model: "mock-model".into(),
            request_id: "req-1".into(),
            confidence: 1.0,
            processing_time: Some(Duration::from_millis(5)),
        })
    }

    async fn capabilities(&self) -> Result<ProviderCapabilities> {
        Ok(ProviderCapabilities::default())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if self.health_error {
            return Err(SqlForgeError::Http("connection refused".into()));
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(HealthStatus::healthy("ok", Duration::from_millis(2)))
        } else {
            Ok(HealthStatus::unhealthy("offline", Duration::from_millis(2)))
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(SqlForgeError::Http("socket already gone".into()));
        }
        Ok(())
    }
}

fn manager(default_service: &str) -> ClientManager {
    ClientManager::new(
        ClientFactory::new(Arc::new(Catalog::builtin())),
        RetryConfig::new()
            .max_attempts(3)
            .base_delay(Duration::from_millis(5))
            .jitter(false),
        default_service,
    )
}

#[tokio::test]
async fn generate_prefers_the_default_service() {
    let mgr = manager("primary");
    mgr.register_client("aardvark", MockClient::healthy("aardvark")).await;
    mgr.register_client("primary", MockClient::healthy("primary")).await;

    let response = mgr.generate(&GenerateRequest::new("list users")).await.unwrap();
    assert!(response.text.contains("primary"));
}

#[tokio::test]
async fn generate_falls_back_lexicographically_when_default_is_unhealthy() {
    let mgr = manager("primary");
    mgr.register_client("primary", MockClient::healthy("primary")).await;
    mgr.register_client("backup-a", MockClient::healthy("backup-a")).await;
    mgr.register_client("backup-b", MockClient::healthy("backup-b")).await;
    mgr.set_health("primary", false);

    let response = mgr.generate(&GenerateRequest::new("list users")).await.unwrap();
    assert!(response.text.contains("backup-a"));
}

#[tokio::test]
async fn generate_retries_transient_provider_errors() {
    let mgr = manager("svc");
    let client = MockClient::failing_n_times("svc", 2);
    mgr.register_client("svc", client.clone()).await;

    let response = mgr.generate(&GenerateRequest::new("list users")).await.unwrap();
    assert!(response.text.contains("svc"));
    assert_eq!(client.generate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn broken_provider_exhausts_retries_with_backoff() {
    let mgr = manager("svc");
    let client = MockClient::failing_n_times("svc", 100);
    mgr.register_client("svc", client.clone()).await;

    let started = Instant::now();
    let err = mgr.generate(&GenerateRequest::new("list users")).await.unwrap_err();
    // Two backoff sleeps: 5ms + 10ms.
    assert!(started.elapsed() >= Duration::from_millis(15));
    assert!(err.to_string().contains("all retry attempts failed"));
    assert_eq!(client.generate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn generate_without_clients_fails_fast() {
    let mgr = manager("svc");
    let err = mgr.generate(&GenerateRequest::new("list users")).await.unwrap_err();
    assert!(matches!(err, SqlForgeError::NoHealthyClients));
}

#[tokio::test]
async fn replacing_a_client_closes_the_old_one() {
    let mgr = manager("svc");
    let old = MockClient::healthy("svc");
    mgr.register_client("svc", old.clone()).await;

    mgr.register_client("svc", MockClient::healthy("svc")).await;
    assert_eq!(old.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mgr.client_names(), vec!["svc".to_string()]);
}

#[tokio::test]
async fn remove_client_closes_exactly_once() {
    let mgr = manager("svc");
    let client = MockClient::healthy("svc");
    mgr.register_client("svc", client.clone()).await;

    mgr.remove_client("svc").await.unwrap();
    assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        mgr.remove_client("svc").await,
        Err(SqlForgeError::ClientNotFound(_))
    ));
}

#[tokio::test]
async fn close_aggregates_failures_without_panicking() {
    let mgr = manager("svc");
    let good = MockClient::healthy("good");
    let bad = MockClient::with_close_failure("bad");
    mgr.register_client("good", good.clone()).await;
    mgr.register_client("bad", bad.clone()).await;

    let err = mgr.close().await.unwrap_err();
    assert!(matches!(err, SqlForgeError::Shutdown(_)));
    assert!(err.to_string().contains("bad"));
    assert_eq!(good.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(bad.close_calls.load(Ordering::SeqCst), 1);
    assert!(mgr.client_names().is_empty());
}

#[tokio::test]
async fn health_check_updates_the_health_flag() {
    let mgr = manager("svc");
    mgr.register_client("svc", MockClient::offline("svc")).await;

    let status = mgr.health_check("svc").await.unwrap();
    assert!(!status.healthy);
    assert_eq!(status.status, "offline");
    assert!(!mgr.has_healthy_client());
}

#[tokio::test]
async fn health_check_all_fabricates_statuses_from_errors() {
    let mgr = manager("svc");
    mgr.register_client("up", MockClient::healthy("up")).await;
    mgr.register_client("erroring", MockClient::with_health_error("erroring")).await;

    let report = mgr.health_check_all().await;
    assert!(report["up"].healthy);
    assert!(!report["erroring"].healthy);
    assert!(report["erroring"].status.contains("connection refused"));
}

#[tokio::test]
async fn health_check_unknown_client_errors() {
    let mgr = manager("svc");
    assert!(matches!(
        mgr.health_check("ghost").await,
        Err(SqlForgeError::ClientNotFound(_))
    ));
}

#[tokio::test]
async fn balancer_integration_records_outcomes() {
    let mgr = manager("ignored").with_balancer(Strategy::RoundRobin);
    mgr.register_client("a", MockClient::healthy("a")).await;
    mgr.register_client("b", MockClient::healthy("b")).await;

    for _ in 0..4 {
        mgr.generate(&GenerateRequest::new("list users")).await.unwrap();
    }
    let stats = mgr.balancer().unwrap().stats();
    assert_eq!(stats["a"].successes, 2);
    assert_eq!(stats["b"].successes, 2);
}

#[tokio::test]
async fn test_connection_reports_offline_providers() {
    // test_connection builds a real client from config; an unroutable
    // endpoint exercises the failure path without a live server.
    let mgr = manager("svc");
    let config = sqlforge::ServiceConfig::new("ollama")
        .endpoint("http://127.0.0.1:1")
        .timeout(Duration::from_millis(200));
    let report = mgr.test_connection(&config).await;
    assert!(!report.success);
    assert_eq!(report.provider, "ollama");
    assert!(report.error.is_some());
}
