//! Multi-provider client manager.
//!
//! Owns the `name → client` map, builds clients eagerly from a config
//! snapshot, dispatches generate requests through the retry engine (and
//! optionally a circuit breaker and load balancer), probes health on
//! demand, and guarantees every client is closed exactly once — on
//! removal, replacement, or shutdown.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::balancer::{LoadBalancer, Strategy};
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::client::{ClientFactory, ProviderClient};
use crate::config::{AiConfig, ServiceConfig};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::telemetry;
use crate::types::{
    ConnectionTest, GenerateRequest, GenerateResponse, HealthStatus, ProviderInfo,
};
use crate::{Result, SqlForgeError};

/// Timeout applied to on-demand health probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for discovery probes against local providers.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for [`ClientManager::add_client`].
#[derive(Debug, Clone)]
pub struct AddClientOptions {
    /// Probe the new client before installing it. Probe failures are
    /// logged, never fatal — the client is installed regardless.
    pub health_probe: bool,
    pub probe_timeout: Duration,
}

impl Default for AddClientOptions {
    fn default() -> Self {
        Self {
            health_probe: true,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

struct ManagedClient {
    client: Arc<dyn ProviderClient>,
    healthy: bool,
}

/// Creates, selects, and tears down provider clients.
pub struct ClientManager {
    clients: RwLock<HashMap<String, ManagedClient>>,
    factory: ClientFactory,
    retry: RetryConfig,
    default_service: String,
    balancer: Option<Arc<LoadBalancer>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ClientManager {
    /// An empty manager; clients are registered or added afterwards.
    pub fn new(factory: ClientFactory, retry: RetryConfig, default_service: impl Into<String>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
            retry,
            default_service: default_service.into(),
            balancer: None,
            breaker: None,
        }
    }

    /// Build a manager from a config snapshot, creating clients eagerly
    /// for every enabled service. Any build failure aborts construction
    /// with a composite error listing every broken service.
    pub fn from_config(config: &AiConfig, factory: ClientFactory) -> Result<Self> {
        let manager = Self::new(
            factory,
            RetryConfig::from(&config.retry),
            config.default_service.clone(),
        );
        let mut failures = Vec::new();
        for name in config.enabled_services() {
            let service = &config.services[name];
            match manager.factory.build(name, service) {
                Ok(client) => {
                    manager.install(name, client);
                    info!(client = name, provider = %service.provider, "client created");
                }
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }
        if !failures.is_empty() {
            return Err(SqlForgeError::InvalidConfig(format!(
                "failed to build clients: {}",
                failures.join("; ")
            )));
        }
        Ok(manager)
    }

    /// Route selection through a load balancer. Existing clients are
    /// registered with it; later add/remove calls keep it in sync.
    pub fn with_balancer(mut self, strategy: Strategy) -> Self {
        let balancer = Arc::new(LoadBalancer::new(strategy));
        {
            let clients = self.clients.read().expect("manager lock poisoned");
            for (name, entry) in clients.iter() {
                balancer.register_client(name.clone(), entry.client.clone());
                balancer.update_health(name, entry.healthy);
            }
        }
        self.balancer = Some(balancer);
        self
    }

    /// Gate every provider call behind a circuit breaker.
    pub fn with_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Some(Arc::new(CircuitBreaker::new(config)));
        self
    }

    pub fn default_service(&self) -> &str {
        &self.default_service
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    pub fn balancer(&self) -> Option<&LoadBalancer> {
        self.balancer.as_deref()
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    /// Install an already-built client under `name`, replacing (and
    /// returning) any previous entry. Health starts true.
    fn install(&self, name: &str, client: Arc<dyn ProviderClient>) -> Option<Arc<dyn ProviderClient>> {
        let displaced = {
            let mut clients = self.clients.write().expect("manager lock poisoned");
            clients
                .insert(
                    name.to_string(),
                    ManagedClient {
                        client: client.clone(),
                        healthy: true,
                    },
                )
                .map(|old| old.client)
        };
        if let Some(balancer) = &self.balancer {
            balancer.register_client(name.to_string(), client);
        }
        displaced
    }

    /// Register an externally constructed client (embedding hosts, tests).
    /// An existing entry under the same name is closed before replacement.
    pub async fn register_client(&self, name: &str, client: Arc<dyn ProviderClient>) {
        if let Some(displaced) = self.install(name, client) {
            if let Err(e) = displaced.close().await {
                warn!(client = name, error = %e, "failed to close displaced client");
            }
        }
    }

    /// Look up a client by name.
    pub fn client(&self, name: &str) -> Result<Arc<dyn ProviderClient>> {
        self.clients
            .read()
            .expect("manager lock poisoned")
            .get(name)
            .map(|entry| entry.client.clone())
            .ok_or_else(|| SqlForgeError::ClientNotFound(name.to_string()))
    }

    /// Registered client names, sorted.
    pub fn client_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .read()
            .expect("manager lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Sorted snapshot of every registered client.
    pub fn clients_snapshot(&self) -> Vec<(String, Arc<dyn ProviderClient>)> {
        let mut snapshot: Vec<(String, Arc<dyn ProviderClient>)> = self
            .clients
            .read()
            .expect("manager lock poisoned")
            .iter()
            .map(|(name, entry)| (name.clone(), entry.client.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Whether at least one healthy client is registered.
    pub fn has_healthy_client(&self) -> bool {
        self.clients
            .read()
            .expect("manager lock poisoned")
            .values()
            .any(|entry| entry.healthy)
    }

    /// The default-service client when registered and healthy, else the
    /// first healthy client in lexicographic order.
    pub fn primary_client(&self) -> Option<Arc<dyn ProviderClient>> {
        self.select_client().ok().map(|(_, client)| client)
    }

    /// Flip a client's health flag directly (health checks do this too).
    pub fn set_health(&self, name: &str, healthy: bool) {
        let mut clients = self.clients.write().expect("manager lock poisoned");
        if let Some(entry) = clients.get_mut(name) {
            entry.healthy = healthy;
        }
        drop(clients);
        if let Some(balancer) = &self.balancer {
            balancer.update_health(name, healthy);
        }
    }

    fn select_client(&self) -> Result<(String, Arc<dyn ProviderClient>)> {
        if let Some(balancer) = &self.balancer {
            return balancer.select_client();
        }
        let clients = self.clients.read().expect("manager lock poisoned");
        if let Some(entry) = clients.get(&self.default_service) {
            if entry.healthy {
                return Ok((self.default_service.clone(), entry.client.clone()));
            }
        }
        let mut healthy: Vec<&String> = clients
            .iter()
            .filter(|(_, entry)| entry.healthy)
            .map(|(name, _)| name)
            .collect();
        healthy.sort_unstable();
        healthy
            .first()
            .map(|name| ((*name).clone(), clients[*name].client.clone()))
            .ok_or(SqlForgeError::NoHealthyClients)
    }

    /// Dispatch a generate request: select a healthy client (default
    /// service first), delegate, and retry transient failures with
    /// exponential backoff. `NoHealthyClients` is permanent and surfaces
    /// without retry.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let executor = RetryExecutor::new(self.retry.clone());
        executor
            .execute_with_result(|| async {
                let (name, client) = self.select_client()?;
                let started = Instant::now();
                let result = match &self.breaker {
                    Some(breaker) => breaker.call(|| client.generate(request)).await,
                    None => client.generate(request).await,
                };
                match result {
                    Ok(response) => {
                        if let Some(balancer) = &self.balancer {
                            balancer.record_success(&name, started.elapsed());
                        }
                        metrics::counter!(telemetry::REQUESTS_TOTAL,
                            "provider" => name.clone(), "status" => "ok")
                        .increment(1);
                        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                            "provider" => name)
                        .record(started.elapsed().as_secs_f64());
                        Ok(response)
                    }
                    Err(e) => {
                        if let Some(balancer) = &self.balancer {
                            balancer.record_failure(&name);
                        }
                        metrics::counter!(telemetry::REQUESTS_TOTAL,
                            "provider" => name, "status" => "error")
                        .increment(1);
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Build and install a client, optionally probing it first. Probe
    /// failures warn and install anyway; only build failures abort. A
    /// displaced client under the same name is closed.
    pub async fn add_client(
        &self,
        name: &str,
        config: &ServiceConfig,
        options: AddClientOptions,
    ) -> Result<()> {
        let client = self.factory.build(name, config)?;
        if options.health_probe {
            match tokio::time::timeout(options.probe_timeout, client.health_check()).await {
                Ok(Ok(status)) if status.healthy => {
                    debug!(client = name, "health probe passed");
                }
                Ok(Ok(status)) => {
                    warn!(client = name, status = %status.status, "health probe reported unhealthy, installing anyway");
                }
                Ok(Err(e)) => {
                    warn!(client = name, error = %e, "health probe failed, installing anyway");
                }
                Err(_) => {
                    warn!(client = name, "health probe timed out, installing anyway");
                }
            }
        }
        if let Some(displaced) = self.install(name, client) {
            if let Err(e) = displaced.close().await {
                warn!(client = name, error = %e, "failed to close displaced client");
            }
        }
        Ok(())
    }

    /// Close and delete a client.
    pub async fn remove_client(&self, name: &str) -> Result<()> {
        let removed = {
            let mut clients = self.clients.write().expect("manager lock poisoned");
            clients.remove(name)
        }
        .ok_or_else(|| SqlForgeError::ClientNotFound(name.to_string()))?;
        if let Some(balancer) = &self.balancer {
            balancer.unregister_client(name);
        }
        if let Err(e) = removed.client.close().await {
            warn!(client = name, error = %e, "failed to close removed client");
        }
        Ok(())
    }

    /// Replace a client's configuration in place.
    pub async fn update_config(&self, name: &str, config: &ServiceConfig) -> Result<()> {
        self.add_client(name, config, AddClientOptions::default()).await
    }

    /// Probe one client and record the outcome on its health flag.
    pub async fn health_check(&self, name: &str) -> Result<HealthStatus> {
        let client = self.client(name)?;
        let status = probe(client).await;
        self.set_health(name, status.healthy);
        Ok(status)
    }

    /// Probe every client concurrently. Probe errors become fabricated
    /// unhealthy statuses; the error text rides in `status`.
    pub async fn health_check_all(&self) -> HashMap<String, HealthStatus> {
        let snapshot = self.clients_snapshot();
        let probes = snapshot
            .into_iter()
            .map(|(name, client)| async move { (name, probe(client).await) });
        let results: Vec<(String, HealthStatus)> = join_all(probes).await;
        for (name, status) in &results {
            self.set_health(name, status.healthy);
        }
        results.into_iter().collect()
    }

    /// Discover usable providers: reachable local deployments (probed via
    /// the Ollama tags helper, models via the client) plus every cloud
    /// catalog entry, which needs only an API key.
    pub async fn discover_providers(&self) -> Vec<ProviderInfo> {
        let mut providers = Vec::new();
        let catalog = self.factory.catalog().clone();

        for entry in catalog.local_entries() {
            let config = ServiceConfig::new(entry.name.clone())
                .endpoint(entry.endpoint.clone())
                .timeout(DISCOVERY_TIMEOUT);
            let Ok(client) = self.factory.build(&entry.name, &config) else {
                continue;
            };
            let reachable = matches!(
                tokio::time::timeout(DISCOVERY_TIMEOUT, client.health_check()).await,
                Ok(Ok(status)) if status.healthy
            );
            if !reachable {
                debug!(provider = %entry.name, "local provider unreachable, skipping");
                let _ = client.close().await;
                continue;
            }
            let models = match client.capabilities().await {
                Ok(caps) => caps.models.into_iter().map(|m| m.id).collect(),
                Err(_) => entry.models.iter().map(|m| m.id.clone()).collect(),
            };
            let _ = client.close().await;
            providers.push(ProviderInfo {
                name: entry.name.clone(),
                kind: entry.name.clone(),
                endpoint: entry.endpoint.clone(),
                available: true,
                requires_api_key: entry.requires_api_key,
                models,
            });
        }

        for entry in catalog.cloud_entries() {
            providers.push(ProviderInfo {
                name: entry.name.clone(),
                kind: entry.name.clone(),
                endpoint: entry.endpoint.clone(),
                available: true,
                requires_api_key: entry.requires_api_key,
                models: entry.models.iter().map(|m| m.id.clone()).collect(),
            });
        }
        providers
    }

    /// Test a provider config without installing anything: build a
    /// throwaway client, probe it, close it, report.
    pub async fn test_connection(&self, config: &ServiceConfig) -> ConnectionTest {
        let provider = config.provider.clone();
        let model = config.model.clone().unwrap_or_default();
        let client = match self.factory.build("connection-test", config) {
            Ok(client) => client,
            Err(e) => {
                return ConnectionTest {
                    success: false,
                    message: e.to_string(),
                    response_time: Duration::ZERO,
                    provider,
                    model,
                    error: Some(e.to_string()),
                };
            }
        };
        let status = probe(client.clone()).await;
        if let Err(e) = client.close().await {
            warn!(error = %e, "failed to close connection-test client");
        }
        ConnectionTest {
            success: status.healthy,
            message: status.status.clone(),
            response_time: status.response_time,
            provider,
            model,
            error: (!status.healthy).then(|| status.status),
        }
    }

    /// Close every client. Errors are logged and aggregated into one
    /// composite error; shutdown itself never fails partway.
    pub async fn close(&self) -> Result<()> {
        let drained: Vec<(String, Arc<dyn ProviderClient>)> = {
            let mut clients = self.clients.write().expect("manager lock poisoned");
            clients
                .drain()
                .map(|(name, entry)| (name, entry.client))
                .collect()
        };
        let mut failures = Vec::new();
        for (name, client) in drained {
            if let Some(balancer) = &self.balancer {
                balancer.unregister_client(&name);
            }
            if let Err(e) = client.close().await {
                warn!(client = %name, error = %e, "client close failed");
                failures.push(format!("{name}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SqlForgeError::Shutdown(failures.join("; ")))
        }
    }
}

/// Run a bounded health probe, fabricating an unhealthy status from
/// errors and timeouts so callers always get a report.
async fn probe(client: Arc<dyn ProviderClient>) -> HealthStatus {
    let started = Instant::now();
    match tokio::time::timeout(PROBE_TIMEOUT, client.health_check()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => HealthStatus::unhealthy(e.to_string(), started.elapsed()),
        Err(_) => HealthStatus::unhealthy("health probe timed out", started.elapsed()),
    }
}
