//! Load balancer over provider clients.
//!
//! Four selection strategies operate over the set of currently healthy
//! client names, always iterated in lexicographic order so selection is
//! deterministic across runs regardless of registration order. One RW
//! lock guards clients, health flags, stats, and the round-robin counter;
//! selection mutates (counter, per-client request totals) and therefore
//! takes the write lock, but never spans a provider call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::client::ProviderClient;
use crate::telemetry;
use crate::{Result, SqlForgeError};

/// Client selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    RoundRobin,
    /// Highest success ratio wins; a client with no history wins outright.
    Weighted,
    /// Fewest recorded outcomes wins; a never-used client wins outright.
    LeastConnections,
    /// Always the lexicographically first healthy client.
    Failover,
}

impl Strategy {
    /// Parse a strategy name. Unknown names fall back to round-robin.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "weighted" => Self::Weighted,
            "least_connections" => Self::LeastConnections,
            "failover" => Self::Failover,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Weighted => "weighted",
            Self::LeastConnections => "least_connections",
            Self::Failover => "failover",
        }
    }
}

/// Per-client statistics. Reads hand out deep copies.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Exponential-blend estimate: the first sample initializes it, each
    /// later sample moves it to `(avg + rtt) / 2`. Not a true mean.
    pub avg_response_time: Duration,
    pub last_used: Option<Instant>,
    pub healthy: bool,
}

impl ClientStats {
    fn new() -> Self {
        Self {
            requests: 0,
            successes: 0,
            failures: 0,
            avg_response_time: Duration::ZERO,
            last_used: None,
            healthy: true,
        }
    }

    fn outcomes(&self) -> u64 {
        self.successes + self.failures
    }

    fn success_ratio(&self) -> f64 {
        let total = self.outcomes();
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

struct BalancerState {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
    health: HashMap<String, bool>,
    stats: HashMap<String, ClientStats>,
    round_robin: u64,
    total_selections: u64,
}

/// Strategy-based client selection with per-client statistics.
pub struct LoadBalancer {
    strategy: Strategy,
    inner: RwLock<BalancerState>,
}

impl LoadBalancer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            inner: RwLock::new(BalancerState {
                clients: HashMap::new(),
                health: HashMap::new(),
                stats: HashMap::new(),
                round_robin: 0,
                total_selections: 0,
            }),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Register a client. Health starts true, stats start zeroed; an
    /// existing entry under the same name is replaced (the caller owns
    /// closing the displaced client).
    pub fn register_client(&self, name: impl Into<String>, client: Arc<dyn ProviderClient>) {
        let name = name.into();
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        inner.health.insert(name.clone(), true);
        inner.stats.insert(name.clone(), ClientStats::new());
        inner.clients.insert(name, client);
    }

    /// Remove a client entirely, returning it so the caller can close it.
    pub fn unregister_client(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        inner.health.remove(name);
        inner.stats.remove(name);
        inner.clients.remove(name)
    }

    /// Flip a client's health flag and mirror it into the stats entry.
    pub fn update_health(&self, name: &str, healthy: bool) {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        if let Some(flag) = inner.health.get_mut(name) {
            *flag = healthy;
        }
        if let Some(stats) = inner.stats.get_mut(name) {
            stats.healthy = healthy;
        }
    }

    /// Record a successful call and fold its round-trip time into the
    /// running average (first sample initializes, later samples blend).
    pub fn record_success(&self, name: &str, rtt: Duration) {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        if let Some(stats) = inner.stats.get_mut(name) {
            stats.successes += 1;
            if stats.avg_response_time.is_zero() {
                stats.avg_response_time = rtt;
            } else {
                stats.avg_response_time = (stats.avg_response_time + rtt) / 2;
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, name: &str) {
        let mut inner = self.inner.write().expect("balancer lock poisoned");
        if let Some(stats) = inner.stats.get_mut(name) {
            stats.failures += 1;
        }
    }

    /// Healthy client names in lexicographic order.
    pub fn healthy_clients(&self) -> Vec<String> {
        let inner = self.inner.read().expect("balancer lock poisoned");
        let mut names: Vec<String> = inner
            .health
            .iter()
            .filter(|(_, healthy)| **healthy)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Pick a client per the configured strategy.
    ///
    /// Fails with [`SqlForgeError::NoHealthyClients`] when the healthy set
    /// is empty, and [`SqlForgeError::ClientNotFound`] when the chosen name
    /// has raced with an unregister.
    pub fn select_client(&self) -> Result<(String, Arc<dyn ProviderClient>)> {
        let mut inner = self.inner.write().expect("balancer lock poisoned");

        let mut healthy: Vec<String> = inner
            .health
            .iter()
            .filter(|(_, up)| **up)
            .map(|(name, _)| name.clone())
            .collect();
        healthy.sort_unstable();
        if healthy.is_empty() {
            return Err(SqlForgeError::NoHealthyClients);
        }

        let name = match self.strategy {
            Strategy::RoundRobin => {
                let index = (inner.round_robin % healthy.len() as u64) as usize;
                inner.round_robin += 1;
                healthy[index].clone()
            }
            Strategy::Weighted => pick_weighted(&healthy, &inner.stats),
            Strategy::LeastConnections => pick_least_used(&healthy, &inner.stats),
            Strategy::Failover => healthy[0].clone(),
        };

        let client = inner
            .clients
            .get(&name)
            .cloned()
            .ok_or_else(|| SqlForgeError::ClientNotFound(name.clone()))?;

        inner.total_selections += 1;
        if let Some(stats) = inner.stats.get_mut(&name) {
            stats.requests += 1;
            stats.last_used = Some(Instant::now());
        }
        metrics::counter!(
            telemetry::SELECTIONS_TOTAL,
            "strategy" => self.strategy.as_str(),
            "provider" => name.clone(),
        )
        .increment(1);
        debug!(client = %name, strategy = self.strategy.as_str(), "selected client");
        Ok((name, client))
    }

    /// Deep copy of all stats entries.
    pub fn stats(&self) -> HashMap<String, ClientStats> {
        self.inner
            .read()
            .expect("balancer lock poisoned")
            .stats
            .clone()
    }

    /// Total selections served across all clients.
    pub fn total_selections(&self) -> u64 {
        self.inner
            .read()
            .expect("balancer lock poisoned")
            .total_selections
    }
}

/// Highest success ratio; ties keep the lexicographically first candidate.
/// A client with zero recorded outcomes is chosen immediately.
fn pick_weighted(healthy: &[String], stats: &HashMap<String, ClientStats>) -> String {
    let mut best: Option<(&String, f64)> = None;
    for name in healthy {
        let entry = stats.get(name);
        let outcomes = entry.map(ClientStats::outcomes).unwrap_or(0);
        if outcomes == 0 {
            return name.clone();
        }
        let ratio = entry.map(ClientStats::success_ratio).unwrap_or(0.0);
        match best {
            Some((_, best_ratio)) if ratio <= best_ratio => {}
            _ => best = Some((name, ratio)),
        }
    }
    best.map(|(name, _)| name.clone())
        .unwrap_or_else(|| healthy[0].clone())
}

/// Fewest recorded outcomes; ties keep the lexicographically first candidate.
fn pick_least_used(healthy: &[String], stats: &HashMap<String, ClientStats>) -> String {
    let mut best: Option<(&String, u64)> = None;
    for name in healthy {
        let outcomes = stats.get(name).map(ClientStats::outcomes).unwrap_or(0);
        match best {
            Some((_, fewest)) if outcomes >= fewest => {}
            _ => best = Some((name, outcomes)),
        }
    }
    best.map(|(name, _)| name.clone())
        .unwrap_or_else(|| healthy[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parse_falls_back_to_round_robin() {
        assert_eq!(Strategy::parse("weighted"), Strategy::Weighted);
        assert_eq!(Strategy::parse("least_connections"), Strategy::LeastConnections);
        assert_eq!(Strategy::parse("failover"), Strategy::Failover);
        assert_eq!(Strategy::parse("round_robin"), Strategy::RoundRobin);
        assert_eq!(Strategy::parse("chaotic"), Strategy::RoundRobin);
    }

    #[test]
    fn weighted_prefers_zero_history() {
        let mut stats = HashMap::new();
        let mut seasoned = ClientStats::new();
        seasoned.successes = 10;
        stats.insert("alpha".to_string(), seasoned);
        stats.insert("beta".to_string(), ClientStats::new());
        let healthy = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(pick_weighted(&healthy, &stats), "beta");
    }

    #[test]
    fn weighted_ties_break_lexicographically() {
        let mut stats = HashMap::new();
        let mut a = ClientStats::new();
        a.successes = 2;
        let mut b = ClientStats::new();
        b.successes = 2;
        stats.insert("a".to_string(), a);
        stats.insert("b".to_string(), b);
        let healthy = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pick_weighted(&healthy, &stats), "a");
    }

    #[test]
    fn least_used_ties_break_lexicographically() {
        let mut stats = HashMap::new();
        let mut a = ClientStats::new();
        a.successes = 1;
        let mut b = ClientStats::new();
        b.failures = 1;
        stats.insert("a".to_string(), a);
        stats.insert("b".to_string(), b);
        let healthy = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pick_least_used(&healthy, &stats), "a");
    }
}
