//! Metric names used across the crate.
//!
//! Sqlforge emits through the `metrics` facade and never installs a
//! recorder of its own — the host decides where numbers land, and when it
//! installs nothing every emission is a no-op. The names are gathered here
//! so dashboards and alert rules have one file to read: everything sits in
//! the `sqlforge_` namespace, counters take a `_total` suffix, and the
//! single histogram is denominated in seconds.
//!
//! Label vocabulary: `provider` is the registry name of the client a
//! sample belongs to, `status` separates `"ok"` from `"error"` attempt
//! outcomes, `direction` splits token counts into `"prompt"` and
//! `"completion"`, `strategy` names the balancer policy behind a
//! selection, and `to` names a circuit state being entered.

/// One increment per dispatch attempt the manager makes, successful or
/// not. Labels: `provider`, `status`.
pub const REQUESTS_TOTAL: &str = "sqlforge_requests_total";

/// Wall-clock seconds a successful provider call took. Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "sqlforge_request_duration_seconds";

/// One increment per transient failure the retry engine observed; the
/// first attempt of a call never counts.
pub const RETRIES_TOTAL: &str = "sqlforge_retries_total";

/// Tokens billed by providers. Labels: `provider`, `direction`.
pub const TOKENS_TOTAL: &str = "sqlforge_tokens_total";

/// Circuit breaker state changes. Labels: `to`.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "sqlforge_breaker_transitions_total";

/// Calls turned away at the circuit breaker gate.
pub const BREAKER_REJECTIONS_TOTAL: &str = "sqlforge_breaker_rejections_total";

/// Load balancer picks. Labels: `strategy`, `provider`.
pub const SELECTIONS_TOTAL: &str = "sqlforge_selections_total";

/// Capability snapshots served straight from the cache.
pub const CAPABILITY_CACHE_HITS_TOTAL: &str = "sqlforge_capability_cache_hits_total";

/// Capability snapshot rebuilds (cache empty or past its TTL).
pub const CAPABILITY_CACHE_MISSES_TOTAL: &str = "sqlforge_capability_cache_misses_total";

/// Runtime-override clients constructed by the generator cache.
/// Labels: `provider`.
pub const RUNTIME_CLIENTS_BUILT_TOTAL: &str = "sqlforge_runtime_clients_built_total";

/// Runtime-override clients closed after displacement or shutdown.
/// Labels: `provider`.
pub const RUNTIME_CLIENTS_CLOSED_TOTAL: &str = "sqlforge_runtime_clients_closed_total";
