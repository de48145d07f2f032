//! Natural language in, dialect-aware SQL out.
//!
//! This crate sits between an application host and several remote LLM
//! providers (OpenAI-compatible HTTP APIs, Anthropic, local Ollama
//! deployments) and turns natural-language requests into SQL for a chosen
//! dialect, hiding provider heterogeneity, unreliability, and per-tenant
//! configurability behind a small set of orchestration components.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlforge::{
//!     AppConfig, ClientFactory, ClientManager, GenerationOptions, SqlGenerator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> sqlforge::Result<()> {
//!     let config: AppConfig = serde_json::from_str(r#"{
//!         "ai": {
//!             "default_service": "primary",
//!             "services": {
//!                 "primary": {"provider": "deepseek", "api_key": "sk-your-key"}
//!             }
//!         }
//!     }"#)?;
//!
//!     let manager = Arc::new(ClientManager::from_config(
//!         &config.ai,
//!         ClientFactory::default(),
//!     )?);
//!     let generator = SqlGenerator::new(manager);
//!
//!     let result = generator
//!         .generate("List users older than 18", &GenerationOptions::default())
//!         .await?;
//!     println!("{}", result.sql);
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod breaker;
pub mod capabilities;
pub mod catalog;
pub mod client;
pub mod config;
pub mod dialect;
pub mod error;
pub mod generator;
pub mod manager;
pub mod retry;
pub mod telemetry;
pub mod types;

// Crate-root re-exports: the whole public surface is reachable without
// spelling module paths.
pub use balancer::{ClientStats, LoadBalancer, Strategy};
pub use breaker::{BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use capabilities::{CapabilityDetector, CapabilityRequest, CapabilitySnapshot};
pub use catalog::Catalog;
pub use client::{ClientFactory, ProviderClient, ProviderKind};
pub use config::{AiConfig, AppConfig, DatabaseConfig, RetrySettings, ServiceConfig};
pub use dialect::{DatabaseType, Dialect, dialect_for};
pub use error::{Result, SqlForgeError};
pub use generator::{
    ColumnSchema, CustomPrompts, GenerationOptions, RuntimeOverride, SqlGenerator, TableSchema,
};
pub use manager::{AddClientOptions, ClientManager};
pub use retry::{RetryConfig, RetryExecutor};

pub use types::{
    Complexity, ConnectionTest, GenerateRequest, GenerateResponse, GenerationMetadata,
    GenerationResult, HealthStatus, ModelInfo, ProviderCapabilities, ProviderInfo, QueryType,
    Usage, ValidationOutcome,
};
