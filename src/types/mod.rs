//! Shared entity types.

mod capability;
mod generate;
mod result;

pub use capability::{
    ConnectionTest, HealthStatus, ModelInfo, ProviderCapabilities, ProviderInfo, RateLimits,
};
pub use generate::{GenerateRequest, GenerateResponse, Usage};
pub use result::{
    Complexity, GenerationMetadata, GenerationResult, QueryType, ValidationOutcome,
};
