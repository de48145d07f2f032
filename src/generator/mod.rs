//! SQL generation orchestrator.
//!
//! `Generate` runs the full pipeline: assemble a deterministic prompt,
//! dispatch it — through a per-request runtime-override client when the
//! caller supplies provider credentials, through the manager (which owns
//! retries) otherwise — parse the constrained response, infer the query
//! shape, and post-process against the target dialect.

mod parse;
mod prompt;
mod runtime;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::dialect::{DatabaseType, dialect_for};
use crate::manager::ClientManager;
use crate::types::{
    Complexity, GenerateRequest, GenerationMetadata, GenerationResult, QueryType,
};
use crate::{Result, SqlForgeError};

use parse::{complexity_score, parse_response, tables_involved};
use prompt::build_prompt;

pub use runtime::{RuntimeClientCache, RuntimeOverride};

/// Confidence assigned to every successfully parsed result.
const PARSED_CONFIDENCE: f32 = 0.8;

/// Column description inside a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub comment: Option<String>,
}

/// Schema for one table, folded into the prompt when provided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
    pub keys: Vec<String>,
    pub indexes: Vec<String>,
}

/// Caller-supplied prompt fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPrompts {
    /// Prepended verbatim before every other section.
    pub preamble: Option<String>,
}

/// Options for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub database_type: DatabaseType,
    /// Model override passed to the provider.
    pub model: Option<String>,
    /// Runtime-override provider kind; combined with `api_key` it routes
    /// the call past the manager to a cached per-tenant client.
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    /// Table name → schema; ordered so prompts stay deterministic.
    pub schema: BTreeMap<String, TableSchema>,
    /// Free-form context lines, rendered as bullets.
    pub context: Vec<String>,
    pub max_tokens: u32,
    pub validate_sql: bool,
    pub optimize_query: bool,
    pub include_explanation: bool,
    pub safety_mode: bool,
    pub custom_prompts: CustomPrompts,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::MySql,
            model: None,
            provider: None,
            api_key: None,
            endpoint: None,
            schema: BTreeMap::new(),
            context: Vec::new(),
            max_tokens: 2_000,
            validate_sql: true,
            optimize_query: false,
            include_explanation: true,
            safety_mode: true,
            custom_prompts: CustomPrompts::default(),
        }
    }
}

impl GenerationOptions {
    pub fn new(database_type: DatabaseType) -> Self {
        Self {
            database_type,
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Route this call through a runtime-override client.
    pub fn with_provider(mut self, provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn context_line(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }

    pub fn table(mut self, name: impl Into<String>, schema: TableSchema) -> Self {
        self.schema.insert(name.into(), schema);
        self
    }

    fn runtime_override(&self) -> Option<RuntimeOverride> {
        let provider = self.provider.as_deref().filter(|p| !p.is_empty())?;
        let api_key = self.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(RuntimeOverride {
            provider: provider.to_string(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: api_key.to_string(),
            max_tokens: Some(self.max_tokens),
            timeout: None,
        })
    }
}

/// Natural language → SQL orchestrator.
pub struct SqlGenerator {
    manager: Arc<ClientManager>,
    runtime: RuntimeClientCache,
}

impl SqlGenerator {
    pub fn new(manager: Arc<ClientManager>) -> Self {
        Self {
            manager,
            runtime: RuntimeClientCache::new(),
        }
    }

    pub fn manager(&self) -> &ClientManager {
        &self.manager
    }

    /// The runtime-override client cache (exposed for hosts that warm or
    /// inspect it).
    pub fn runtime_clients(&self) -> &RuntimeClientCache {
        &self.runtime
    }

    /// Generate SQL for a natural-language request.
    pub async fn generate(
        &self,
        query: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        if query.trim().is_empty() {
            return Err(SqlForgeError::InvalidInput("prompt is empty".into()));
        }
        let started = Instant::now();
        let dialect = dialect_for(options.database_type);

        let mut request = GenerateRequest::new(build_prompt(query, options))
            .max_tokens(options.max_tokens);
        if let Some(model) = options.model.as_deref().filter(|m| !m.is_empty()) {
            request = request.model(model);
        }

        // Runtime-override clients dispatch directly: retries belong to
        // the manager, and an override bypasses the manager entirely.
        let response = match options.runtime_override() {
            Some(spec) => {
                let client = self
                    .runtime
                    .get_or_create(self.manager.factory(), &spec)
                    .await?;
                client.generate(&request).await?
            }
            None => self.manager.generate(&request).await?,
        };

        let parsed = parse_response(&response.text);
        let query_type = QueryType::classify(&parsed.sql);
        let tables = tables_involved(&parsed.sql);
        let complexity = Complexity::from_construct_count(complexity_score(&parsed.sql));

        let request_id = if response.request_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            response.request_id
        };

        let mut result = GenerationResult {
            sql: parsed.sql,
            explanation: if options.include_explanation {
                parsed.explanation
            } else {
                None
            },
            confidence_score: PARSED_CONFIDENCE,
            warnings: parsed.warnings,
            suggestions: parsed.suggestions,
            metadata: GenerationMetadata {
                request_id,
                processing_time: started.elapsed(),
                model_used: response.model,
                database_dialect: dialect.name().to_string(),
                query_type,
                tables_involved: tables,
                complexity,
            },
            validation: None,
        };

        if options.validate_sql {
            let outcome = dialect.validate_sql(&result.sql);
            // Validator findings never fail generation; errors demote to
            // warnings on the result.
            for finding in &outcome.errors {
                result.warnings.push(format!("validation: {finding}"));
            }
            result.validation = Some(outcome);
        }

        if options.optimize_query {
            let (optimized, suggestions) = dialect.optimize_sql(&result.sql);
            result.sql = optimized;
            result.suggestions.extend(suggestions);
        }

        result.metadata.processing_time = started.elapsed();
        Ok(result)
    }

    /// Fetch (building if needed) the cached client for a runtime override.
    pub async fn runtime_client(
        &self,
        spec: &RuntimeOverride,
    ) -> Result<Arc<dyn crate::client::ProviderClient>> {
        self.runtime
            .get_or_create(self.manager.factory(), spec)
            .await
    }

    /// Release every cached runtime client. The manager is owned by the
    /// host and closed separately.
    pub async fn close(&self) {
        self.runtime.close_all().await;
    }
}
