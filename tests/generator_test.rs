use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlforge::retry::RetryConfig;
use sqlforge::{
    Catalog, ClientFactory, ClientManager, Complexity, DatabaseType, GenerateRequest,
    GenerateResponse, GenerationOptions, HealthStatus, ProviderCapabilities, ProviderClient,
    QueryType, Result, RuntimeOverride, SqlForgeError, SqlGenerator, Usage,
};

/// Mock client returning a canned response body.
struct CannedClient {
    body: String,
    calls: AtomicU32,
}

impl CannedClient {
    fn arc(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_string(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ProviderClient for CannedClient {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GenerateResponse {
            text: self.body.clone(),
            usage: Usage::new(42, 17),
            model: "mock-model".into(),
            request_id: "req-42".into(),
            confidence: 1.0,
            processing_time: Some(Duration::from_millis(3)),
        })
    }

    async fn capabilities(&self) -> Result<ProviderCapabilities> {
        Ok(ProviderCapabilities::default())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::healthy("ok", Duration::from_millis(1)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

async fn generator_with_body(body: &str) -> SqlGenerator {
    let manager = ClientManager::new(
        ClientFactory::new(Arc::new(Catalog::builtin())),
        RetryConfig::disabled(),
        "canned",
    );
    manager.register_client("canned", CannedClient::arc(body)).await;
    SqlGenerator::new(Arc::new(manager))
}

#[tokio::test]
async fn primary_format_end_to_end() {
    let generator = generator_with_body(
        "sql:SELECT * FROM users WHERE age > 18;\nexplanation:Users over 18.",
    )
    .await;

    let options = GenerationOptions::default();
    let result = generator
        .generate("List users older than 18", &options)
        .await
        .unwrap();

    assert_eq!(result.sql, "SELECT * FROM users WHERE age > 18;");
    assert_eq!(result.explanation.as_deref(), Some("Users over 18."));
    assert_eq!(result.metadata.query_type, QueryType::Select);
    assert_eq!(result.metadata.tables_involved, vec!["USERS".to_string()]);
    assert_eq!(result.metadata.complexity, Complexity::Simple);
    assert_eq!(result.metadata.database_dialect, "mysql");
    assert_eq!(result.metadata.model_used, "mock-model");
    assert!((result.confidence_score - 0.8).abs() < f32::EPSILON);
    assert!(result.warnings.is_empty());
    assert!(result.validation.as_ref().unwrap().valid);
}

#[tokio::test]
async fn json_fallback_end_to_end() {
    let generator = generator_with_body(
        r#"{"sql":"SELECT name FROM users;","explanation":"just names","suggestions":["add LIMIT"]}"#,
    )
    .await;

    let result = generator
        .generate("names of users", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(result.sql, "SELECT name FROM users;");
    assert_eq!(result.explanation.as_deref(), Some("just names"));
    assert_eq!(result.suggestions, vec!["add LIMIT".to_string()]);
}

#[tokio::test]
async fn fenced_body_end_to_end() {
    let generator = generator_with_body("```sql\nSELECT id FROM orders;\n```").await;
    let result = generator
        .generate("order ids", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(result.sql, "SELECT id FROM orders;");
}

#[tokio::test]
async fn unusable_body_degrades_to_placeholder() {
    let generator = generator_with_body("sql:").await;
    let result = generator
        .generate("anything", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(result.sql, "SELECT 1 as placeholder;");
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("placeholder"))
    );
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let generator = generator_with_body("sql:SELECT 1;").await;
    let err = generator
        .generate("   ", &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlForgeError::InvalidInput(_)));
}

#[tokio::test]
async fn explanation_is_dropped_when_not_requested() {
    let generator = generator_with_body("sql:SELECT 1;\nexplanation:trivial").await;
    let options = GenerationOptions {
        include_explanation: false,
        ..GenerationOptions::default()
    };
    let result = generator.generate("one", &options).await.unwrap();
    assert!(result.explanation.is_none());
}

#[tokio::test]
async fn validation_findings_demote_to_warnings() {
    // Backticks are invalid PostgreSQL; generation must still succeed.
    let generator = generator_with_body("sql:SELECT * FROM `users`;").await;
    let options = GenerationOptions::new(DatabaseType::PostgreSql);
    let result = generator.generate("all users", &options).await.unwrap();

    let validation = result.validation.as_ref().unwrap();
    assert!(!validation.valid);
    assert!(result.warnings.iter().any(|w| w.starts_with("validation:")));
    assert_eq!(result.sql, "SELECT * FROM `users`;");
}

#[tokio::test]
async fn optimization_appends_suggestions() {
    let generator = generator_with_body("sql:SELECT * FROM users WHERE age > 18;").await;
    let options = GenerationOptions {
        optimize_query: true,
        ..GenerationOptions::default()
    };
    let result = generator.generate("adults", &options).await.unwrap();
    // Optimization keeps the SQL and adds generic suggestions.
    assert_eq!(result.sql, "SELECT * FROM users WHERE age > 18;");
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn complexity_reflects_query_structure() {
    let generator = generator_with_body(
        "sql:SELECT * FROM a JOIN b ON a.id = b.id GROUP BY a.x HAVING COUNT(*) > 1;",
    )
    .await;
    let result = generator
        .generate("grouped join", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(result.metadata.complexity, Complexity::Complex);
    assert_eq!(
        result.metadata.tables_involved,
        vec!["A".to_string(), "B".to_string()]
    );
}

// ============================================================================
// Runtime-override client cache
// ============================================================================

fn override_spec(api_key: &str) -> RuntimeOverride {
    RuntimeOverride {
        provider: "deepseek".into(),
        endpoint: None,
        model: None,
        api_key: api_key.into(),
        max_tokens: Some(2_000),
        timeout: None,
    }
}

async fn bare_generator() -> SqlGenerator {
    let manager = ClientManager::new(
        ClientFactory::new(Arc::new(Catalog::builtin())),
        RetryConfig::disabled(),
        "unused",
    );
    SqlGenerator::new(Arc::new(manager))
}

#[tokio::test]
async fn runtime_client_is_reused_for_identical_overrides() {
    let generator = bare_generator().await;
    let first = generator.runtime_client(&override_spec("k1")).await.unwrap();
    let second = generator.runtime_client(&override_spec("k1")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(generator.runtime_clients().len(), 1);
}

#[tokio::test]
async fn rotated_api_key_displaces_the_cached_client() {
    let generator = bare_generator().await;
    let first = generator.runtime_client(&override_spec("k1")).await.unwrap();
    let second = generator.runtime_client(&override_spec("k2")).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    // Same cache key: the rotated entry replaced the original.
    assert_eq!(generator.runtime_clients().len(), 1);

    let third = generator.runtime_client(&override_spec("k2")).await.unwrap();
    assert!(Arc::ptr_eq(&second, &third));
}

#[tokio::test]
async fn distinct_models_get_distinct_cache_entries() {
    let generator = bare_generator().await;
    let chat = generator.runtime_client(&override_spec("k1")).await.unwrap();
    let mut reasoner = override_spec("k1");
    reasoner.model = Some("deepseek-reasoner".into());
    let other = generator.runtime_client(&reasoner).await.unwrap();
    assert!(!Arc::ptr_eq(&chat, &other));
    assert_eq!(generator.runtime_clients().len(), 2);
}

#[tokio::test]
async fn close_empties_the_cache_and_later_calls_rebuild() {
    let generator = bare_generator().await;
    let first = generator.runtime_client(&override_spec("k1")).await.unwrap();
    generator.close().await;
    assert_eq!(generator.runtime_clients().len(), 0);

    let rebuilt = generator.runtime_client(&override_spec("k1")).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[tokio::test]
async fn override_without_key_uses_the_manager_path() {
    let manager = ClientManager::new(
        ClientFactory::new(Arc::new(Catalog::builtin())),
        RetryConfig::disabled(),
        "canned",
    );
    let client = CannedClient::arc("sql:SELECT 1;");
    manager.register_client("canned", client.clone()).await;
    let generator = SqlGenerator::new(Arc::new(manager));

    // Provider set but no API key: not a runtime override.
    let options = GenerationOptions {
        provider: Some("deepseek".into()),
        ..GenerationOptions::default()
    };
    generator.generate("one", &options).await.unwrap();
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.runtime_clients().len(), 0);
}
