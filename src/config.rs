//! Host-facing configuration schema.
//!
//! Sqlforge never reads configuration from disk or the environment itself;
//! the application host decodes whatever it stores (TOML, YAML, a settings
//! service) into these types and hands the crate a snapshot. Durations are
//! accepted in two wire forms — human-readable strings (`"30s"`, `"500ms"`)
//! and plain nanosecond integers — and normalized during decoding.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Root configuration snapshot.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// AI orchestration configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AiConfig {
    /// Name of the service tried first when dispatching.
    #[serde(default)]
    pub default_service: String,
    /// Service name → provider descriptor.
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
    /// Retry policy applied by the manager.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl AiConfig {
    /// Names of enabled services, sorted for deterministic iteration.
    pub fn enabled_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .services
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// A named provider descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider kind: `openai`, `anthropic`, `ollama`/`local`, `deepseek`,
    /// `moonshot`, `zhipu`, `baichuan`, or `custom`.
    pub provider: String,
    /// Endpoint URL; falls back to the catalog default for the kind.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier; falls back to the catalog default for the kind.
    #[serde(default)]
    pub model: Option<String>,
    /// Per-request token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Selection priority; higher is preferred. Informational for hosts.
    #[serde(default)]
    pub priority: i32,
    /// Per-request timeout.
    #[serde(default, with = "flexible_duration::option")]
    pub timeout: Option<Duration>,
}

impl ServiceConfig {
    /// A minimal enabled descriptor for the given provider kind.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            enabled: true,
            provider: provider.into(),
            endpoint: None,
            api_key: None,
            model: None,
            max_tokens: None,
            temperature: None,
            priority: 0,
            timeout: None,
        }
    }

    /// Set the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Retry policy settings as configured by the host.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay", with = "flexible_duration")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "flexible_duration")]
    pub max_delay: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .base_delay(settings.initial_delay)
            .max_delay(settings.max_delay)
            .multiplier(settings.multiplier)
            .jitter(settings.jitter)
    }
}

/// Database defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Default SQL dialect: `mysql`, `postgresql`/`postgres`, or `sqlite`.
    #[serde(default = "default_db_type")]
    pub default_type: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_type: default_db_type(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_db_type() -> String {
    "mysql".to_string()
}

/// Parse a human-readable duration such as `"30s"`, `"1.5m"`, or `"250ms"`.
///
/// Supported suffixes: `ns`, `us`, `ms`, `s`, `m`, `h`. A bare number is
/// rejected — numeric wire values are nanoseconds and take the integer path.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("duration {trimmed:?} is missing a unit suffix"))?;
    let (value, unit) = trimmed.split_at(split);
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value in {trimmed:?}"))?;
    if value < 0.0 {
        return Err(format!("negative duration {trimmed:?}"));
    }
    let seconds = match unit.trim() {
        "ns" => value / 1_000_000_000.0,
        "us" | "µs" => value / 1_000_000.0,
        "ms" => value / 1_000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        other => return Err(format!("unknown duration unit {other:?}")),
    };
    Ok(Duration::from_secs_f64(seconds))
}

/// Serde adapter accepting `"30s"` strings or nanosecond integers.
pub mod flexible_duration {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{Deserializer, Error as DeError, Visitor};
    use serde::ser::Serializer;

    use super::parse_duration;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration string like \"30s\" or a nanosecond integer")
        }

        fn visit_u64<E: DeError>(self, ns: u64) -> Result<Duration, E> {
            Ok(Duration::from_nanos(ns))
        }

        fn visit_i64<E: DeError>(self, ns: i64) -> Result<Duration, E> {
            u64::try_from(ns)
                .map(Duration::from_nanos)
                .map_err(|_| E::custom("negative duration"))
        }

        fn visit_str<E: DeError>(self, s: &str) -> Result<Duration, E> {
            parse_duration(s).map_err(E::custom)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_nanos() as u64)
    }

    /// Variant for `Option<Duration>` fields.
    pub mod option {
        use std::fmt;
        use std::time::Duration;

        use serde::de::{Deserializer, Error as DeError, Visitor};
        use serde::ser::Serializer;

        struct OptionVisitor;

        impl<'de> Visitor<'de> for OptionVisitor {
            type Value = Option<Duration>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an optional duration string or nanosecond integer")
            }

            fn visit_none<E: DeError>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_unit<E: DeError>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_some<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<Self::Value, D::Error> {
                super::deserialize(deserializer).map(Some)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            deserializer.deserialize_option(OptionVisitor)
        }

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_nanos() as u64)),
                None => serializer.serialize_none(),
            }
        }
    }
}
