//! Embedded provider catalog.
//!
//! Canonical endpoints, default models, and per-model cost data for the
//! providers sqlforge knows out of the box. The catalog is built once and
//! treated as immutable; the `SQLFORGE_CATALOG` environment variable may
//! point at a JSON file that replaces the built-in table (the only
//! environment coupling in the crate).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ProviderKind;

/// Environment variable naming an external catalog JSON file.
pub const CATALOG_ENV: &str = "SQLFORGE_CATALOG";

/// One model row in a catalog entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CatalogModel {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub context_window: u32,
    /// USD per 1K input tokens; zero when unknown (local models).
    #[serde(default)]
    pub input_cost_per_1k: f64,
    /// USD per 1K output tokens; zero when unknown.
    #[serde(default)]
    pub output_cost_per_1k: f64,
}

/// One provider row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CatalogEntry {
    /// Catalog name; doubles as the provider kind string.
    pub name: String,
    /// Canonical endpoint.
    pub endpoint: String,
    pub default_model: String,
    #[serde(default)]
    pub models: Vec<CatalogModel>,
    #[serde(default = "default_true")]
    pub requires_api_key: bool,
    /// Local deployments are probed during discovery; cloud entries are
    /// listed available and gated on API keys instead.
    #[serde(default)]
    pub local: bool,
}

impl CatalogEntry {
    /// The provider kind this entry describes.
    pub fn kind(&self) -> Option<ProviderKind> {
        ProviderKind::from_str(&self.name).ok()
    }
}

fn default_true() -> bool {
    true
}

/// The provider catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// Resolve the catalog: the `SQLFORGE_CATALOG` file when set and
    /// readable, the built-in table otherwise. A broken override logs a
    /// warning and falls back rather than failing construction.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CATALOG_ENV) {
            match Self::from_file(&path) {
                Ok(catalog) => return catalog,
                Err(reason) => {
                    warn!(path = %path, %reason, "catalog override unusable, using builtin");
                }
            }
        }
        Self::builtin()
    }

    /// Parse a catalog from a JSON file.
    pub fn from_file(path: &str) -> std::result::Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }

    /// First entry for a provider kind.
    pub fn entry_for(&self, kind: ProviderKind) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.kind() == Some(kind))
    }

    /// Canonical endpoint for a kind.
    pub fn endpoint_for(&self, kind: ProviderKind) -> Option<&str> {
        self.entry_for(kind).map(|e| e.endpoint.as_str())
    }

    /// Canonical default model for a kind.
    pub fn default_model_for(&self, kind: ProviderKind) -> Option<&str> {
        self.entry_for(kind).map(|e| e.default_model.as_str())
    }

    /// Cloud entries (non-local), in catalog order.
    pub fn cloud_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| !e.local)
    }

    /// Local entries, in catalog order.
    pub fn local_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.local)
    }

    /// The built-in provider table.
    pub fn builtin() -> Self {
        let entries = vec![
            CatalogEntry {
                name: "openai".into(),
                endpoint: "https://api.openai.com/v1".into(),
                default_model: "gpt-4o-mini".into(),
                models: vec![
                    model("gpt-4o", "GPT-4o", "flagship multimodal model", 128_000, 0.0025, 0.01),
                    model(
                        "gpt-4o-mini",
                        "GPT-4o mini",
                        "fast, low-cost general model",
                        128_000,
                        0.000_15,
                        0.0006,
                    ),
                ],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "anthropic".into(),
                endpoint: "https://api.anthropic.com".into(),
                default_model: "claude-sonnet-4-20250514".into(),
                models: vec![
                    model(
                        "claude-sonnet-4-20250514",
                        "Claude Sonnet 4",
                        "balanced reasoning model",
                        200_000,
                        0.003,
                        0.015,
                    ),
                    model(
                        "claude-3-5-haiku-20241022",
                        "Claude 3.5 Haiku",
                        "fast lightweight model",
                        200_000,
                        0.0008,
                        0.004,
                    ),
                ],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "deepseek".into(),
                endpoint: "https://api.deepseek.com/v1".into(),
                default_model: "deepseek-chat".into(),
                models: vec![
                    model(
                        "deepseek-chat",
                        "DeepSeek Chat",
                        "general chat model",
                        64_000,
                        0.000_27,
                        0.0011,
                    ),
                    model(
                        "deepseek-reasoner",
                        "DeepSeek Reasoner",
                        "reasoning-tuned model",
                        64_000,
                        0.000_55,
                        0.002_19,
                    ),
                ],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "moonshot".into(),
                endpoint: "https://api.moonshot.cn/v1".into(),
                default_model: "moonshot-v1-8k".into(),
                models: vec![
                    model("moonshot-v1-8k", "Moonshot v1 8K", "", 8_192, 0.0017, 0.0017),
                    model("moonshot-v1-32k", "Moonshot v1 32K", "", 32_768, 0.0034, 0.0034),
                ],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "zhipu".into(),
                endpoint: "https://open.bigmodel.cn/api/paas/v4".into(),
                default_model: "glm-4".into(),
                models: vec![
                    model("glm-4", "GLM-4", "", 128_000, 0.0014, 0.0014),
                    model("glm-4-flash", "GLM-4 Flash", "", 128_000, 0.0001, 0.0001),
                ],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "baichuan".into(),
                endpoint: "https://api.baichuan-ai.com/v1".into(),
                default_model: "Baichuan4".into(),
                models: vec![model("Baichuan4", "Baichuan 4", "", 32_768, 0.014, 0.014)],
                requires_api_key: true,
                local: false,
            },
            CatalogEntry {
                name: "ollama".into(),
                endpoint: "http://localhost:11434".into(),
                default_model: "llama3.1".into(),
                models: vec![
                    model("llama3.1", "Llama 3.1", "local default", 128_000, 0.0, 0.0),
                    model("qwen2.5-coder", "Qwen 2.5 Coder", "code-tuned local model", 32_768, 0.0, 0.0),
                ],
                requires_api_key: false,
                local: true,
            },
        ];
        Self { entries }
    }
}

fn model(
    id: &str,
    display_name: &str,
    description: &str,
    context_window: u32,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> CatalogModel {
    CatalogModel {
        id: id.into(),
        display_name: display_name.into(),
        description: description.into(),
        context_window,
        input_cost_per_1k,
        output_cost_per_1k,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_catalog_kind() {
        let catalog = Catalog::builtin();
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::DeepSeek,
            ProviderKind::Moonshot,
            ProviderKind::Zhipu,
            ProviderKind::Baichuan,
            ProviderKind::Ollama,
        ] {
            assert!(
                catalog.entry_for(kind).is_some(),
                "missing catalog entry for {kind}"
            );
        }
        // Custom deployments have no canonical endpoint.
        assert!(catalog.entry_for(ProviderKind::Custom).is_none());
    }

    #[test]
    fn ollama_is_the_only_local_entry() {
        let catalog = Catalog::builtin();
        let locals: Vec<&str> = catalog.local_entries().map(|e| e.name.as_str()).collect();
        assert_eq!(locals, vec!["ollama"]);
        assert!(!catalog.entry_for(ProviderKind::Ollama).unwrap().requires_api_key);
    }

    #[test]
    fn cloud_entries_require_keys() {
        let catalog = Catalog::builtin();
        assert!(catalog.cloud_entries().all(|e| e.requires_api_key));
    }

    #[test]
    fn deepseek_endpoint_is_versioned() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.endpoint_for(ProviderKind::DeepSeek),
            Some("https://api.deepseek.com/v1")
        );
    }
}
