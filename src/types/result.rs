//! Caller-facing SQL generation result types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Query shape derived from the leading SQL keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Unknown,
}

impl QueryType {
    /// Classify SQL by its first keyword. Anything unrecognized is `Unknown`.
    pub fn classify(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match keyword.as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "ALTER" => Self::Alter,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural complexity label for a generated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    /// Map a structural-construct count to a label.
    pub fn from_construct_count(count: usize) -> Self {
        match count {
            0 => Self::Simple,
            1..=2 => Self::Moderate,
            3..=4 => Self::Complex,
            _ => Self::VeryComplex,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of dialect validation on generated SQL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// False when any error-level finding exists.
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// A passing outcome with no findings.
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Per-request metadata attached to a generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub request_id: String,
    pub processing_time: Duration,
    pub model_used: String,
    /// Dialect the SQL targets, e.g. "mysql".
    pub database_dialect: String,
    pub query_type: QueryType,
    /// Upper-cased table names referenced by the query.
    pub tables_involved: Vec<String>,
    pub complexity: Complexity,
}

/// Final result handed back to the application host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Confidence in `[0, 1]`; parsed results carry 0.8.
    pub confidence_score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub metadata: GenerationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_the_statement_keywords() {
        assert_eq!(QueryType::classify("SELECT 1"), QueryType::Select);
        assert_eq!(QueryType::classify("  insert into t"), QueryType::Insert);
        assert_eq!(QueryType::classify("Update t set a=1"), QueryType::Update);
        assert_eq!(QueryType::classify("DELETE FROM t"), QueryType::Delete);
        assert_eq!(QueryType::classify("create table t(a)"), QueryType::Create);
        assert_eq!(QueryType::classify("DROP TABLE t"), QueryType::Drop);
        assert_eq!(QueryType::classify("ALTER TABLE t"), QueryType::Alter);
        assert_eq!(QueryType::classify("EXPLAIN SELECT 1"), QueryType::Unknown);
        assert_eq!(QueryType::classify(""), QueryType::Unknown);
    }

    #[test]
    fn complexity_thresholds() {
        assert_eq!(Complexity::from_construct_count(0), Complexity::Simple);
        assert_eq!(Complexity::from_construct_count(1), Complexity::Moderate);
        assert_eq!(Complexity::from_construct_count(2), Complexity::Moderate);
        assert_eq!(Complexity::from_construct_count(3), Complexity::Complex);
        assert_eq!(Complexity::from_construct_count(4), Complexity::Complex);
        assert_eq!(Complexity::from_construct_count(5), Complexity::VeryComplex);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(QueryType::Select.to_string(), "SELECT");
        assert_eq!(Complexity::VeryComplex.to_string(), "very_complex");
    }
}
