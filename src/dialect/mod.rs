//! SQL dialect adapters: MySQL, PostgreSQL, SQLite.
//!
//! Validation here is heuristic, not grammatical — it catches the
//! cross-dialect mistakes LLMs actually make (MySQL-style LIMIT in
//! PostgreSQL, backticks outside MySQL, RIGHT JOIN in SQLite), not
//! arbitrary syntax errors. Transformation implements the six pairwise
//! conversions with regex-grade rewriting; it is deliberately not an AST.

mod mysql;
mod postgres;
mod sqlite;

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::ValidationOutcome;
use crate::{Result, SqlForgeError};

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseType {
    #[default]
    MySql,
    PostgreSql,
    Sqlite,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = SqlForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::PostgreSql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SqlForgeError::UnknownDialect(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dialect descriptor: validation, optimization hints, formatting,
/// vocabulary, and cross-dialect transformation.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn database_type(&self) -> DatabaseType;

    /// Heuristic validation. Empty SQL is an error, a missing trailing
    /// semicolon a warning; dialect impls add their own findings.
    fn validate_sql(&self, sql: &str) -> ValidationOutcome;

    /// Return the SQL unchanged plus generic improvement suggestions.
    fn optimize_sql(&self, sql: &str) -> (String, Vec<String>);

    /// Insert a newline before each major keyword.
    fn format_sql(&self, sql: &str) -> String {
        format_with_keyword_newlines(sql)
    }

    fn data_types(&self) -> &'static [&'static str];

    fn functions(&self) -> &'static [&'static str];

    fn keywords(&self) -> &'static [&'static str];

    /// Convert SQL written for this dialect into `target`. Converting to
    /// the same dialect is the identity.
    fn transform_sql(&self, sql: &str, target: DatabaseType) -> Result<String>;
}

/// Look up the adapter for a dialect. Adapters are stateless statics.
pub fn dialect_for(database: DatabaseType) -> &'static dyn Dialect {
    match database {
        DatabaseType::MySql => &MySqlDialect,
        DatabaseType::PostgreSql => &PostgresDialect,
        DatabaseType::Sqlite => &SqliteDialect,
    }
}

// ============================================================================
// Shared heuristics
// ============================================================================

/// Findings every dialect shares: empty SQL, missing trailing semicolon.
pub(crate) fn base_validate(sql: &str) -> ValidationOutcome {
    let trimmed = sql.trim();
    let mut outcome = ValidationOutcome::ok();
    if trimmed.is_empty() {
        outcome.valid = false;
        outcome.errors.push("SQL statement is empty".to_string());
        return outcome;
    }
    if !trimmed.ends_with(';') {
        outcome
            .warnings
            .push("statement does not end with a semicolon".to_string());
    }
    outcome
}

/// Generic optimization suggestions shared by all dialects.
pub(crate) fn generic_suggestions(sql: &str) -> Vec<String> {
    let upper = sql.to_uppercase();
    let mut suggestions = Vec::new();
    if upper.contains("SELECT") && !upper.contains("LIMIT") {
        suggestions.push("consider adding a LIMIT clause to bound the result set".to_string());
    }
    if upper.contains("WHERE") {
        suggestions.push("ensure columns referenced in WHERE are covered by an index".to_string());
    }
    if upper.contains("IN (SELECT") || upper.contains("IN(SELECT") {
        suggestions.push("prefer EXISTS over IN with a subquery for better plans".to_string());
    }
    suggestions
}

/// Newline-before-keyword formatting shared by all dialects.
pub(crate) fn format_with_keyword_newlines(sql: &str) -> String {
    static KEYWORDS: OnceLock<Regex> = OnceLock::new();
    let re = KEYWORDS.get_or_init(|| {
        Regex::new(
            r"(?i)\s+(FROM|WHERE|GROUP BY|HAVING|ORDER BY|LIMIT|LEFT JOIN|RIGHT JOIN|INNER JOIN|FULL JOIN|OUTER JOIN|CROSS JOIN|JOIN|UNION|VALUES|SET|ON)\b",
        )
        .expect("formatting regex compiles")
    });
    re.replace_all(sql.trim(), "\n$1").into_owned()
}

// ============================================================================
// Shared transform rewrites
// ============================================================================

/// `LIMIT offset, count` → `LIMIT count OFFSET offset`.
pub(crate) fn rewrite_limit_comma_to_offset(sql: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bLIMIT\s+(\d+)\s*,\s*(\d+)").expect("limit regex compiles")
    });
    re.replace_all(sql, "LIMIT $2 OFFSET $1").into_owned()
}

/// `LIMIT count OFFSET offset` → `LIMIT offset, count`.
pub(crate) fn rewrite_limit_offset_to_comma(sql: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bLIMIT\s+(\d+)\s+OFFSET\s+(\d+)").expect("limit regex compiles")
    });
    re.replace_all(sql, "LIMIT $2, $1").into_owned()
}

/// `SUBSTR(x, p, l)` / `SUBSTRING(x, p, l)` → `SUBSTRING(x FROM p FOR l)`.
pub(crate) fn rewrite_substring_to_from_for(sql: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bSUBSTR(?:ING)?\s*\(\s*([^,()]+?)\s*,\s*([^,()]+?)\s*,\s*([^,()]+?)\s*\)")
            .expect("substring regex compiles")
    });
    re.replace_all(sql, "SUBSTRING($1 FROM $2 FOR $3)").into_owned()
}

/// `SUBSTRING(x FROM p FOR l)` → `{function}(x, p, l)`.
pub(crate) fn rewrite_from_for_to_commas(sql: &str, function: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bSUBSTRING\s*\(\s*([^,()]+?)\s+FROM\s+([^,()]+?)\s+FOR\s+([^,()]+?)\s*\)")
            .expect("substring regex compiles")
    });
    re.replace_all(sql, format!("{function}($1, $2, $3)").as_str())
        .into_owned()
}

/// `SUBSTR(x, p, l)` ↔ `SUBSTRING(x, p, l)` (comma form, renamed function).
pub(crate) fn rename_substring_function(sql: &str, to: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bSUBSTR(?:ING)?\s*\(").expect("substring rename regex compiles")
    });
    re.replace_all(sql, format!("{to}(").as_str()).into_owned()
}

/// Case-insensitive whole-word function-call replacement, e.g.
/// `NOW()` → `DATETIME('now')`.
pub(crate) fn replace_function_call(sql: &str, from: &str, to: &str) -> String {
    let pattern = format!(r"(?i)\b{}\s*\(\s*\)", regex::escape(from));
    let re = Regex::new(&pattern).expect("function replacement regex compiles");
    re.replace_all(sql, to).into_owned()
}
