//! PostgreSQL dialect adapter.

use std::sync::OnceLock;

use regex::Regex;

use super::{
    DatabaseType, Dialect, base_validate, generic_suggestions, replace_function_call,
    rewrite_from_for_to_commas, rewrite_limit_offset_to_comma,
};
use crate::Result;
use crate::types::ValidationOutcome;

/// PostgreSQL adapter.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSql
    }

    fn validate_sql(&self, sql: &str) -> ValidationOutcome {
        let mut outcome = base_validate(sql);
        if outcome.errors.is_empty() {
            if has_mysql_limit(sql) {
                outcome.valid = false;
                outcome.errors.push(
                    "MySQL-style LIMIT offset, count is not valid; use LIMIT count OFFSET offset"
                        .into(),
                );
            }
            if sql.contains('`') {
                outcome.valid = false;
                outcome
                    .errors
                    .push("backquoted identifiers are not valid; use double quotes".into());
            }
        }
        outcome
    }

    fn optimize_sql(&self, sql: &str) -> (String, Vec<String>) {
        (sql.to_string(), generic_suggestions(sql))
    }

    fn data_types(&self) -> &'static [&'static str] {
        &[
            "SMALLINT", "INTEGER", "BIGINT", "DECIMAL", "NUMERIC", "REAL", "DOUBLE PRECISION",
            "SERIAL", "BIGSERIAL", "CHAR", "VARCHAR", "TEXT", "BYTEA", "DATE", "TIME",
            "TIMESTAMP", "TIMESTAMPTZ", "INTERVAL", "BOOLEAN", "UUID", "JSON", "JSONB", "ARRAY",
        ]
    }

    fn functions(&self) -> &'static [&'static str] {
        &[
            "NOW", "CURRENT_DATE", "CURRENT_TIMESTAMP", "CONCAT", "SUBSTRING", "LENGTH",
            "CHAR_LENGTH", "UPPER", "LOWER", "TRIM", "COALESCE", "NULLIF", "COUNT", "SUM", "AVG",
            "MIN", "MAX", "STRING_AGG", "TO_CHAR", "DATE_TRUNC", "AGE", "EXTRACT",
        ]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "SELECT", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "INSERT",
            "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "JOIN", "UNION", "DISTINCT",
            "RETURNING", "ILIKE", "LATERAL",
        ]
    }

    fn transform_sql(&self, sql: &str, target: DatabaseType) -> Result<String> {
        match target {
            DatabaseType::PostgreSql => Ok(sql.to_string()),
            DatabaseType::MySql => {
                let mut out = sql.replace('"', "`");
                out = rewrite_limit_offset_to_comma(&out);
                out = rewrite_from_for_to_commas(&out, "SUBSTRING");
                Ok(out)
            }
            DatabaseType::Sqlite => {
                let mut out = sql.replace('"', "");
                out = replace_function_call(&out, "NOW", "DATETIME('now')");
                out = rewrite_from_for_to_commas(&out, "SUBSTR");
                Ok(out)
            }
        }
    }
}

/// `LIMIT offset, count` is MySQL-only.
fn has_mysql_limit(sql: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bLIMIT\s+\d+\s*,\s*\d+").expect("limit regex compiles")
    });
    re.is_match(sql)
}
