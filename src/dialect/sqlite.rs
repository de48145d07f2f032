//! SQLite dialect adapter.

use std::sync::OnceLock;

use regex::Regex;

use super::{
    DatabaseType, Dialect, base_validate, generic_suggestions, rename_substring_function,
    rewrite_substring_to_from_for,
};
use crate::Result;
use crate::types::ValidationOutcome;

/// SQLite adapter.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn validate_sql(&self, sql: &str) -> ValidationOutcome {
        let mut outcome = base_validate(sql);
        if outcome.errors.is_empty() {
            if unsupported_join(sql, "RIGHT") {
                outcome.valid = false;
                outcome
                    .errors
                    .push("RIGHT JOIN is not supported; rewrite as LEFT JOIN".into());
            }
            if unsupported_join(sql, "FULL") {
                outcome.valid = false;
                outcome
                    .errors
                    .push("FULL JOIN is not supported; emulate with UNION of LEFT JOINs".into());
            }
        }
        outcome
    }

    fn optimize_sql(&self, sql: &str) -> (String, Vec<String>) {
        (sql.to_string(), generic_suggestions(sql))
    }

    fn data_types(&self) -> &'static [&'static str] {
        &["INTEGER", "REAL", "TEXT", "BLOB", "NUMERIC"]
    }

    fn functions(&self) -> &'static [&'static str] {
        &[
            "DATE", "TIME", "DATETIME", "JULIANDAY", "STRFTIME", "SUBSTR", "LENGTH", "UPPER",
            "LOWER", "TRIM", "IFNULL", "COALESCE", "COUNT", "SUM", "AVG", "MIN", "MAX",
            "GROUP_CONCAT", "RANDOM", "ABS",
        ]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "SELECT", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "INSERT",
            "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "JOIN", "UNION", "DISTINCT",
            "AUTOINCREMENT", "PRAGMA", "VACUUM",
        ]
    }

    fn transform_sql(&self, sql: &str, target: DatabaseType) -> Result<String> {
        match target {
            DatabaseType::Sqlite => Ok(sql.to_string()),
            DatabaseType::MySql => {
                let mut out = replace_datetime_now(sql, "NOW()");
                out = replace_date_now(&out, "CURRENT_DATE");
                out = rename_substring_function(&out, "SUBSTRING");
                Ok(out)
            }
            DatabaseType::PostgreSql => {
                let mut out = replace_datetime_now(sql, "NOW()");
                out = replace_date_now(&out, "CURRENT_DATE");
                out = rewrite_substring_to_from_for(&out);
                Ok(out)
            }
        }
    }
}

fn unsupported_join(sql: &str, side: &str) -> bool {
    let pattern = format!(r"(?i)\b{side}\s+(OUTER\s+)?JOIN\b");
    let re = Regex::new(&pattern).expect("join regex compiles");
    re.is_match(sql)
}

/// `DATETIME('now')` → replacement.
fn replace_datetime_now(sql: &str, to: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bDATETIME\s*\(\s*'now'\s*\)").expect("datetime regex compiles")
    });
    re.replace_all(sql, to).into_owned()
}

/// `DATE('now')` → replacement.
fn replace_date_now(sql: &str, to: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bDATE\s*\(\s*'now'\s*\)").expect("date regex compiles")
    });
    re.replace_all(sql, to).into_owned()
}
