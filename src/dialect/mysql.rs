//! MySQL dialect adapter.

use std::sync::OnceLock;

use regex::Regex;

use super::{
    DatabaseType, Dialect, base_validate, generic_suggestions, replace_function_call,
    rewrite_limit_comma_to_offset, rewrite_substring_to_from_for,
};
use crate::Result;
use crate::types::ValidationOutcome;

/// MySQL adapter.
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn validate_sql(&self, sql: &str) -> ValidationOutcome {
        let mut outcome = base_validate(sql);
        if outcome.errors.is_empty() && has_malformed_limit(sql) {
            outcome.valid = false;
            outcome
                .errors
                .push("malformed LIMIT clause; expected LIMIT count or LIMIT offset, count".into());
        }
        outcome
    }

    fn optimize_sql(&self, sql: &str) -> (String, Vec<String>) {
        (sql.to_string(), generic_suggestions(sql))
    }

    fn data_types(&self) -> &'static [&'static str] {
        &[
            "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "BIGINT", "DECIMAL", "FLOAT", "DOUBLE",
            "BIT", "CHAR", "VARCHAR", "TEXT", "MEDIUMTEXT", "LONGTEXT", "BLOB", "DATE", "TIME",
            "DATETIME", "TIMESTAMP", "YEAR", "ENUM", "SET", "JSON",
        ]
    }

    fn functions(&self) -> &'static [&'static str] {
        &[
            "NOW", "CURDATE", "CURTIME", "CONCAT", "SUBSTRING", "SUBSTR", "LENGTH", "UPPER",
            "LOWER", "TRIM", "IFNULL", "COALESCE", "COUNT", "SUM", "AVG", "MIN", "MAX",
            "GROUP_CONCAT", "DATE_FORMAT", "DATE_ADD", "DATE_SUB",
        ]
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "SELECT", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "INSERT", "UPDATE",
            "DELETE", "CREATE", "DROP", "ALTER", "JOIN", "UNION", "DISTINCT", "AUTO_INCREMENT",
            "ENGINE", "CHARSET",
        ]
    }

    fn transform_sql(&self, sql: &str, target: DatabaseType) -> Result<String> {
        match target {
            DatabaseType::MySql => Ok(sql.to_string()),
            DatabaseType::PostgreSql => {
                let mut out = sql.replace('`', "\"");
                out = rewrite_limit_comma_to_offset(&out);
                out = replace_auto_increment(&out, "SERIAL");
                out = rewrite_substring_to_from_for(&out);
                Ok(out)
            }
            DatabaseType::Sqlite => {
                let mut out = sql.replace('`', "");
                out = rewrite_limit_comma_to_offset(&out);
                out = replace_function_call(&out, "NOW", "DATETIME('now')");
                out = replace_current_date(&out, "DATE('now')");
                Ok(out)
            }
        }
    }
}

/// A LIMIT keyword not followed by `count`, `offset, count`, or
/// `count OFFSET offset`.
fn has_malformed_limit(sql: &str) -> bool {
    static LIMIT: OnceLock<Regex> = OnceLock::new();
    static WELL_FORMED: OnceLock<Regex> = OnceLock::new();
    let limit = LIMIT.get_or_init(|| Regex::new(r"(?i)\bLIMIT\b").expect("limit regex compiles"));
    let well_formed = WELL_FORMED.get_or_init(|| {
        Regex::new(r"(?i)\bLIMIT\s+\d+(\s*,\s*\d+|\s+OFFSET\s+\d+)?")
            .expect("limit shape regex compiles")
    });
    limit.find_iter(sql).count() > well_formed.find_iter(sql).count()
}

fn replace_auto_increment(sql: &str, to: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bAUTO_INCREMENT\b").expect("auto_increment regex compiles")
    });
    re.replace_all(sql, to).into_owned()
}

fn replace_current_date(sql: &str, to: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bCURRENT_DATE\b(\s*\(\s*\))?").expect("current_date regex compiles")
    });
    re.replace_all(sql, to).into_owned()
}
