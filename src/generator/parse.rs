//! Constrained response parsing and query-shape inference.
//!
//! Providers are asked for `sql:<query>` with an optional
//! `explanation:<text>` line, but real models drift: some answer the
//! legacy JSON shape, some wrap the query in fenced code blocks, some
//! return bare SQL. Parsing accepts all of them and never fails — an
//! unusable body degrades to a placeholder query plus a warning.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// Placeholder returned when a response contains no SQL at all.
pub(crate) const PLACEHOLDER_SQL: &str = "SELECT 1 as placeholder;";

/// What parsing extracted from a provider response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedResponse {
    pub sql: String,
    pub explanation: Option<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Legacy JSON response shape. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct StructuredResponse {
    #[serde(default)]
    sql: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Parse a provider response body.
pub(crate) fn parse_response(text: &str) -> ParsedResponse {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("sql:") {
        let (sql, explanation) = split_explanation(rest);
        return finish(sql, explanation, Vec::new(), Vec::new());
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(parsed) = serde_json::from_str::<StructuredResponse>(trimmed) {
            return finish(
                &parsed.sql,
                parsed.explanation.as_deref(),
                parsed.warnings,
                parsed.suggestions,
            );
        }
    }

    finish(&strip_fences(trimmed), None, Vec::new(), Vec::new())
}

/// Split `sql:` payload on the first explanation marker — newline form
/// first, inline form as fallback.
fn split_explanation(rest: &str) -> (&str, Option<&str>) {
    if let Some((sql, explanation)) = rest.split_once("\nexplanation:") {
        return (sql, Some(explanation));
    }
    if let Some((sql, explanation)) = rest.split_once(" explanation:") {
        return (sql, Some(explanation));
    }
    (rest, None)
}

fn finish(
    sql: &str,
    explanation: Option<&str>,
    warnings: Vec<String>,
    suggestions: Vec<String>,
) -> ParsedResponse {
    let sql = sql.trim();
    let mut warnings = warnings;
    let sql = if sql.is_empty() {
        warnings.push("model response contained no SQL; returning placeholder".to_string());
        PLACEHOLDER_SQL.to_string()
    } else {
        sql.to_string()
    };
    ParsedResponse {
        sql,
        explanation: explanation
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
        warnings,
        suggestions,
    }
}

/// Drop fenced-code markers around a bare-SQL body.
fn strip_fences(body: &str) -> String {
    let mut out = body.trim();
    if let Some(rest) = out.strip_prefix("```sql") {
        out = rest;
    } else if let Some(rest) = out.strip_prefix("```") {
        out = rest;
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    out.trim().to_string()
}

/// Upper-cased table names referenced by the query: tokens following
/// `FROM`, `JOIN`, `UPDATE`, or `INTO`, with trailing punctuation
/// stripped, deduplicated in first-seen order.
pub(crate) fn tables_involved(sql: &str) -> Vec<String> {
    let upper = sql.to_uppercase();
    let tokens: Vec<&str> = upper.split_whitespace().collect();
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for pair in tokens.windows(2) {
        let [keyword, candidate] = pair else { continue };
        if !matches!(*keyword, "FROM" | "JOIN" | "UPDATE" | "INTO") {
            continue;
        }
        let name = candidate
            .trim_end_matches([',', '(', ';'])
            .trim_start_matches('(');
        // Stripping "(" off "(SELECT" leaves the keyword, not a table.
        if name.is_empty() || name == "SELECT" {
            continue;
        }
        if seen.insert(name.to_string()) {
            tables.push(name.to_string());
        }
    }
    tables
}

/// Count the structural constructs that drive the complexity label:
/// joins, subqueries, grouping, having, unions, CTEs, window functions.
pub(crate) fn complexity_score(sql: &str) -> usize {
    static CONSTRUCTS: OnceLock<Regex> = OnceLock::new();
    let re = CONSTRUCTS.get_or_init(|| {
        Regex::new(r"\bJOIN\b|\(\s*SELECT\b|\bGROUP\s+BY\b|\bHAVING\b|\bUNION\b|\bWITH\b|\bWINDOW\b|\bOVER\b")
            .expect("complexity regex compiles")
    });
    re.find_iter(&sql.to_uppercase()).count()
}
