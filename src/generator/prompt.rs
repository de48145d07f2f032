//! Deterministic prompt assembly.
//!
//! The prompt is a stable function of its inputs: schemas iterate in
//! `BTreeMap` order, context lines in caller order, and every section is
//! emitted in a fixed sequence. Two identical calls produce byte-identical
//! prompts, which keeps provider-side prompt caching effective.

use std::fmt::Write;

use super::GenerationOptions;
use crate::dialect::dialect_for;

/// Assemble the provider prompt for a natural-language request.
pub(crate) fn build_prompt(query: &str, options: &GenerationOptions) -> String {
    let dialect = dialect_for(options.database_type);
    let mut out = String::new();

    if let Some(preamble) = options
        .custom_prompts
        .preamble
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        out.push_str(preamble.trim());
        out.push_str("\n\n");
    }

    let _ = writeln!(
        out,
        "Database type: {} ({} dialect)",
        options.database_type,
        dialect.name()
    );

    if !options.schema.is_empty() {
        out.push_str("\nSchema:\n");
        for (table, schema) in &options.schema {
            let _ = writeln!(out, "Table {table}:");
            for column in &schema.columns {
                let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
                match column.comment.as_deref().filter(|c| !c.is_empty()) {
                    Some(comment) => {
                        let _ = writeln!(
                            out,
                            "  - {} {} {} -- {}",
                            column.name, column.data_type, nullability, comment
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "  - {} {} {}",
                            column.name, column.data_type, nullability
                        );
                    }
                }
            }
            if !schema.keys.is_empty() {
                let _ = writeln!(out, "  keys: {}", schema.keys.join(", "));
            }
            if !schema.indexes.is_empty() {
                let _ = writeln!(out, "  indexes: {}", schema.indexes.join(", "));
            }
        }
    }

    if !options.context.is_empty() {
        out.push_str("\nContext:\n");
        for line in &options.context {
            let _ = writeln!(out, "- {line}");
        }
    }

    if options.safety_mode {
        out.push_str(
            "\nSafety requirements:\n\
             - Do not generate DROP, DELETE, or TRUNCATE statements unless explicitly requested.\n\
             - Every UPDATE or DELETE must include a WHERE clause.\n\
             - Use parameter placeholders for user-supplied values.\n",
        );
    }

    let _ = writeln!(out, "\nRequest: {query}");

    out.push_str("\nRespond in exactly this format:\nsql:<your SQL query>");
    if options.include_explanation {
        out.push_str("\nexplanation:<short explanation of the query>");
    }
    out.push('\n');
    out
}
