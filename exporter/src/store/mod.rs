//! PostgreSQL persistence layer
//!
//! Schema management, attribute mapping storage, and metric table DDL. All
//! create operations are idempotent (`IF NOT EXISTS` / `ON CONFLICT DO
//! NOTHING`) so concurrent flushes need no external locking.

pub mod attrs;
pub mod schema;
pub mod tables;

/// Quote an identifier for interpolation into DDL, which cannot take bind
/// parameters. Metric names arrive from the wire and become table names.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("cpu_usage"), "\"cpu_usage\"");
    }

    #[test]
    fn test_quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("bad\"name"), "\"bad\"\"name\"");
    }
}
