//! Tracing spans for statement execution.
//!
//! Connections opened with the `log=1` DSN flag run each statement inside
//! an `rdbms.query` span carrying:
//!
//! - `sql`: statement text, truncated to [`MAX_LOGGED_SQL`] bytes
//! - `dialect`: dialect name
//! - `operation`: leading keyword (`select`, `insert`, ...)
//!
//! Without the flag, statements only emit `trace!` events.

use tracing::Span;

use crate::dialect::Dialect;

/// Span names.
pub mod span_names {
    /// Connection establishment.
    pub const CONNECT: &str = "rdbms.connect";
    /// Statement execution.
    pub const QUERY: &str = "rdbms.query";
}

/// Longest statement prefix recorded in a span.
pub const MAX_LOGGED_SQL: usize = 2048;

/// Leading keyword of a statement, lowercase.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match first.as_str() {
        "select" => "select",
        "insert" => "insert",
        "update" => "update",
        "delete" => "delete",
        "exec" | "execute" => "execute",
        "begin" => "begin",
        "commit" => "commit",
        "rollback" => "rollback",
        "create" | "alter" | "drop" => "ddl",
        _ => "other",
    }
}

/// Span for one statement; disabled unless `enabled`.
#[must_use]
pub fn query_span(sql: &str, dialect: Dialect, enabled: bool) -> Span {
    if !enabled {
        return Span::none();
    }
    tracing::debug_span!(
        "rdbms.query",
        sql = %truncate(sql, MAX_LOGGED_SQL),
        dialect = %dialect,
        operation = extract_operation(sql),
    )
}

/// Span for opening a connection.
#[must_use]
pub fn connect_span(scheme: &str, host: &str) -> Span {
    tracing::info_span!("rdbms.connect", scheme = %scheme, host = %host)
}

/// Cut `s` to at most `max_len` bytes on a character boundary.
fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM news"), "select");
        assert_eq!(extract_operation("  insert into t values (1)"), "insert");
        assert_eq!(extract_operation("begin transaction tx"), "begin");
        assert_eq!(extract_operation("EXEC sp_who"), "execute");
        assert_eq!(extract_operation("drop table t"), "ddl");
        assert_eq!(extract_operation(""), "other");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        // 'é' is two bytes
        assert_eq!(truncate("héllo", 2), "h");
    }

    #[test]
    fn test_disabled_span() {
        assert!(query_span("select 1", Dialect::Sybase, false).is_none());
    }
}
