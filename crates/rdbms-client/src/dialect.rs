//! SQL dialects.
//!
//! Everything that differs between database products when rendering SQL
//! text lives here, so criteria, projections and placeholder substitution
//! take a [`Dialect`] instead of branching on the product themselves.

use std::fmt;

use chrono::NaiveDateTime;
use rdbms_types::SqlValue;

/// A SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    PostgreSql,
    /// SQLite.
    Sqlite,
    /// Sybase Adaptive Server Enterprise (TDS 5.0).
    Sybase,
    /// Microsoft SQL Server (TDS 7.x).
    MsSql,
}

impl Dialect {
    /// Dialect conventionally used for a DSN scheme.
    #[must_use]
    pub fn for_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" | "mysqli" | "mariadb" => Some(Self::MySql),
            "pgsql" | "postgres" | "postgresql" => Some(Self::PostgreSql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "sybase" => Some(Self::Sybase),
            "mssql" | "sqlserver" => Some(Self::MsSql),
            _ => None,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "pgsql",
            Self::Sqlite => "sqlite",
            Self::Sybase => "sybase",
            Self::MsSql => "mssql",
        }
    }

    /// Opening and closing character around aliases.
    #[must_use]
    pub fn quote_pair(self) -> (char, char) {
        match self {
            Self::MySql => ('`', '`'),
            Self::PostgreSql => ('"', '"'),
            Self::Sybase | Self::Sqlite | Self::MsSql => ('\'', '\''),
        }
    }

    /// Quote an alias with [`Dialect::quote_pair`].
    #[must_use]
    pub fn quote_alias(self, alias: &str) -> String {
        let (open, close) = self.quote_pair();
        format!("{open}{alias}{close}")
    }

    /// Quote a table or column name for a `%c` placeholder.
    ///
    /// Sybase ASE 12.5+ accepts brackets regardless of `quoted_identifier`.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSql | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::MsSql | Self::Sybase => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Escape the body of a string literal.
    #[must_use]
    pub fn escape_string(self, text: &str) -> String {
        match self {
            Self::MySql => text.replace('\\', "\\\\").replace('\'', "''"),
            _ => text.replace('\'', "''"),
        }
    }

    /// Render a quoted string literal.
    #[must_use]
    pub fn string_literal(self, text: &str) -> String {
        format!("'{}'", self.escape_string(text))
    }

    /// chrono format of timestamps inside date literals.
    #[must_use]
    pub fn date_format(self) -> &'static str {
        match self {
            Self::Sybase | Self::MsSql => "%Y-%m-%d %I:%M:%S%p",
            _ => "%Y-%m-%d %H:%M:%S",
        }
    }

    /// Render a timestamp literal.
    #[must_use]
    pub fn date_literal(self, value: &NaiveDateTime) -> String {
        format!("'{}'", value.format(self.date_format()))
    }

    /// Render a binary literal.
    #[must_use]
    pub fn binary_literal(self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        match self {
            Self::PostgreSql => format!("'\\x{hex}'"),
            Self::Sqlite | Self::MySql => format!("x'{hex}'"),
            Self::Sybase | Self::MsSql => format!("0x{hex}"),
        }
    }

    /// Render any value as a SQL literal.
    ///
    /// Temporal values become date literals, zoned ones in their local
    /// wall-clock time.
    #[must_use]
    pub fn literal(self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_owned(),
            SqlValue::String(s) | SqlValue::Xml(s) => self.string_literal(s),
            SqlValue::Binary(b) => self.binary_literal(b),
            SqlValue::Time(t) => self.string_literal(&t.format("%H:%M:%S").to_string()),
            #[cfg(feature = "uuid")]
            SqlValue::Uuid(u) => self.string_literal(&u.to_string()),
            other => match other.as_datetime() {
                Some(dt) => self.date_literal(&dt),
                // booleans and numerics render bare
                None => other.to_string(),
            },
        }
    }

    /// Statement returning the last generated identity value.
    ///
    /// PostgreSQL needs the sequence name; `None` means the dialect has no
    /// way to answer.
    #[must_use]
    pub fn identity_query(self, sequence: Option<&str>) -> Option<String> {
        match self {
            Self::MySql => Some("select last_insert_id() as last_id".to_owned()),
            Self::Sqlite => Some("select last_insert_rowid() as last_id".to_owned()),
            Self::Sybase | Self::MsSql => Some("select @@identity as last_id".to_owned()),
            Self::PostgreSql => {
                sequence.map(|seq| format!("select currval({}) as last_id", self.string_literal(seq)))
            }
        }
    }

    /// Statement opening a transaction.
    #[must_use]
    pub fn begin_statement(self, name: Option<&str>) -> String {
        self.transaction_statement("begin", name)
    }

    /// Statement committing a transaction.
    #[must_use]
    pub fn commit_statement(self, name: Option<&str>) -> String {
        self.transaction_statement("commit", name)
    }

    /// Statement rolling a transaction back.
    #[must_use]
    pub fn rollback_statement(self, name: Option<&str>) -> String {
        self.transaction_statement("rollback", name)
    }

    fn transaction_statement(self, verb: &str, name: Option<&str>) -> String {
        match (self, name) {
            (Self::Sybase | Self::MsSql, Some(name)) => format!("{verb} transaction {name}"),
            (Self::Sybase | Self::MsSql, None) | (Self::Sqlite, _) => format!("{verb} transaction"),
            (Self::MySql | Self::PostgreSql, _) => verb.to_owned(),
        }
    }

    /// Whether result sets of this dialect's drivers can be repositioned.
    ///
    /// SQLite steps its statements forward only.
    #[must_use]
    pub fn supports_seek(self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_quote_pairs() {
        assert_eq!(Dialect::MySql.quote_alias("n"), "`n`");
        assert_eq!(Dialect::Sybase.quote_alias("n"), "'n'");
        assert_eq!(Dialect::PostgreSql.quote_alias("n"), "\"n\"");
        assert_eq!(Dialect::Sqlite.quote_alias("n"), "'n'");
        assert_eq!(Dialect::MsSql.quote_alias("n"), "'n'");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(Dialect::Sybase.string_literal("it's"), "'it''s'");
        assert_eq!(Dialect::MySql.string_literal("a\\b'"), "'a\\\\b'''");
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(Dialect::MsSql.quote_identifier("order"), "[order]");
        assert_eq!(Dialect::PostgreSql.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Sybase.quote_identifier("news"), "[news]");
        assert_eq!(
            Dialect::Sybase.quote_identifier("x; drop table t"),
            "[x; drop table t]"
        );
        assert_eq!(Dialect::Sybase.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_date_literals() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap();
        assert_eq!(Dialect::MySql.date_literal(&dt), "'2024-01-15 14:05:09'");
        assert_eq!(Dialect::Sybase.date_literal(&dt), "'2024-01-15 02:05:09PM'");
        assert_eq!(
            Dialect::PostgreSql.literal(&SqlValue::DateTime(dt)),
            "'2024-01-15 14:05:09'"
        );
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Dialect::Sybase.literal(&SqlValue::Null), "NULL");
        assert_eq!(Dialect::Sybase.literal(&SqlValue::Int(-3)), "-3");
        assert_eq!(Dialect::Sybase.literal(&SqlValue::Bool(true)), "1");
        assert_eq!(
            Dialect::MsSql.literal(&SqlValue::from(vec![0xCA, 0xFE])),
            "0xcafe"
        );
    }

    #[test]
    fn test_identity_and_transactions() {
        assert_eq!(Dialect::PostgreSql.identity_query(None), None);
        assert_eq!(
            Dialect::PostgreSql.identity_query(Some("news_id_seq")).unwrap(),
            "select currval('news_id_seq') as last_id"
        );
        assert_eq!(
            Dialect::Sybase.begin_statement(Some("tx1")),
            "begin transaction tx1"
        );
        assert_eq!(Dialect::MySql.rollback_statement(Some("tx1")), "rollback");
    }

    #[test]
    fn test_for_scheme() {
        assert_eq!(Dialect::for_scheme("Sybase"), Some(Dialect::Sybase));
        assert_eq!(Dialect::for_scheme("pgsql"), Some(Dialect::PostgreSql));
        assert_eq!(Dialect::for_scheme("invalid"), None);
    }
}
