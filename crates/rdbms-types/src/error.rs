//! Failures while turning column data into [`SqlValue`](crate::SqlValue)s
//! and [`SqlValue`](crate::SqlValue)s into Rust values.
//!
//! Three sources produce them: the row decoder reading raw TDS field bytes,
//! [`FromSql`](crate::FromSql) conversions requested by the caller, and
//! date coercion applied to temporal columns of a result set.

use thiserror::Error;

/// A column value that could not be decoded or converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypeError {
    // Field bytes from the server

    /// The field holds fewer bytes than its server type occupies.
    #[error("field truncated: {needed} bytes declared, {available} present")]
    BufferTooSmall {
        /// Bytes the type occupies.
        needed: usize,
        /// Bytes received.
        available: usize,
    },

    /// No decoder exists for this server type or width.
    #[error("cannot decode {from} into {to}")]
    UnsupportedConversion {
        /// Server type as received.
        from: String,
        /// Value type requested.
        to: &'static str,
    },

    /// Character data is not valid in the column's charset.
    #[error("undecodable character data ({0})")]
    InvalidEncoding(String),

    /// Scale or magnitude of a numeric field is unusable.
    #[error("bad numeric field ({0})")]
    InvalidDecimal(String),

    // Conversions requested by the caller

    /// The column is NULL and the target type has no NULL.
    #[error("column is NULL")]
    UnexpectedNull,

    /// The value has another kind than the target type reads.
    #[error("cannot read {actual} as {expected}")]
    TypeMismatch {
        /// Target Rust type.
        expected: &'static str,
        /// Kind of the stored value.
        actual: String,
    },

    /// The number does not fit the target type.
    #[error("{target_type} cannot hold this value")]
    OutOfRange {
        /// Target Rust type.
        target_type: &'static str,
    },

    // Date coercion

    /// Text or number that is not a date, or a local time the zone skips.
    #[error("not a date/time: {0}")]
    InvalidDateTime(String),

    /// Zone text other than `UTC` or `[+-]HH:MM`, or an offset beyond a day.
    #[error("not a time zone: {0}")]
    InvalidTimeZone(String),
}
