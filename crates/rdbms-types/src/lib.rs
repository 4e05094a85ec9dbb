//! # rdbms-types
//!
//! Typed SQL values for Sybase and SQL Server result rows.
//!
//! Row fields arrive from the tokenizer as raw bytes tagged with the column's
//! [`TypeInfo`]; [`decode_value`] turns them into [`SqlValue`]s, and
//! [`coerce_temporal`] folds date/time columns into a caller-chosen zone.
//!
//! ## Features
//!
//! - `uuid` (default): decode `UNIQUEIDENTIFIER` to `uuid::Uuid`
//! - `decimal` (default): decode exact numerics and money to
//!   `rust_decimal::Decimal` (otherwise `f64`)
//!
//! ## Type Mappings
//!
//! | Server Type | `SqlValue` | Rust Type |
//! |-------------|------------|-----------|
//! | `BIT` | `Bool` | `bool` |
//! | `TINYINT` | `TinyInt` | `u8` |
//! | `SMALLINT` | `SmallInt` | `i16` |
//! | `INT`, Sybase `USMALLINT` | `Int` | `i32` |
//! | `BIGINT`, Sybase `UINT`/`UBIGINT` | `BigInt` | `i64` |
//! | `REAL` / `FLOAT` | `Float` / `Double` | `f32` / `f64` |
//! | `DECIMAL`/`NUMERIC`/`MONEY` | `Decimal` | `rust_decimal::Decimal` |
//! | `CHAR`/`VARCHAR`/`TEXT` | `String` | `String` |
//! | `NCHAR`/`NVARCHAR`/`NTEXT` | `String` | `String` |
//! | `DATE` | `Date` | `chrono::NaiveDate` |
//! | `TIME` | `Time` | `chrono::NaiveTime` |
//! | `DATETIME`/`SMALLDATETIME`/`DATETIME2` | `DateTime` | `chrono::NaiveDateTime` |
//! | `DATETIMEOFFSET` | `DateTimeOffset` | `chrono::DateTime<FixedOffset>` |
//! | `UNIQUEIDENTIFIER` | `Uuid` | `uuid::Uuid` |
//! | `BINARY`/`VARBINARY`/`IMAGE` | `Binary` | `bytes::Bytes` |
//!
//! ## Example
//!
//! ```rust
//! use rdbms_types::{FromSql, SqlValue, coerce_temporal, parse_timezone};
//!
//! let tz = parse_timezone("+02:00").unwrap();
//! let value = coerce_temporal(SqlValue::from("Jan 15 2024 10:30AM"), tz).unwrap();
//! let local = chrono::NaiveDateTime::from_sql(&value).unwrap();
//! assert_eq!(local.to_string(), "2024-01-15 10:30:00");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod coerce;
pub mod decode;
pub mod error;
pub mod from_sql;
pub mod value;

pub use coerce::{coerce_temporal, parse_datetime_text, parse_timezone, utc};
pub use decode::{decode_utf16_string, decode_value};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use value::SqlValue;

pub use tds_protocol::{Charset, TypeClass, TypeInfo};
