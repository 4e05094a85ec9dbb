//! Decoding of raw row fields into [`SqlValue`]s.
//!
//! The tokenizer hands over each field as undecoded bytes (or `None` for
//! NULL); the column's [`TypeInfo`] says how to read them. Integers,
//! floats and money are little-endian in both protocol families. Exact
//! numerics differ: Sybase sends a sign byte (0 = positive) and a
//! big-endian magnitude, SQL Server a sign byte (1 = positive) and a
//! little-endian magnitude.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
};
use tds_protocol::codec::Charset;
use tds_protocol::types::{NumericFormat, TypeClass, TypeInfo};

use crate::error::TypeError;
use crate::value::SqlValue;

/// Decode one field of a row.
///
/// `charset` is the connection's client character set; SQL Server
/// character columns with a collation use the collation's code page.
pub fn decode_value(
    info: &TypeInfo,
    raw: Option<&[u8]>,
    charset: Charset,
) -> Result<SqlValue, TypeError> {
    let Some(raw) = raw else {
        return Ok(SqlValue::Null);
    };

    match info.class {
        TypeClass::Null => Ok(SqlValue::Null),
        TypeClass::Bit => Ok(SqlValue::Bool(fixed::<1>(raw)?[0] != 0)),
        TypeClass::Int => decode_int(raw),
        TypeClass::UInt => decode_uint(raw),
        TypeClass::Float => match raw.len() {
            4 => Ok(SqlValue::Float(f32::from_le_bytes(fixed::<4>(raw)?))),
            8 => Ok(SqlValue::Double(f64::from_le_bytes(fixed::<8>(raw)?))),
            n => Err(bad_width("float", n)),
        },
        TypeClass::Money => decode_money(raw),
        TypeClass::DateTime => match raw.len() {
            8 => decode_datetime(raw).map(SqlValue::DateTime),
            4 => decode_smalldatetime(raw).map(SqlValue::DateTime),
            n => Err(bad_width("datetime", n)),
        },
        TypeClass::Date => match raw.len() {
            // TDS 5.0: days since 1900-01-01
            4 => {
                let days = i32::from_le_bytes(fixed::<4>(raw)?);
                Ok(SqlValue::Date(add_days(sybase_epoch()?, i64::from(days))?))
            }
            // TDS 7.3: days since 0001-01-01
            3 => Ok(SqlValue::Date(decode_date3(raw)?)),
            n => Err(bad_width("date", n)),
        },
        TypeClass::Time => {
            let ticks = u32::from_le_bytes(fixed::<4>(raw)?);
            Ok(SqlValue::Time(time_from_ticks(ticks)?))
        }
        TypeClass::TimeN => {
            let scale = info.scale.unwrap_or(7);
            Ok(SqlValue::Time(decode_time_scaled(raw, scale)?))
        }
        TypeClass::DateTime2 => {
            let scale = info.scale.unwrap_or(7);
            let split = time_bytes_for_scale(scale);
            let time = decode_time_scaled(prefix(raw, split)?, scale)?;
            let date = decode_date3(prefix(&raw[split..], 3)?)?;
            Ok(SqlValue::DateTime(date.and_time(time)))
        }
        TypeClass::DateTimeOffset => decode_datetimeoffset(raw, info.scale.unwrap_or(7))
            .map(SqlValue::DateTimeOffset),
        TypeClass::Decimal(format) => decode_decimal(raw, format, info.scale.unwrap_or(0)),
        TypeClass::Char => {
            let charset = info.collation.map_or(charset, |c| c.charset());
            Ok(SqlValue::String(charset.decode(raw).into_owned()))
        }
        TypeClass::NChar => Ok(SqlValue::String(decode_utf16_string(raw)?)),
        TypeClass::Xml => Ok(SqlValue::Xml(decode_utf16_string(raw)?)),
        TypeClass::Binary | TypeClass::Variant => {
            Ok(SqlValue::Binary(bytes::Bytes::copy_from_slice(raw)))
        }
        TypeClass::Guid => decode_guid(raw),
    }
}

/// Decode UTF-16LE text.
pub fn decode_utf16_string(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(format!(
            "odd UTF-16 byte length: {}",
            data.len()
        )));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

fn fixed<const N: usize>(raw: &[u8]) -> Result<[u8; N], TypeError> {
    prefix(raw, N)?
        .try_into()
        .map_err(|_| TypeError::BufferTooSmall {
            needed: N,
            available: raw.len(),
        })
}

fn prefix(raw: &[u8], n: usize) -> Result<&[u8], TypeError> {
    raw.get(..n).ok_or(TypeError::BufferTooSmall {
        needed: n,
        available: raw.len(),
    })
}

fn bad_width(kind: &str, len: usize) -> TypeError {
    TypeError::UnsupportedConversion {
        from: format!("{kind} of {len} bytes"),
        to: "SqlValue",
    }
}

fn le_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn decode_int(raw: &[u8]) -> Result<SqlValue, TypeError> {
    match raw.len() {
        // a one-byte INTN is TINYINT, which is unsigned
        1 => Ok(SqlValue::TinyInt(raw[0])),
        2 => Ok(SqlValue::SmallInt(i16::from_le_bytes(fixed::<2>(raw)?))),
        4 => Ok(SqlValue::Int(i32::from_le_bytes(fixed::<4>(raw)?))),
        8 => Ok(SqlValue::BigInt(i64::from_le_bytes(fixed::<8>(raw)?))),
        n => Err(bad_width("integer", n)),
    }
}

fn decode_uint(raw: &[u8]) -> Result<SqlValue, TypeError> {
    match raw.len() {
        1 => Ok(SqlValue::TinyInt(raw[0])),
        2 => Ok(SqlValue::Int(i32::from(u16::from_le_bytes(fixed::<2>(raw)?)))),
        4 => Ok(SqlValue::BigInt(i64::from(u32::from_le_bytes(fixed::<4>(raw)?)))),
        8 => i64::try_from(u64::from_le_bytes(fixed::<8>(raw)?))
            .map(SqlValue::BigInt)
            .map_err(|_| TypeError::OutOfRange {
                target_type: "i64",
            }),
        n => Err(bad_width("unsigned integer", n)),
    }
}

fn decode_money(raw: &[u8]) -> Result<SqlValue, TypeError> {
    let units = match raw.len() {
        4 => i64::from(i32::from_le_bytes(fixed::<4>(raw)?)),
        8 => {
            let high = i32::from_le_bytes(fixed::<4>(raw)?);
            let low = u32::from_le_bytes(fixed::<4>(&raw[4..])?);
            (i64::from(high) << 32) | i64::from(low)
        }
        n => return Err(bad_width("money", n)),
    };

    #[cfg(feature = "decimal")]
    {
        Ok(SqlValue::Decimal(rust_decimal::Decimal::new(units, 4)))
    }
    #[cfg(not(feature = "decimal"))]
    {
        Ok(SqlValue::Double(units as f64 / 10_000.0))
    }
}

fn decode_decimal(raw: &[u8], format: NumericFormat, scale: u8) -> Result<SqlValue, TypeError> {
    let (&sign, magnitude) = raw
        .split_first()
        .ok_or(TypeError::BufferTooSmall {
            needed: 1,
            available: 0,
        })?;
    if magnitude.len() > 16 {
        return Err(TypeError::InvalidDecimal(format!(
            "{} magnitude bytes",
            magnitude.len()
        )));
    }

    let mut buf = [0u8; 16];
    let (mantissa, negative) = match format {
        NumericFormat::SignFirstBigEndian => {
            buf[16 - magnitude.len()..].copy_from_slice(magnitude);
            (u128::from_be_bytes(buf), sign != 0)
        }
        NumericFormat::SignFirstLittleEndian => {
            buf[..magnitude.len()].copy_from_slice(magnitude);
            (u128::from_le_bytes(buf), sign == 0)
        }
    };

    #[cfg(feature = "decimal")]
    {
        let signed = i128::try_from(mantissa)
            .map_err(|e| TypeError::InvalidDecimal(e.to_string()))?;
        let signed = if negative { -signed } else { signed };
        rust_decimal::Decimal::try_from_i128_with_scale(signed, u32::from(scale))
            .map(SqlValue::Decimal)
            .map_err(|e| TypeError::InvalidDecimal(e.to_string()))
    }
    #[cfg(not(feature = "decimal"))]
    {
        let value = mantissa as f64 / 10f64.powi(i32::from(scale));
        Ok(SqlValue::Double(if negative { -value } else { value }))
    }
}

fn decode_guid(raw: &[u8]) -> Result<SqlValue, TypeError> {
    let bytes = fixed::<16>(raw)?;

    #[cfg(feature = "uuid")]
    {
        // first three groups are little-endian on the wire
        let mut ordered = bytes;
        ordered[..4].reverse();
        ordered[4..6].reverse();
        ordered[6..8].reverse();
        Ok(SqlValue::Uuid(uuid::Uuid::from_bytes(ordered)))
    }
    #[cfg(not(feature = "uuid"))]
    {
        Ok(SqlValue::Binary(bytes::Bytes::copy_from_slice(&bytes)))
    }
}

// =============================================================================
// Temporal types
// =============================================================================

fn sybase_epoch() -> Result<NaiveDate, TypeError> {
    NaiveDate::from_ymd_opt(1900, 1, 1).ok_or_else(|| invalid_date("epoch 1900-01-01"))
}

fn common_era() -> Result<NaiveDate, TypeError> {
    NaiveDate::from_ymd_opt(1, 1, 1).ok_or_else(|| invalid_date("epoch 0001-01-01"))
}

fn invalid_date(what: impl Into<String>) -> TypeError {
    TypeError::InvalidDateTime(what.into())
}

fn add_days(base: NaiveDate, days: i64) -> Result<NaiveDate, TypeError> {
    TimeDelta::try_days(days)
        .and_then(|delta| base.checked_add_signed(delta))
        .ok_or_else(|| invalid_date(format!("{days} days from {base}")))
}

/// Time of day from 1/300 second ticks, rounded to milliseconds.
fn time_from_ticks(ticks: u32) -> Result<NaiveTime, TypeError> {
    let millis = (u64::from(ticks) * 10 + 1) / 3;
    let secs = (millis / 1000) as u32;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| invalid_date(format!("{ticks} ticks past midnight")))
}

fn decode_datetime(raw: &[u8]) -> Result<NaiveDateTime, TypeError> {
    let days = i32::from_le_bytes(fixed::<4>(raw)?);
    let ticks = u32::from_le_bytes(fixed::<4>(&raw[4..])?);
    let date = add_days(sybase_epoch()?, i64::from(days))?;
    Ok(date.and_time(time_from_ticks(ticks)?))
}

fn decode_smalldatetime(raw: &[u8]) -> Result<NaiveDateTime, TypeError> {
    let days = u16::from_le_bytes(fixed::<2>(raw)?);
    let minutes = u16::from_le_bytes(fixed::<2>(&raw[2..])?);
    let date = add_days(sybase_epoch()?, i64::from(days))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
        .ok_or_else(|| invalid_date(format!("{minutes} minutes past midnight")))?;
    Ok(date.and_time(time))
}

fn decode_date3(raw: &[u8]) -> Result<NaiveDate, TypeError> {
    let days = le_uint(prefix(raw, 3)?);
    add_days(common_era()?, days as i64)
}

fn time_bytes_for_scale(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

fn decode_time_scaled(raw: &[u8], scale: u8) -> Result<NaiveTime, TypeError> {
    let len = time_bytes_for_scale(scale);
    let intervals = le_uint(prefix(raw, len)?);
    let nanos = intervals * 10u64.pow(9 - u32::from(scale.min(7)));
    let secs = (nanos / 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, (nanos % 1_000_000_000) as u32)
        .ok_or_else(|| invalid_date(format!("{intervals} intervals at scale {scale}")))
}

fn decode_datetimeoffset(raw: &[u8], scale: u8) -> Result<DateTime<FixedOffset>, TypeError> {
    let split = time_bytes_for_scale(scale);
    let time = decode_time_scaled(prefix(raw, split)?, scale)?;
    let date = decode_date3(prefix(&raw[split..], 3)?)?;
    let minutes = i16::from_le_bytes(fixed::<2>(&raw[split + 3..])?);
    let offset = FixedOffset::east_opt(i32::from(minutes) * 60)
        .ok_or_else(|| TypeError::InvalidTimeZone(format!("{minutes} minutes")))?;
    // the wire value is UTC
    Ok(offset.from_utc_datetime(&date.and_time(time)))
}
