//! Date coercion for result columns.
//!
//! Servers hand back temporal columns either as binary TDS values or, for
//! text protocols and `convert(varchar, ...)` results, as strings such as
//! `2024-01-15 10:30:00.123` or `Jan 15 2024 10:30AM`. Both are folded into
//! a [`SqlValue::DateTimeOffset`] in the result's time zone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};

use crate::error::TypeError;
use crate::value::SqlValue;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%b %d %Y %I:%M:%S%.f%p",
    "%b %d %Y %I:%M:%S%p",
    "%b %d %Y %I:%M%p",
];

/// Parse a server's textual timestamp.
///
/// Accepts ISO style (`YYYY-MM-DD HH:MM:SS[.fff]`, a bare date) and the
/// Sybase/SQL Server default style (`Mon DD YYYY HH:MM[AM|PM]`). Runs of
/// whitespace are collapsed first, since the default style pads single-digit
/// days and hours with a space.
pub fn parse_datetime_text(text: &str) -> Result<NaiveDateTime, TypeError> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| TypeError::InvalidDateTime(text.to_owned()))
}

/// Parse a time zone designator: `UTC`, `Z`, `+HH:MM`, `-HH:MM` or `+HHMM`.
pub fn parse_timezone(text: &str) -> Result<FixedOffset, TypeError> {
    let invalid = || TypeError::InvalidTimeZone(text.to_owned());
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") || trimmed == "Z"
    {
        return Ok(utc());
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// The UTC offset.
#[must_use]
pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// Coerce a value of a date/time-declared column into the given zone.
///
/// Strings are parsed, dates become midnight, naive timestamps are read as
/// wall-clock time in `tz`. Values that already carry an offset, bare
/// times and NULL pass through unchanged.
pub fn coerce_temporal(value: SqlValue, tz: FixedOffset) -> Result<SqlValue, TypeError> {
    let local = match value {
        SqlValue::String(ref text) => parse_datetime_text(text)?,
        SqlValue::DateTime(dt) => dt,
        SqlValue::Date(d) => d.and_time(NaiveTime::MIN),
        SqlValue::Null | SqlValue::DateTimeOffset(_) | SqlValue::Time(_) => return Ok(value),
        other => {
            return Err(TypeError::TypeMismatch {
                expected: "date/time",
                actual: other.type_name().to_owned(),
            });
        }
    };
    attach(local, tz).map(SqlValue::DateTimeOffset)
}

fn attach(local: NaiveDateTime, tz: FixedOffset) -> Result<DateTime<FixedOffset>, TypeError> {
    tz.from_local_datetime(&local)
        .single()
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{local} in {tz}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_iso_text() {
        assert_eq!(
            parse_datetime_text("2024-01-15 10:30:00").unwrap(),
            ymd_hms(2024, 1, 15, 10, 30, 0)
        );
        let with_millis = parse_datetime_text("2024-01-15 10:30:00.250").unwrap();
        assert_eq!(with_millis.and_utc().timestamp_subsec_millis(), 250);
        assert_eq!(
            parse_datetime_text("2024-01-15").unwrap(),
            ymd_hms(2024, 1, 15, 0, 0, 0)
        );
    }

    #[test]
    fn test_default_server_style() {
        assert_eq!(
            parse_datetime_text("Jan 15 2024 10:30AM").unwrap(),
            ymd_hms(2024, 1, 15, 10, 30, 0)
        );
        assert_eq!(
            parse_datetime_text("Mar  5 2023  2:07PM").unwrap(),
            ymd_hms(2023, 3, 5, 14, 7, 0)
        );
        assert!(parse_datetime_text("not a date").is_err());
    }

    #[test]
    fn test_timezones() {
        assert_eq!(parse_timezone("UTC").unwrap(), utc());
        assert_eq!(parse_timezone("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_timezone("-0530").unwrap().local_minus_utc(), -19800);
        assert!(parse_timezone("Europe/Berlin").is_err());
        assert!(parse_timezone("+25:00").is_err());
        assert!(parse_timezone("+01:75").is_err());
    }

    #[test]
    fn test_coerce_attaches_zone() {
        let tz = parse_timezone("+01:00").unwrap();
        let value = coerce_temporal(SqlValue::from("2024-06-01 12:00:00"), tz).unwrap();
        let dto = value.as_datetime_offset().unwrap();
        assert_eq!(dto.naive_local(), ymd_hms(2024, 6, 1, 12, 0, 0));
        assert_eq!(dto.naive_utc(), ymd_hms(2024, 6, 1, 11, 0, 0));
    }

    #[test]
    fn test_coerce_passthrough() {
        assert!(coerce_temporal(SqlValue::Null, utc()).unwrap().is_null());
        let time = SqlValue::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap());
        assert_eq!(coerce_temporal(time.clone(), utc()).unwrap(), time);
        assert!(matches!(
            coerce_temporal(SqlValue::Int(1), utc()),
            Err(TypeError::TypeMismatch { .. })
        ));
    }
}
