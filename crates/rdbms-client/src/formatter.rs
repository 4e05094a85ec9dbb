//! Placeholder substitution for statement templates.
//!
//! | Token | Renders |
//! |-------|---------|
//! | `%s`  | quoted string literal; temporal values as date literals |
//! | `%d`  | integer literal |
//! | `%f`  | float literal |
//! | `%c`  | quoted identifier |
//! | `%u`  | date literal |
//! | `%l`  | the value verbatim |
//! | `%%`  | a literal `%` |
//!
//! `%N$x` takes the N-th argument (1-based) without advancing the
//! sequential position. Text inside single or double quotes is copied
//! unchanged, so `'%s'` in a template stays literal.

use once_cell::sync::Lazy;
use regex::Regex;

use rdbms_types::{SqlValue, parse_datetime_text};

use crate::dialect::Dialect;
use crate::error::{Error, Result};

#[allow(clippy::expect_used)]
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|%(?:(\d+)\$)?([cdfsul%])"#)
        .expect("placeholder pattern is valid")
});

/// A statement argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A single value.
    Value(SqlValue),
    /// Values rendered as a comma-separated list, e.g. for `in (%d)`.
    List(Vec<SqlValue>),
}

impl Param {
    /// Build a list argument.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// The null argument.
    #[must_use]
    pub fn null() -> Self {
        Self::Value(SqlValue::Null)
    }
}

macro_rules! param_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Self::Value(SqlValue::from(v))
                }
            }
        )*
    };
}

param_from! {
    bool, u8, i16, i32, i64, f32, f64, String, &str, Vec<u8>,
    chrono::NaiveDate, chrono::NaiveTime, chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
}

impl From<SqlValue> for Param {
    fn from(v: SqlValue) -> Self {
        Self::Value(v)
    }
}

impl From<Vec<SqlValue>> for Param {
    fn from(v: Vec<SqlValue>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(Self::null, Into::into)
    }
}

/// Shorthand for building a `&[Param]` slice.
///
/// ```
/// use rdbms_client::params;
/// let args = params![1, "news", None::<i32>];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Param>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::Param::from($arg)),+] };
}

/// Renders statement templates for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct StatementFormatter {
    dialect: Dialect,
}

impl StatementFormatter {
    /// Formatter for `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The dialect literals are rendered in.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Substitute `args` into `template`.
    pub fn format(&self, template: &str, args: &[Param]) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        let mut next_arg = 0;

        for caps in TOKEN_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&template[last..whole.start()]);
            last = whole.end();

            let Some(spec) = caps.get(2) else {
                // quoted section
                out.push_str(whole.as_str());
                continue;
            };
            let spec = spec.as_str().chars().next().unwrap_or('%');
            if spec == '%' {
                out.push('%');
                continue;
            }

            let index = match caps.get(1) {
                Some(n) => match n.as_str().parse::<usize>() {
                    Ok(n) if n > 0 => n - 1,
                    _ => {
                        let reason = format!("invalid position in '{}'", whole.as_str());
                        return Err(failure(reason, template));
                    }
                },
                None => {
                    next_arg += 1;
                    next_arg - 1
                }
            };
            let arg = args.get(index).ok_or_else(|| {
                failure(format!("missing argument #{} for %{spec}", index + 1), template)
            })?;

            let rendered = match arg {
                Param::Value(value) => self.render(spec, value),
                Param::List(values) => values
                    .iter()
                    .map(|v| self.render(spec, v))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(|parts| parts.join(", ")),
            };
            out.push_str(&rendered.map_err(|reason| failure(reason, template))?);
        }

        out.push_str(&template[last..]);
        Ok(out)
    }

    fn render(&self, spec: char, value: &SqlValue) -> std::result::Result<String, String> {
        if value.is_null() {
            return Ok("NULL".to_owned());
        }
        let dialect = self.dialect;
        match spec {
            's' => Ok(match value {
                SqlValue::Binary(b) => dialect.binary_literal(b),
                v if v.is_temporal() && !matches!(v, SqlValue::Time(_)) => dialect.literal(v),
                v => dialect.string_literal(&v.to_string()),
            }),
            'd' => integer(value).map(|n| n.to_string()),
            'f' => float(value).map(|n| n.to_string()),
            'c' => match value {
                SqlValue::String(name) => Ok(dialect.quote_identifier(name)),
                other => Err(format!("%c expects a name, got {}", other.type_name())),
            },
            'u' => match value {
                SqlValue::String(text) => parse_datetime_text(text)
                    .map(|dt| dialect.date_literal(&dt))
                    .map_err(|e| e.to_string()),
                v => v
                    .as_datetime()
                    .map(|dt| dialect.date_literal(&dt))
                    .ok_or_else(|| format!("%u expects a date, got {}", v.type_name())),
            },
            'l' => Ok(value.to_string()),
            other => Err(format!("unknown placeholder %{other}")),
        }
    }
}

fn integer(value: &SqlValue) -> std::result::Result<i64, String> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value {
        SqlValue::Bool(b) => Ok(i64::from(*b)),
        #[allow(clippy::cast_possible_truncation)]
        SqlValue::Float(_) | SqlValue::Double(_) => {
            Ok(value.as_f64().unwrap_or_default().trunc() as i64)
        }
        SqlValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("%d expects a number, got {}", other.type_name())),
    }
}

fn float(value: &SqlValue) -> std::result::Result<f64, String> {
    if let Some(n) = value.as_f64() {
        return Ok(n);
    }
    match value {
        SqlValue::Bool(b) => Ok(f64::from(u8::from(*b))),
        SqlValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("%f expects a number, got {}", other.type_name())),
    }
}

fn failure(message: String, template: &str) -> Error {
    Error::StatementFailed {
        message,
        code: None,
        sql: Some(template.to_owned()),
    }
}
