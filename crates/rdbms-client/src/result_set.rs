//! Buffered result sets.
//!
//! A [`ResultSet`] owns the rows of one statement and hands them out as
//! [`Record`]s. Columns declared with a date or time type are coerced to
//! zoned timestamps in the result's time zone as rows are read; a value that
//! does not parse as a date fails the read.

use std::sync::Arc;

use chrono::FixedOffset;
use rdbms_types::{FromSql, SqlValue, coerce_temporal, utc};

use crate::error::{Error, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared server type, lowercase (e.g. `datetime`, `varchar`).
    pub type_name: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl Column {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into().to_ascii_lowercase(),
            nullable: true,
        }
    }

    /// Set nullability.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Whether values of this column are coerced to zoned timestamps.
    ///
    /// `timestamp` is a row version (binary), not a point in time.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        self.type_name != "timestamp"
            && (self.type_name.contains("date") || self.type_name.contains("time"))
    }
}

/// One row, addressable by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Record {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Value of the named column. Names compare case-sensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.position(name).and_then(|i| self.values.get(i))
    }

    /// Value at a zero-based position.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Convert the named column.
    pub fn get_as<T: FromSql>(&self, name: &str) -> Result<T> {
        let value = self.get(name).ok_or_else(|| {
            Error::statement(format!("no column named '{name}' in result"))
        })?;
        Ok(T::from_sql(value)?)
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Take the values out.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Forward cursor over the rows of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<Vec<SqlValue>>,
    pos: usize,
    seekable: bool,
    timezone: FixedOffset,
    closed: bool,
}

impl ResultSet {
    /// Result set over buffered rows.
    #[must_use]
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
            pos: 0,
            seekable: true,
            timezone: utc(),
            closed: false,
        }
    }

    /// A result without columns or rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Override the zone attached to coerced date values.
    #[must_use]
    pub fn with_timezone(mut self, tz: FixedOffset) -> Self {
        self.timezone = tz;
        self
    }

    /// Allow or forbid [`ResultSet::seek`].
    #[must_use]
    pub fn with_seek(mut self, seekable: bool) -> Self {
        self.seekable = seekable;
        self
    }

    /// Zone attached to coerced date values.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// Column metadata.
    #[must_use]
    pub fn fields(&self) -> &[Column] {
        &self.columns
    }

    /// Total number of rows, read or not.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether [`ResultSet::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next row, or `None` at the end or after close.
    ///
    /// A date column whose value cannot be coerced fails with
    /// [`Error::Type`]; the row is consumed, so the next call moves on.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.closed {
            return Ok(None);
        }
        let Some(raw) = self.rows.get(self.pos).cloned() else {
            return Ok(None);
        };
        self.pos += 1;

        let values = raw
            .into_iter()
            .zip(self.columns.iter())
            .map(|(value, column)| self.coerce(column, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Record::new(Arc::clone(&self.columns), values)))
    }

    /// Named field of the next row.
    ///
    /// Returns `None` at the end and when the column does not exist; the
    /// row is consumed either way.
    pub fn next_field(&mut self, name: &str) -> Result<Option<SqlValue>> {
        Ok(self
            .next_record()?
            .and_then(|record| record.get(name).cloned()))
    }

    /// Move the cursor to a zero-based row.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if !self.seekable || self.closed || offset >= self.rows.len() {
            return Err(Error::SeekFailed(format!("Cannot seek to offset {offset}")));
        }
        self.pos = offset;
        Ok(())
    }

    /// Release the rows. Calling it again is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rows = Vec::new();
            self.pos = 0;
        }
    }

    /// Remaining rows; stops at the first row that fails to coerce.
    pub fn records(&mut self) -> Result<Vec<Record>> {
        self.by_ref().collect()
    }

    fn coerce(&self, column: &Column, value: SqlValue) -> Result<SqlValue> {
        if !column.is_temporal() || value.is_null() {
            return Ok(value);
        }
        coerce_temporal(value, self.timezone).map_err(|e| {
            tracing::debug!(column = %column.name, error = %e, "date coercion failed");
            Error::from(e)
        })
    }
}

impl Iterator for ResultSet {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
