//! Test fixture utilities.

use chrono::{NaiveDate, NaiveDateTime};
use rdbms_client::{Criteria, Dialect};

use crate::mock_server::{MockResponse, MockServerBuilder};
use crate::stream::{MockColumn, ScalarValue};

/// A table with known contents, served by a mock server.
#[derive(Debug, Clone)]
pub struct TestFixture {
    /// Table name.
    pub table: String,
    /// Column definitions.
    pub columns: Vec<MockColumn>,
    /// Rows in column order.
    pub rows: Vec<Vec<ScalarValue>>,
}

impl TestFixture {
    /// Create an empty fixture for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Add a column.
    #[must_use]
    pub fn with_column(mut self, column: MockColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<ScalarValue>) -> Self {
        self.rows.push(row);
        self
    }

    /// `select * from <table>` as rendered for `dialect`.
    #[must_use]
    pub fn select_sql(&self, dialect: Dialect) -> String {
        Criteria::new(self.table.as_str()).to_sql(dialect)
    }

    /// The fixture's rows as a server response.
    #[must_use]
    pub fn response(&self) -> MockResponse {
        MockResponse::rows(self.columns.clone(), self.rows.clone())
    }

    /// Answer the fixture's select statement for `dialect`.
    #[must_use]
    pub fn install(&self, builder: MockServerBuilder, dialect: Dialect) -> MockServerBuilder {
        builder.with_response(self.select_sql(dialect), self.response())
    }
}

/// `news(id, title, created)`: three rows, one with a NULL title.
#[must_use]
pub fn news() -> TestFixture {
    TestFixture::new("news")
        .with_column(MockColumn::int("id").with_nullable(false))
        .with_column(MockColumn::varchar("title", 100))
        .with_column(MockColumn::datetime("created"))
        .with_row(vec![
            ScalarValue::Int(1),
            ScalarValue::from("Release 1.0"),
            ScalarValue::DateTime(timestamp(2024, 1, 15, 10, 30, 0)),
        ])
        .with_row(vec![
            ScalarValue::Int(2),
            ScalarValue::Null,
            ScalarValue::DateTime(timestamp(2024, 2, 29, 23, 59, 59)),
        ])
        .with_row(vec![
            ScalarValue::Int(3),
            ScalarValue::from("Ünïcødé"),
            ScalarValue::Null,
        ])
}

/// A timestamp without sub-second part; invalid components yield the
/// Unix epoch.
#[must_use]
pub fn timestamp(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .unwrap_or_default()
}
