//! Connections and the driver seam.
//!
//! A [`Connection`] is the dialect-independent handle callers use. It owns
//! a [`Driver`], which does the product-specific work of opening a session
//! and running SQL text, and adds placeholder formatting, observer events,
//! date coercion and the single-statement busy guard on top.

use std::fmt;
use std::sync::Arc;

use rdbms_types::SqlValue;

use crate::config::ConnectionOptions;
use crate::dialect::Dialect;
use crate::dsn::Dsn;
use crate::error::{Error, Result};
use crate::formatter::{Param, StatementFormatter};
use crate::instrumentation;
use crate::observer::{Event, Observer, Observers, Outcome};
use crate::result_set::{Column, Record, ResultSet};
use crate::state::ProtocolState;

// =============================================================================
// Driver seam
// =============================================================================

/// What a driver returns for one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverResponse {
    /// The statement produced rows.
    Rows {
        /// Column metadata.
        columns: Vec<Column>,
        /// Values in column order.
        rows: Vec<Vec<SqlValue>>,
    },
    /// The statement modified this many rows.
    Affected(u64),
}

/// Product-specific session handling.
pub trait Driver: Send + fmt::Debug {
    /// SQL dialect of the server.
    fn dialect(&self) -> Dialect;

    /// Open the session.
    fn connect(&mut self, dsn: &Dsn, options: &ConnectionOptions) -> Result<()>;

    /// Run SQL text, advancing `state` through the response.
    fn execute(&mut self, sql: &str, state: &mut ProtocolState) -> Result<DriverResponse>;

    /// Release the session. Must tolerate repeated calls.
    fn close(&mut self) -> Result<()>;

    /// Whether a session is open.
    fn is_connected(&self) -> bool;

    /// Whether result sets can be repositioned.
    fn supports_seek(&self) -> bool {
        self.dialect().supports_seek()
    }
}

// =============================================================================
// Query results
// =============================================================================

/// Result of [`Connection::query`].
#[derive(Debug, Clone)]
pub enum QueryResult {
    /// Rows.
    Rows(ResultSet),
    /// Affected row count.
    Affected(u64),
}

impl QueryResult {
    /// The result set, if rows were produced.
    #[must_use]
    pub fn into_result_set(self) -> Option<ResultSet> {
        match self {
            Self::Rows(rs) => Some(rs),
            Self::Affected(_) => None,
        }
    }

    /// Affected row count; zero for row results.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        match self {
            Self::Rows(_) => 0,
            Self::Affected(n) => *n,
        }
    }

    fn outcome(&self) -> Outcome {
        match self {
            Self::Rows(rs) => Outcome::Rows(rs.clone()),
            Self::Affected(n) => Outcome::Affected(*n),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A database connection.
#[derive(Debug)]
pub struct Connection {
    dsn: Dsn,
    options: ConnectionOptions,
    driver: Box<dyn Driver>,
    formatter: StatementFormatter,
    observers: Observers,
    state: ProtocolState,
    connected: bool,
}

impl Connection {
    /// Wrap `driver` for `dsn`; options come from the DSN flags.
    pub fn new(dsn: Dsn, driver: Box<dyn Driver>) -> Result<Self> {
        let options = ConnectionOptions::from_dsn(&dsn)?;
        Ok(Self::with_options(dsn, driver, options))
    }

    /// Wrap `driver` with explicit options.
    pub fn with_options(dsn: Dsn, driver: Box<dyn Driver>, options: ConnectionOptions) -> Self {
        let formatter = StatementFormatter::new(driver.dialect());
        Self {
            dsn,
            options,
            driver,
            formatter,
            observers: Observers::default(),
            state: ProtocolState::default(),
            connected: false,
        }
    }

    /// The DSN this connection was created from.
    #[must_use]
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// SQL dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// Effective options.
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Statement state.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected && self.driver.is_connected()
    }

    /// The placeholder formatter for this connection's dialect.
    #[must_use]
    pub fn formatter(&self) -> &StatementFormatter {
        &self.formatter
    }

    /// Open the connection. Does nothing when already open.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let span = instrumentation::connect_span(self.dsn.scheme(), self.dsn.host());
        let _guard = span.enter();

        let public = self.dsn.without_password();
        self.driver
            .connect(&self.dsn, &self.options)
            .map_err(|e| Error::ConnectFailed {
                dsn: public.to_string(),
                source: Box::new(e),
            })?;

        self.connected = true;
        self.state = ProtocolState::Idle;
        tracing::info!(scheme = %self.dsn.scheme(), host = %self.dsn.host(), "connected");
        self.observers.notify(&Event::Connect(public));
        Ok(())
    }

    /// Close the connection. Does nothing when already closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let result = self.driver.close();
        tracing::info!(host = %self.dsn.host(), "connection closed");
        self.observers.notify(&Event::Close);
        result
    }

    /// Attach an observer. Returns `false` if it was already attached.
    pub fn add_observer(&mut self, observer: Arc<dyn Observer>) -> bool {
        self.observers.add(observer)
    }

    /// Detach an observer. Returns `false` if it was not attached.
    pub fn remove_observer(&mut self, observer: &Arc<dyn Observer>) -> bool {
        self.observers.remove(observer)
    }

    /// Format `sql` with `params` and run it.
    pub fn query(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult> {
        self.ensure_ready()?;
        let sql = self.formatter.format(sql, params)?;
        self.run(&sql)
    }

    /// Run a select and collect all rows.
    pub fn select(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Record>> {
        Ok(match self.query(sql, params)? {
            QueryResult::Rows(mut rs) => rs.records()?,
            QueryResult::Affected(_) => Vec::new(),
        })
    }

    /// Run an insert; returns the affected count.
    pub fn insert(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        Ok(self.query(sql, params)?.affected_rows())
    }

    /// Run an update; returns the affected count.
    pub fn update(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        Ok(self.query(sql, params)?.affected_rows())
    }

    /// Run a delete; returns the affected count.
    pub fn delete(&mut self, sql: &str, params: &[Param]) -> Result<u64> {
        Ok(self.query(sql, params)?.affected_rows())
    }

    /// Last generated identity value.
    ///
    /// PostgreSQL needs the sequence name.
    pub fn identity(&mut self, sequence: Option<&str>) -> Result<i64> {
        let sql = self.dialect().identity_query(sequence).ok_or_else(|| {
            Error::statement(format!(
                "{} cannot report identity values without a sequence",
                self.dialect()
            ))
        })?;
        self.ensure_ready()?;

        let rows = match self.run(&sql)? {
            QueryResult::Rows(mut rs) => rs.records()?,
            QueryResult::Affected(_) => Vec::new(),
        };
        let value = rows
            .first()
            .and_then(|r| r.get_index(0))
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::statement("no identity value available"))?;

        value
            .as_i64()
            .or_else(|| value.to_string().parse().ok())
            .ok_or_else(|| Error::statement(format!("identity value {value} is not an integer")))
    }

    /// Start a transaction.
    pub fn begin(&mut self, name: Option<&str>) -> Result<()> {
        let sql = self.dialect().begin_statement(name);
        self.ensure_ready()?;
        self.run(&sql).map(drop)
    }

    /// Commit a transaction.
    pub fn commit(&mut self, name: Option<&str>) -> Result<()> {
        let sql = self.dialect().commit_statement(name);
        self.ensure_ready()?;
        self.run(&sql).map(drop)
    }

    /// Roll a transaction back.
    pub fn rollback(&mut self, name: Option<&str>) -> Result<()> {
        let sql = self.dialect().rollback_statement(name);
        self.ensure_ready()?;
        self.run(&sql).map(drop)
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if self.state.is_busy() {
            return Err(Error::statement("connection busy"));
        }
        Ok(())
    }

    fn run(&mut self, sql: &str) -> Result<QueryResult> {
        let span = instrumentation::query_span(sql, self.dialect(), self.options.log_statements);
        let _guard = span.enter();
        tracing::trace!(sql = %sql, "executing statement");

        self.observers.notify(&Event::Query(sql.to_owned()));

        let response = match self.driver.execute(sql, &mut self.state) {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e, sql)),
        };
        self.state.finished();

        let result = match response {
            DriverResponse::Rows { columns, rows } => {
                tracing::debug!(rows = rows.len(), "statement returned rows");
                QueryResult::Rows(
                    ResultSet::new(columns, rows)
                        .with_timezone(self.options.timezone)
                        .with_seek(self.driver.supports_seek()),
                )
            }
            DriverResponse::Affected(n) => {
                tracing::debug!(affected = n, "statement completed");
                QueryResult::Affected(n)
            }
        };

        self.observers.notify(&Event::QueryEnd(result.outcome()));
        Ok(result)
    }

    fn fail(&mut self, error: Error, sql: &str) -> Error {
        if error.is_fatal_to_connection() {
            tracing::warn!(error = %error, "closing connection after transport failure");
            self.state.poison();
            self.connected = false;
            if let Err(close_error) = self.driver.close() {
                tracing::debug!(error = %close_error, "error while closing poisoned connection");
            }
        } else {
            self.state.finished();
        }

        match error {
            Error::StatementFailed {
                message,
                code,
                sql: None,
            } => Error::StatementFailed {
                message,
                code,
                sql: Some(sql.to_owned()),
            },
            other => other,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.connected {
            if let Err(e) = self.driver.close() {
                tracing::debug!(error = %e, "error closing connection on drop");
            }
        }
    }
}
