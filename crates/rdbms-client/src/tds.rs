//! TDS driver for Sybase ASE (TDS 5.0) and Microsoft SQL Server (TDS 7.x).
//!
//! ## Login
//!
//! ```text
//! Sybase: TCP -> LOGIN record -> LOGINACK ... DONE [-> use <database>]
//! MSSQL:  TCP -> PRELOGIN -> LOGIN7 -> LOGINACK ... DONE
//! ```
//!
//! Statements go out as a TDS 5.0 LANGUAGE token or a TDS 7.x SQL batch.
//! Responses are tokenized packet by packet; rows of the last result set
//! are decoded into [`SqlValue`]s using its column metadata.

use std::fmt;
use std::sync::Arc;

use rdbms_types::{SqlValue, decode_value};
use tds_codec::{PacketStream, Tokenizer};
use tds_protocol::{
    Charset, ColMetaData, Login5, Login7, Message, PacketType, PreLogin, RawRow, TdsVersion,
    Token, encode_language, encode_sql_batch,
};

use crate::config::ConnectionOptions;
use crate::connection::{Driver, DriverResponse};
use crate::dialect::Dialect;
use crate::dsn::Dsn;
use crate::error::{Error, Result};
use crate::result_set::Column;
use crate::state::ProtocolState;
use crate::transport::{Connector, TcpConnector, Transport};

/// Default Sybase ASE port.
pub const SYBASE_PORT: u16 = 5000;

/// Default SQL Server port.
pub const MSSQL_PORT: u16 = 1433;

/// Server identity from the login acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Program name, e.g. `sql server`.
    pub name: String,
    /// Negotiated protocol version.
    pub tds_version: TdsVersion,
    /// Raw program version.
    pub version: u32,
}

/// Driver for TDS servers.
pub struct TdsDriver {
    dialect: Dialect,
    connector: Arc<dyn Connector>,
    stream: Option<PacketStream<Box<dyn Transport>>>,
    tokenizer: Tokenizer,
    charset: Charset,
    severity_threshold: u8,
    server: Option<ServerInfo>,
}

impl TdsDriver {
    /// Driver speaking TDS 5.0 to Sybase ASE.
    #[must_use]
    pub fn sybase() -> Self {
        Self::new(Dialect::Sybase, Arc::new(TcpConnector))
    }

    /// Driver speaking TDS 7.4 to SQL Server.
    #[must_use]
    pub fn mssql() -> Self {
        Self::new(Dialect::MsSql, Arc::new(TcpConnector))
    }

    /// Use `connector` to open transports.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Server identity, once logged in.
    #[must_use]
    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    fn new(dialect: Dialect, connector: Arc<dyn Connector>) -> Self {
        let version = Self::initial_version(dialect);
        Self {
            dialect,
            connector,
            stream: None,
            tokenizer: Tokenizer::new(version, Charset::Utf8),
            charset: Charset::Utf8,
            severity_threshold: 10,
            server: None,
        }
    }

    fn initial_version(dialect: Dialect) -> TdsVersion {
        if dialect == Dialect::Sybase {
            TdsVersion::V5_0
        } else {
            TdsVersion::V7_4
        }
    }

    fn is_sybase(&self) -> bool {
        self.dialect == Dialect::Sybase
    }

    fn login(&mut self, dsn: &Dsn, options: &ConnectionOptions) -> Result<()> {
        let user = dsn.user().unwrap_or_default();
        let password = dsn.password().unwrap_or_default();
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

        let (packet_type, payload) = if self.is_sybase() {
            let login = Login5::new()
                .with_credentials(user, password)
                .with_hostname(hostname)
                .with_app_name(options.app_name.as_str())
                .with_server_name(dsn.host())
                .with_charset(options.charset)
                .with_packet_size(options.packet_size);
            (PacketType::Login, login.encode()?)
        } else {
            self.prelogin()?;
            let mut login = Login7::new()
                .with_tds_version(TdsVersion::V7_4)
                .with_sql_auth(user, password)
                .with_hostname(hostname)
                .with_app_name(options.app_name.as_str())
                .with_server_name(dsn.host())
                .with_packet_size(u32::from(options.packet_size));
            if let Some(database) = dsn.database() {
                login = login.with_database(database);
            }
            (PacketType::Tds7Login, login.encode())
        };

        self.tokenizer.begin_response();
        self.stream_mut()?.send_message(packet_type, payload)?;

        let mut failure: Option<Message> = None;
        loop {
            let token = self.next_token()?;
            match token {
                Token::LoginAck(ack) => {
                    if ack.is_success() {
                        tracing::debug!(
                            server = %ack.prog_name,
                            tds_version = ack.tds_version.raw(),
                            "login acknowledged"
                        );
                        self.tokenizer.set_version(ack.tds_version);
                        self.server = Some(ServerInfo {
                            name: ack.prog_name,
                            tds_version: ack.tds_version,
                            version: ack.prog_version,
                        });
                    }
                }
                Token::Message(message) => {
                    if message.is_error(self.severity_threshold) && failure.is_none() {
                        failure = Some(message);
                    } else {
                        log_message(&message);
                    }
                }
                Token::EnvChange(changes) => self.apply_env_changes(&changes)?,
                token if token.is_final() => break,
                other => tracing::trace!(token = ?other, "login token"),
            }
        }

        if self.server.is_none() {
            return Err(match failure {
                Some(message) => statement_error(message),
                None => Error::statement("login rejected by server"),
            });
        }
        Ok(())
    }

    fn prelogin(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.send_message(PacketType::PreLogin, PreLogin::new().encode())?;
        let response = stream.read_message()?;
        let server = PreLogin::decode(response)?;
        tracing::trace!(encryption = ?server.encryption, "pre-login response");

        if server.encryption.is_required() {
            return Err(Error::statement(
                "server requires an encrypted session, which this driver does not offer",
            ));
        }
        Ok(())
    }

    fn stream_mut(&mut self) -> Result<&mut PacketStream<Box<dyn Transport>>> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    fn next_token(&mut self) -> Result<Token> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        match stream.read_token(&mut self.tokenizer) {
            Ok(token) => Ok(token),
            Err(e) => {
                self.tokenizer.reset();
                Err(e.into())
            }
        }
    }

    fn apply_env_changes(&mut self, changes: &[tds_protocol::EnvChange]) -> Result<()> {
        for change in changes {
            if let Some(size) = change.packet_size() {
                self.stream_mut()?.set_packet_size(size);
            } else {
                tracing::trace!(
                    kind = change.kind,
                    value = ?change.new_value,
                    "environment change"
                );
            }
        }
        Ok(())
    }

    fn decode_row(&self, metadata: &ColMetaData, row: RawRow) -> Result<Vec<SqlValue>> {
        metadata
            .columns
            .iter()
            .zip(row.fields)
            .map(|(column, field)| {
                decode_value(&column.type_info, field.as_deref(), self.charset).map_err(Error::from)
            })
            .collect()
    }
}

impl Driver for TdsDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn connect(&mut self, dsn: &Dsn, options: &ConnectionOptions) -> Result<()> {
        let port = dsn.port_or(if self.is_sybase() {
            SYBASE_PORT
        } else {
            MSSQL_PORT
        });
        tracing::debug!(host = %dsn.host(), port, dialect = %self.dialect, "opening TDS session");

        let transport = self
            .connector
            .connect(dsn.host(), port, options.connect_timeout)?;

        self.stream = Some(PacketStream::new(transport));
        self.charset = options.charset;
        self.severity_threshold = options.severity_threshold;
        self.tokenizer = Tokenizer::new(Self::initial_version(self.dialect), options.charset);
        self.server = None;

        if let Err(e) = self.login(dsn, options) {
            self.close()?;
            return Err(e);
        }

        if self.is_sybase() {
            if let Some(database) = dsn.database() {
                let mut state = ProtocolState::default();
                if let Err(e) = self.execute(&format!("use {database}"), &mut state) {
                    self.close()?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, state: &mut ProtocolState) -> Result<DriverResponse> {
        let (packet_type, payload) = if self.is_sybase() {
            (PacketType::Normal, encode_language(sql, self.charset))
        } else {
            (
                PacketType::SqlBatch,
                encode_sql_batch(sql, self.tokenizer.version()),
            )
        };

        self.tokenizer.begin_response();
        state.request_sent();
        self.stream_mut()?.send_message(packet_type, payload)?;

        let mut metadata: Option<ColMetaData> = None;
        let mut rows: Vec<Vec<SqlValue>> = Vec::new();
        let mut affected: u64 = 0;
        let mut failure: Option<Message> = None;
        let mut decode_error: Option<Error> = None;
        let mut done_error = false;

        // A row that fails to decode does not end the response: the rest is
        // read to the final DONE so the next request starts in sync.
        loop {
            let token = self.next_token()?;
            state.tokens_started();

            match token {
                Token::ColMetaData(meta) => {
                    if !meta.is_empty() {
                        rows.clear();
                        metadata = Some(meta);
                    }
                }
                Token::Row(row) => match &metadata {
                    Some(_) if decode_error.is_some() => {}
                    Some(meta) => match self.decode_row(meta, row) {
                        Ok(values) => rows.push(values),
                        Err(e) => {
                            tracing::warn!(row = rows.len(), error = %e, "row decode failed");
                            decode_error = Some(e);
                        }
                    },
                    None => {
                        return Err(tds_protocol::ProtocolError::InvalidField {
                            field: "row without column metadata",
                            value: 0,
                        }
                        .into());
                    }
                },
                Token::Message(message) => {
                    if message.is_error(self.severity_threshold) {
                        if failure.is_none() {
                            failure = Some(message);
                        }
                    } else {
                        log_message(&message);
                    }
                }
                Token::EnvChange(changes) => self.apply_env_changes(&changes)?,
                Token::Done(done) => {
                    done_error |= done.is_error();
                    if let Some(count) = done.count() {
                        affected = count;
                    }
                    if done.kind == tds_protocol::DoneKind::Done && !done.has_more() {
                        break;
                    }
                }
                other => tracing::trace!(token = ?other, "skipping token"),
            }
        }

        if let Some(message) = failure {
            return Err(statement_error(message));
        }
        if let Some(e) = decode_error {
            return Err(e);
        }
        if done_error {
            return Err(Error::statement("statement failed without a server message"));
        }

        Ok(match metadata {
            Some(meta) => {
                tracing::debug!(rows = rows.len(), columns = meta.column_count(), "result set read");
                DriverResponse::Rows {
                    columns: meta
                        .columns
                        .iter()
                        .map(|c| {
                            Column::new(c.name.clone(), c.type_info.name).with_nullable(c.nullable)
                        })
                        .collect(),
                    rows,
                }
            }
            None => DriverResponse::Affected(affected),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.server = None;
        if let Some(mut stream) = self.stream.take() {
            stream.get_mut().shutdown()?;
            tracing::debug!(dialect = %self.dialect, "TDS session closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl fmt::Debug for TdsDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TdsDriver")
            .field("dialect", &self.dialect)
            .field("connected", &self.stream.is_some())
            .field("server", &self.server)
            .finish()
    }
}

fn statement_error(message: Message) -> Error {
    Error::StatementFailed {
        message: message.text,
        code: Some(message.number),
        sql: None,
    }
}

fn log_message(message: &Message) {
    if message.severity == 0 {
        tracing::debug!(number = message.number, text = %message.text, "server message");
    } else {
        tracing::warn!(
            number = message.number,
            severity = message.severity,
            text = %message.text,
            "server warning"
        );
    }
}
