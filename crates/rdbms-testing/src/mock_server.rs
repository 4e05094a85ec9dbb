//! In-memory TDS server.
//!
//! [`MockTdsServer`] answers the TDS login handshake and SQL requests of
//! both protocol families without a socket. It implements
//! [`rdbms_client::Connector`], so a [`TdsDriver`] configured with it runs
//! its real packet and token code against scripted responses.
//!
//! ## Features
//!
//! - TDS 5.0 login record and LANGUAGE requests (Sybase)
//! - TDS 7.x pre-login, LOGIN7 and SQL batches (SQL Server)
//! - Configurable responses keyed by SQL text
//! - Responses split into small packets and served a few bytes per read,
//!   so every token boundary is exercised
//! - Recorded packets and statements for assertions
//!
//! ## Example
//!
//! ```rust
//! use rdbms_client::{DriverRegistry, Dsn};
//! use rdbms_testing::{MockColumn, MockResponse, MockTdsServer, ScalarValue};
//!
//! let server = MockTdsServer::builder()
//!     .with_response(
//!         "select id from t",
//!         MockResponse::rows(vec![MockColumn::int("id")], vec![vec![ScalarValue::Int(7)]]),
//!     )
//!     .with_max_read(3)
//!     .build();
//!
//! let registry = server.registry();
//! let mut conn = registry.create(&Dsn::parse("sybase://sa:pw@db1")?)?;
//! conn.connect()?;
//! let rows = conn.select("select id from t", &[])?;
//! assert_eq!(rows[0].get("id").and_then(|v| v.as_i32()), Some(7));
//! # Ok::<(), rdbms_client::Error>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use rdbms_client::{Connector, Driver, DriverRegistry, Dsn, TdsDriver, Transport};
use tds_protocol::codec::Charset;
use tds_protocol::sql_batch::LANGUAGE_TOKEN;
use tds_protocol::token::{ENV_DATABASE, ENV_PACKET_SIZE};
use tds_protocol::{
    EncryptionLevel, PACKET_HEADER_SIZE, PacketHeader, PacketType, PreLogin, TdsVersion,
};
use thiserror::Error;

use crate::stream::{ColumnKind, MockColumn, ScalarValue, TokenStream, packetize};

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The client shut the transport down.
    #[error("transport closed")]
    Closed,
}

impl From<MockServerError> for io::Error {
    fn from(e: MockServerError) -> Self {
        match e {
            MockServerError::Io(e) => e,
            MockServerError::Protocol(_) => io::Error::new(io::ErrorKind::InvalidData, e),
            MockServerError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, e),
        }
    }
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return a single unnamed value.
    Scalar(ScalarValue),

    /// Return multiple rows with columns.
    Rows {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data.
        rows: Vec<Vec<ScalarValue>>,
    },

    /// Return an error.
    Error {
        /// Error number.
        number: i32,
        /// Error message.
        message: String,
        /// Severity class.
        severity: u8,
    },

    /// Return rows affected count (for INSERT/UPDATE/DELETE).
    RowsAffected(u64),

    /// Return raw pre-encoded TDS tokens.
    Raw(Bytes),

    /// Build the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::Error {
                number,
                message,
                severity,
            } => f
                .debug_struct("Error")
                .field("number", number)
                .field("message", message)
                .field("severity", severity)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Raw(data) => f.debug_tuple("Raw").field(&data.len()).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create a scalar integer response.
    pub fn scalar_int(value: i32) -> Self {
        Self::Scalar(ScalarValue::Int(value))
    }

    /// Create a scalar string response.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::String(value.into()))
    }

    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::RowsAffected(0)
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create an error response with severity 16.
    pub fn error(number: i32, message: impl Into<String>) -> Self {
        Self::Error {
            number,
            message: message.into(),
            severity: 16,
        }
    }

    /// Create a multi-row response.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// Create a response computed from the SQL text.
    pub fn custom(handler: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(handler))
    }

    /// Encode as the token stream a server of `version` would send.
    #[must_use]
    pub fn encode(&self, sql: &str, version: TdsVersion) -> Bytes {
        let stream = TokenStream::new(version);
        match self {
            Self::Scalar(value) => {
                let kind = match value {
                    ScalarValue::Double(_) => ColumnKind::Float,
                    ScalarValue::String(_) => ColumnKind::Varchar(255),
                    ScalarValue::Binary(_) => ColumnKind::Binary(255),
                    ScalarValue::DateTime(_) => ColumnKind::DateTime,
                    ScalarValue::Null | ScalarValue::Int(_) | ScalarValue::BigInt(_) => {
                        ColumnKind::Int
                    }
                };
                stream
                    .columns(&[MockColumn::new("", kind)])
                    .row(std::slice::from_ref(value))
                    .done(1)
                    .finish()
            }
            Self::Rows { columns, rows } => rows
                .iter()
                .fold(stream.columns(columns), |stream, row| stream.row(row))
                .done(rows.len() as u64)
                .finish(),
            Self::Error {
                number,
                message,
                severity,
            } => stream
                .error(*number, *severity, message)
                .done_error()
                .finish(),
            Self::RowsAffected(count) => stream.done(*count).finish(),
            Self::Raw(data) => data.clone(),
            Self::Custom(handler) => handler(sql).encode(sql, version),
        }
    }
}

/// Configuration for the mock TDS server.
#[derive(Debug)]
pub struct MockServerConfig {
    /// Responses keyed by normalized SQL text.
    responses: HashMap<String, MockResponse>,
    /// Default response for unmatched queries.
    default_response: MockResponse,
    /// Server name to report in LoginAck.
    server_name: String,
    /// Database announced after login.
    database: String,
    /// Packet size announced after login.
    packet_size: u16,
    /// Largest payload of a response packet.
    max_payload: usize,
    /// Most bytes handed out per read.
    max_read: usize,
    /// Reject logins with this message.
    login_error: Option<String>,
}

/// Builder for `MockTdsServer`.
#[derive(Debug)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                default_response: MockResponse::empty(),
                server_name: "MockServer".to_string(),
                database: "master".to_string(),
                packet_size: 4096,
                max_payload: 4088,
                max_read: usize::MAX,
                login_error: None,
            },
        }
    }

    /// Add a response for a specific SQL query. Matching ignores case and
    /// surrounding whitespace.
    #[must_use]
    pub fn with_response(mut self, sql: impl AsRef<str>, response: MockResponse) -> Self {
        self.config
            .responses
            .insert(normalize(sql.as_ref()), response);
        self
    }

    /// Set the default response for unmatched queries.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Set the server name reported in LoginAck.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the database announced after login.
    #[must_use]
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.config.database = db.into();
        self
    }

    /// Set the packet size announced after login.
    #[must_use]
    pub fn with_packet_size(mut self, size: u16) -> Self {
        self.config.packet_size = size;
        self
    }

    /// Split responses into packets of at most `size` payload bytes.
    #[must_use]
    pub fn with_max_payload(mut self, size: usize) -> Self {
        self.config.max_payload = size.max(1);
        self
    }

    /// Hand out at most `size` bytes per read.
    #[must_use]
    pub fn with_max_read(mut self, size: usize) -> Self {
        self.config.max_read = size.max(1);
        self
    }

    /// Reject every login with `message`.
    #[must_use]
    pub fn rejecting_logins(mut self, message: impl Into<String>) -> Self {
        self.config.login_error = Some(message.into());
        self
    }

    /// Build the server.
    pub fn build(self) -> MockTdsServer {
        MockTdsServer {
            shared: Arc::new(Shared {
                config: self.config,
                statements: Mutex::new(Vec::new()),
                packets: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A packet seen by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPacket {
    /// Packet direction (true = server to client).
    pub from_server: bool,
    /// Packet type from the header.
    pub packet_type: PacketType,
    /// Raw packet data including header.
    pub data: Bytes,
}

#[derive(Debug)]
struct Shared {
    config: MockServerConfig,
    statements: Mutex<Vec<String>>,
    packets: Mutex<Vec<RecordedPacket>>,
    connections: AtomicUsize,
}

/// An in-memory TDS server.
///
/// Cloning shares the configuration and the recorded traffic.
#[derive(Debug, Clone)]
pub struct MockTdsServer {
    shared: Arc<Shared>,
}

impl MockTdsServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Transports opened so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// SQL text received, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.shared.statements.lock().clone()
    }

    /// Packets exchanged, in order.
    #[must_use]
    pub fn packets(&self) -> Vec<RecordedPacket> {
        self.shared.packets.lock().clone()
    }

    /// Types of the packets the clients sent.
    #[must_use]
    pub fn client_packet_types(&self) -> Vec<PacketType> {
        self.shared
            .packets
            .lock()
            .iter()
            .filter(|p| !p.from_server)
            .map(|p| p.packet_type)
            .collect()
    }

    /// A Sybase driver connected through this server.
    #[must_use]
    pub fn sybase_driver(&self) -> TdsDriver {
        TdsDriver::sybase().with_connector(Arc::new(self.clone()))
    }

    /// A SQL Server driver connected through this server.
    #[must_use]
    pub fn mssql_driver(&self) -> TdsDriver {
        TdsDriver::mssql().with_connector(Arc::new(self.clone()))
    }

    /// A registry whose `sybase` and `mssql` schemes reach this server.
    #[must_use]
    pub fn registry(&self) -> DriverRegistry {
        let registry = DriverRegistry::new();
        let server = self.clone();
        registry.register(
            "sybase",
            move |_: &Dsn| -> rdbms_client::Result<Box<dyn Driver>> {
                Ok(Box::new(server.sybase_driver()))
            },
        );
        let server = self.clone();
        registry.register(
            "mssql",
            move |_: &Dsn| -> rdbms_client::Result<Box<dyn Driver>> {
                Ok(Box::new(server.mssql_driver()))
            },
        );
        registry
    }

    /// Open a transport directly.
    #[must_use]
    pub fn open(&self) -> MockTransport {
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        MockTransport {
            shared: Arc::clone(&self.shared),
            inbound: BytesMut::new(),
            message: BytesMut::new(),
            outbound: BytesMut::new(),
            version: TdsVersion::V7_4,
            closed: false,
        }
    }
}

impl Connector for MockTdsServer {
    fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Transport>> {
        tracing::debug!(host = %host, port, "mock connection");
        Ok(Box::new(self.open()))
    }
}

/// One client session of a [`MockTdsServer`].
pub struct MockTransport {
    shared: Arc<Shared>,
    /// Client bytes not yet framed into a packet.
    inbound: BytesMut,
    /// Payload of the request being reassembled.
    message: BytesMut,
    /// Response bytes not yet read by the client.
    outbound: BytesMut,
    version: TdsVersion,
    closed: bool,
}

impl MockTransport {
    fn process(&mut self) -> Result<()> {
        while self.inbound.len() >= PACKET_HEADER_SIZE {
            let header = PacketHeader::decode(&mut &self.inbound[..])
                .map_err(|e| MockServerError::Protocol(e.to_string()))?;
            let length = usize::from(header.length);
            if length < PACKET_HEADER_SIZE {
                return Err(MockServerError::Protocol(format!(
                    "packet length {length} shorter than its header"
                )));
            }
            if self.inbound.len() < length {
                break;
            }

            let packet = self.inbound.split_to(length).freeze();
            self.record(false, header.packet_type, packet.clone());
            self.message.extend_from_slice(&packet[PACKET_HEADER_SIZE..]);

            if header.is_end_of_message() {
                let payload = self.message.split().freeze();
                self.handle(header.packet_type, payload)?;
            }
        }
        Ok(())
    }

    fn handle(&mut self, packet_type: PacketType, payload: Bytes) -> Result<()> {
        match packet_type {
            PacketType::PreLogin => {
                self.version = TdsVersion::V7_4;
                let response = PreLogin {
                    version: 0x1000_0000,
                    encryption: EncryptionLevel::NotSupported,
                    ..PreLogin::default()
                };
                self.respond(&response.encode());
            }
            PacketType::Login => {
                self.version = TdsVersion::V5_0;
                self.login();
            }
            PacketType::Tds7Login => {
                self.version = TdsVersion::V7_4;
                self.login();
            }
            PacketType::Normal => {
                let sql = decode_language(payload)?;
                self.execute(&sql);
            }
            PacketType::SqlBatch => {
                let sql = decode_sql_batch(payload, self.version)?;
                self.execute(&sql);
            }
            other => {
                return Err(MockServerError::Protocol(format!(
                    "unexpected packet type {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn login(&mut self) {
        let config = &self.shared.config;
        let stream = TokenStream::new(self.version);
        let response = match &config.login_error {
            Some(message) if self.version.is_sybase() => stream
                .error(4002, 14, message)
                .login_ack_with_status(&config.server_name, 6)
                .done(0),
            Some(message) => stream.error(18456, 14, message).done_error(),
            None => stream
                .login_ack(&config.server_name)
                .env_change(ENV_DATABASE, &config.database, "master")
                .env_change(ENV_PACKET_SIZE, &config.packet_size.to_string(), "512")
                .done(0),
        };
        tracing::debug!(version = %self.version, "mock login");
        self.respond(&response.finish());
    }

    fn execute(&mut self, sql: &str) {
        tracing::trace!(sql = %sql, "mock statement");
        self.shared.statements.lock().push(sql.to_owned());

        let config = &self.shared.config;
        let response = config
            .responses
            .get(&normalize(sql))
            .unwrap_or(&config.default_response);
        let tokens = response.encode(sql, self.version);
        self.respond(&tokens);
    }

    fn respond(&mut self, payload: &[u8]) {
        let packets = packetize(
            PacketType::TabularResult,
            payload,
            self.shared.config.max_payload,
        );
        let mut src = packets.clone();
        while src.remaining() >= PACKET_HEADER_SIZE {
            let Ok(header) = PacketHeader::decode(&mut &src[..]) else {
                break;
            };
            let packet = src.split_to(usize::from(header.length).min(src.len()));
            self.record(true, header.packet_type, packet);
        }
        self.outbound.extend_from_slice(&packets);
    }

    fn record(&self, from_server: bool, packet_type: PacketType, data: Bytes) {
        self.shared.packets.lock().push(RecordedPacket {
            from_server,
            packet_type,
            data,
        });
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let n = buf
            .len()
            .min(self.outbound.len())
            .min(self.shared.config.max_read);
        buf[..n].copy_from_slice(&self.outbound[..n]);
        self.outbound.advance(n);
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(MockServerError::Closed.into());
        }
        self.inbound.extend_from_slice(buf);
        self.process()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn shutdown(&mut self) -> io::Result<()> {
        self.closed = true;
        self.outbound.clear();
        Ok(())
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("version", &self.version)
            .field("pending", &self.outbound.len())
            .field("closed", &self.closed)
            .finish()
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().to_lowercase()
}

/// SQL text of a TDS 5.0 LANGUAGE token.
fn decode_language(mut payload: Bytes) -> Result<String> {
    if payload.remaining() < 6 || payload.get_u8() != LANGUAGE_TOKEN {
        return Err(MockServerError::Protocol(
            "expected a LANGUAGE token".to_string(),
        ));
    }
    let len = payload.get_u32_le() as usize;
    // status byte
    payload.advance(1);
    let text_len = len.saturating_sub(1).min(payload.remaining());
    Ok(Charset::Utf8.decode(&payload[..text_len]).into_owned())
}

/// SQL text of a TDS 7.x SQL batch.
fn decode_sql_batch(mut payload: Bytes, version: TdsVersion) -> Result<String> {
    if version.requires_all_headers() {
        if payload.remaining() < 4 {
            return Err(MockServerError::Protocol("truncated ALL_HEADERS".to_string()));
        }
        let total = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        if total > payload.remaining() {
            return Err(MockServerError::Protocol(format!(
                "ALL_HEADERS length {total} exceeds payload"
            )));
        }
        payload.advance(total);
    }

    if payload.len() % 2 != 0 {
        return Err(MockServerError::Protocol(
            "Invalid UTF-16 SQL text length".to_string(),
        ));
    }
    let chars: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&chars)
        .map_err(|_| MockServerError::Protocol("Invalid UTF-16 SQL text".to_string()))
}
