//! TDS token-stream builders.
//!
//! [`TokenStream`] writes server responses the way Sybase ASE (TDS 5.0) or
//! SQL Server (TDS 7.4) would put them on the wire, so tokenizer and driver
//! tests can be fed realistic bytes without a server.
//!
//! ```rust
//! use rdbms_testing::stream::TokenStream;
//! use rdbms_testing::{MockColumn, ScalarValue};
//!
//! let bytes = TokenStream::sybase()
//!     .columns(&[MockColumn::int("id"), MockColumn::varchar("name", 30)])
//!     .row(&[ScalarValue::Int(1), ScalarValue::from("alice")])
//!     .done(1)
//!     .finish();
//! assert_eq!(bytes[0], 0xEE);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use tds_protocol::codec::{write_b_varchar, write_utf16_string};
use tds_protocol::token::{Done, DoneKind, DoneStatus, LOGIN_SUCCEED, Message, MessageKind};
use tds_protocol::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType, TdsVersion};

const TAG_ROWFMT: u8 = 0xEE;
const TAG_COLMETADATA: u8 = 0x81;
const TAG_ROW: u8 = 0xD1;
const TAG_ERROR: u8 = 0xAA;
const TAG_INFO: u8 = 0xAB;
const TAG_EED: u8 = 0xE5;
const TAG_LOGINACK: u8 = 0xAD;
const TAG_ENVCHANGE: u8 = 0xE3;
const TAG_DONE: u8 = 0xFD;
const TAG_DONEINPROC: u8 = 0xFF;

/// Default collation sent with TDS 7.x character columns (Latin1_General_CI_AS).
const COLLATION: [u8; 5] = [0x09, 0x04, 0xD0, 0x00, 0x34];

/// Value of a mock row field.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// NULL value.
    Null,
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// String value.
    String(String),
    /// Binary data.
    Binary(Vec<u8>),
    /// Timestamp, sent with 1/300 second precision.
    DateTime(NaiveDateTime),
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<NaiveDateTime> for ScalarValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

/// Declared type of a mock column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Nullable integer (`intn`).
    Int,
    /// Nullable float (`floatn`).
    Float,
    /// Character data: `varchar` on TDS 5.0, `nvarchar` on TDS 7.x.
    Varchar(u16),
    /// Binary data: `varbinary`.
    Binary(u16),
    /// Nullable 8-byte `datetime` (`datetimn`).
    DateTime,
}

/// Mock column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockColumn {
    /// Column name.
    pub name: String,
    /// Column type.
    pub kind: ColumnKind,
    /// Whether the column is nullable.
    pub nullable: bool,
}

impl MockColumn {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    /// An integer column.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Int)
    }

    /// A float column.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    /// A character column of `max_len` characters.
    pub fn varchar(name: impl Into<String>, max_len: u16) -> Self {
        Self::new(name, ColumnKind::Varchar(max_len))
    }

    /// A binary column of `max_len` bytes.
    pub fn binary(name: impl Into<String>, max_len: u16) -> Self {
        Self::new(name, ColumnKind::Binary(max_len))
    }

    /// A datetime column.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::DateTime)
    }

    /// Set nullable flag.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Server type name the client reports for this column.
    #[must_use]
    pub fn type_name(&self, version: TdsVersion) -> &'static str {
        match self.kind {
            ColumnKind::Int => "intn",
            ColumnKind::Float => "floatn",
            ColumnKind::Varchar(_) if version.is_sybase() => "varchar",
            ColumnKind::Varchar(_) => "nvarchar",
            ColumnKind::Binary(_) => "varbinary",
            ColumnKind::DateTime => "datetimn",
        }
    }
}

/// Builder for a server response token stream.
#[derive(Debug, Clone)]
pub struct TokenStream {
    version: TdsVersion,
    columns: Vec<MockColumn>,
    buf: BytesMut,
}

impl TokenStream {
    /// Empty stream for `version`.
    #[must_use]
    pub fn new(version: TdsVersion) -> Self {
        Self {
            version,
            columns: Vec::new(),
            buf: BytesMut::new(),
        }
    }

    /// Empty TDS 5.0 stream.
    #[must_use]
    pub fn sybase() -> Self {
        Self::new(TdsVersion::V5_0)
    }

    /// Empty TDS 7.4 stream.
    #[must_use]
    pub fn mssql() -> Self {
        Self::new(TdsVersion::V7_4)
    }

    /// Protocol version of the stream.
    #[must_use]
    pub fn version(&self) -> TdsVersion {
        self.version
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Column metadata (ROWFMT or COLMETADATA). Later rows are encoded
    /// against these columns.
    #[must_use]
    pub fn columns(mut self, columns: &[MockColumn]) -> Self {
        if self.version.is_sybase() {
            let mut body = BytesMut::new();
            body.put_u16_le(columns.len() as u16);
            for column in columns {
                put_b_charstring(&mut body, &column.name);
                body.put_u8(if column.nullable { 0x20 } else { 0x00 });
                body.put_u32_le(0);
                self.put_type_info(&mut body, column.kind);
                // no locale
                body.put_u8(0);
            }
            put_framed(&mut self.buf, TAG_ROWFMT, &body);
        } else {
            self.buf.put_u8(TAG_COLMETADATA);
            self.buf.put_u16_le(columns.len() as u16);
            for column in columns {
                self.buf.put_u32_le(0);
                self.buf.put_u16_le(u16::from(column.nullable));
                let mut info = BytesMut::new();
                self.put_type_info(&mut info, column.kind);
                self.buf.put_slice(&info);
                write_b_varchar(&mut self.buf, &column.name);
            }
        }
        self.columns = columns.to_vec();
        self
    }

    /// A ROW token for the current columns. Missing trailing values are
    /// sent as NULL.
    #[must_use]
    pub fn row(mut self, values: &[ScalarValue]) -> Self {
        self.buf.put_u8(TAG_ROW);
        for (index, column) in self.columns.iter().enumerate() {
            let value = values.get(index).unwrap_or(&ScalarValue::Null);
            put_field(&mut self.buf, self.version, column.kind, value);
        }
        self
    }

    /// An error message: EED on TDS 5.0, ERROR on TDS 7.x.
    #[must_use]
    pub fn error(self, number: i32, severity: u8, text: &str) -> Self {
        let kind = if self.version.is_sybase() {
            MessageKind::Extended
        } else {
            MessageKind::Error
        };
        self.message(kind, number, severity, text)
    }

    /// An informational message.
    #[must_use]
    pub fn info(self, number: i32, text: &str) -> Self {
        self.message(MessageKind::Info, number, 0, text)
    }

    /// A message token of the given kind.
    #[must_use]
    pub fn message(mut self, kind: MessageKind, number: i32, severity: u8, text: &str) -> Self {
        let message = Message {
            kind,
            number,
            state: 1,
            severity,
            sql_state: (kind == MessageKind::Extended).then(|| "ZZZZZ".to_owned()),
            text: text.to_owned(),
            server: "mock".to_owned(),
            procedure: String::new(),
            line: 1,
        };

        let tag = match kind {
            MessageKind::Error => TAG_ERROR,
            MessageKind::Info => TAG_INFO,
            MessageKind::Extended => TAG_EED,
        };

        let mut body = BytesMut::new();
        if self.version.is_sybase() {
            body.put_i32_le(message.number);
            body.put_u8(message.state);
            body.put_u8(message.severity);
            if let Some(sql_state) = &message.sql_state {
                put_b_charstring(&mut body, sql_state);
                // status, transaction state
                body.put_u8(0);
                body.put_u16_le(0);
            }
            body.put_u16_le(message.text.len() as u16);
            body.put_slice(message.text.as_bytes());
            put_b_charstring(&mut body, &message.server);
            put_b_charstring(&mut body, &message.procedure);
            body.put_u16_le(message.line as u16);
        } else {
            message.encode_v7(&mut body);
        }
        put_framed(&mut self.buf, tag, &body);
        self
    }

    /// A successful login acknowledgement naming the server program.
    #[must_use]
    pub fn login_ack(self, program: &str) -> Self {
        let status = if self.version.is_sybase() {
            LOGIN_SUCCEED
        } else {
            1
        };
        self.login_ack_with_status(program, status)
    }

    /// A login acknowledgement with an explicit status byte.
    #[must_use]
    pub fn login_ack_with_status(mut self, program: &str, status: u8) -> Self {
        let mut body = BytesMut::new();
        body.put_u8(status);
        body.put_u32(self.version.raw());
        if self.version.is_sybase() {
            put_b_charstring(&mut body, program);
        } else {
            write_b_varchar(&mut body, program);
        }
        body.put_u32(0x1000_0000);
        put_framed(&mut self.buf, TAG_LOGINACK, &body);
        self
    }

    /// An environment change with textual values.
    #[must_use]
    pub fn env_change(mut self, kind: u8, new_value: &str, old_value: &str) -> Self {
        let mut body = BytesMut::new();
        body.put_u8(kind);
        if self.version.is_sybase() {
            put_b_charstring(&mut body, new_value);
            put_b_charstring(&mut body, old_value);
        } else {
            write_b_varchar(&mut body, new_value);
            write_b_varchar(&mut body, old_value);
        }
        put_framed(&mut self.buf, TAG_ENVCHANGE, &body);
        self
    }

    /// Final DONE with a valid row count.
    #[must_use]
    pub fn done(self, rows: u64) -> Self {
        self.done_with(DoneStatus::COUNT, rows)
    }

    /// DONE with the MORE bit: another result follows.
    #[must_use]
    pub fn done_more(self, rows: u64) -> Self {
        self.done_with(DoneStatus::COUNT | DoneStatus::MORE, rows)
    }

    /// Final DONE flagging a failed statement.
    #[must_use]
    pub fn done_error(self) -> Self {
        self.done_with(DoneStatus::ERROR, 0)
    }

    /// DONE with explicit status bits.
    #[must_use]
    pub fn done_with(mut self, status: DoneStatus, rows: u64) -> Self {
        self.buf.put_u8(TAG_DONE);
        Done {
            kind: DoneKind::Done,
            status,
            cur_cmd: 0xC1,
            row_count: rows,
        }
        .encode(&mut self.buf, self.version);
        self
    }

    /// DONEINPROC with a row count and the MORE bit.
    #[must_use]
    pub fn done_in_proc(mut self, rows: u64) -> Self {
        self.buf.put_u8(TAG_DONEINPROC);
        Done {
            kind: DoneKind::InProc,
            status: DoneStatus::COUNT | DoneStatus::MORE,
            cur_cmd: 0xC1,
            row_count: rows,
        }
        .encode(&mut self.buf, self.version);
        self
    }

    /// Append pre-encoded bytes.
    #[must_use]
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.put_slice(bytes);
        self
    }

    /// The encoded stream.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn put_type_info(&self, dst: &mut BytesMut, kind: ColumnKind) {
        let sybase = self.version.is_sybase();
        match kind {
            ColumnKind::Int => {
                dst.put_u8(0x26);
                dst.put_u8(8);
            }
            ColumnKind::Float => {
                dst.put_u8(0x6D);
                dst.put_u8(8);
            }
            ColumnKind::DateTime => {
                dst.put_u8(0x6F);
                dst.put_u8(8);
            }
            ColumnKind::Varchar(max) if sybase => {
                dst.put_u8(0x27);
                dst.put_u8(max.min(255) as u8);
            }
            ColumnKind::Varchar(max) => {
                dst.put_u8(0xE7);
                dst.put_u16_le(max.saturating_mul(2).min(8000));
                dst.put_slice(&COLLATION);
            }
            ColumnKind::Binary(max) if sybase => {
                dst.put_u8(0x25);
                dst.put_u8(max.min(255) as u8);
            }
            ColumnKind::Binary(max) => {
                dst.put_u8(0xA5);
                dst.put_u16_le(max.min(8000));
            }
        }
    }
}

/// Split `payload` into packets of at most `max_payload` bytes each; the
/// last one carries `END_OF_MESSAGE`.
#[must_use]
pub fn packetize(packet_type: PacketType, payload: &[u8], max_payload: usize) -> Bytes {
    let max_payload = max_payload.max(1);
    let mut out = BytesMut::with_capacity(payload.len() + PACKET_HEADER_SIZE);
    let mut chunks = payload.chunks(max_payload).peekable();

    if chunks.peek().is_none() {
        PacketHeader::new(packet_type, PacketStatus::END_OF_MESSAGE, PACKET_HEADER_SIZE as u16)
            .encode(&mut out);
        return out.freeze();
    }

    let mut packet_id: u8 = 1;
    while let Some(chunk) = chunks.next() {
        let status = if chunks.peek().is_none() {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        PacketHeader::new(packet_type, status, (PACKET_HEADER_SIZE + chunk.len()) as u16)
            .with_packet_id(packet_id)
            .encode(&mut out);
        out.put_slice(chunk);
        packet_id = packet_id.wrapping_add(1);
    }
    out.freeze()
}

fn put_framed(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.put_u8(tag);
    dst.put_u16_le(body.len() as u16);
    dst.put_slice(body);
}

fn put_b_charstring(dst: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(255);
    dst.put_u8(len as u8);
    dst.put_slice(&bytes[..len]);
}

fn put_field(dst: &mut BytesMut, version: TdsVersion, kind: ColumnKind, value: &ScalarValue) {
    let wide = !version.is_sybase();
    match (kind, value) {
        (ColumnKind::Varchar(_) | ColumnKind::Binary(_), ScalarValue::Null) if wide => {
            dst.put_u16_le(0xFFFF);
        }
        (_, ScalarValue::Null) => dst.put_u8(0),
        (ColumnKind::Int, ScalarValue::Int(v)) => {
            dst.put_u8(4);
            dst.put_i32_le(*v);
        }
        (ColumnKind::Int, ScalarValue::BigInt(v)) => {
            dst.put_u8(8);
            dst.put_i64_le(*v);
        }
        (ColumnKind::Float, ScalarValue::Double(v)) => {
            dst.put_u8(8);
            dst.put_f64_le(*v);
        }
        (ColumnKind::DateTime, ScalarValue::DateTime(v)) => {
            let (days, ticks) = datetime_parts(v);
            dst.put_u8(8);
            dst.put_i32_le(days);
            dst.put_u32_le(ticks);
        }
        (ColumnKind::Varchar(_), ScalarValue::String(s)) if wide => {
            let mut text = BytesMut::new();
            write_utf16_string(&mut text, s);
            dst.put_u16_le(text.len() as u16);
            dst.put_slice(&text);
        }
        (ColumnKind::Varchar(_), ScalarValue::String(s)) => {
            dst.put_u8(s.len().min(255) as u8);
            dst.put_slice(&s.as_bytes()[..s.len().min(255)]);
        }
        (ColumnKind::Binary(_), ScalarValue::Binary(b)) if wide => {
            dst.put_u16_le(b.len() as u16);
            dst.put_slice(b);
        }
        (ColumnKind::Binary(_), ScalarValue::Binary(b)) => {
            dst.put_u8(b.len().min(255) as u8);
            dst.put_slice(&b[..b.len().min(255)]);
        }
        (kind, value) => {
            tracing::warn!(?kind, ?value, "value does not fit column; sending NULL");
            put_field(dst, version, kind, &ScalarValue::Null);
        }
    }
}

/// Days since 1900-01-01 and 1/300 second ticks since midnight.
fn datetime_parts(value: &NaiveDateTime) -> (i32, u32) {
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default();
    let days = (value.date() - epoch).num_days() as i32;
    let time = value.time();
    let millis = time.num_seconds_from_midnight() * 1000 + time.nanosecond() / 1_000_000;
    (days, (millis * 3 + 5) / 10)
}
