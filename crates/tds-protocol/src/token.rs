//! TDS token definitions and body decoders.
//!
//! A response is a sequence of tokens, each starting with a tag byte. The
//! framing of every tag is described by [`crate::tables::TokenTable`]; this
//! module decodes token bodies once their bytes are available. Row fields
//! are kept as raw bytes and typed later against the column metadata.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    Charset, ensure, read_b_charstring, read_b_varbyte, read_b_varchar, read_us_charstring,
    read_us_varchar, write_b_varchar, write_us_varchar,
};
use crate::error::ProtocolError;
use crate::tables::{TokenEntry, TokenKind};
use crate::types::{DataLayout, TypeInfo, TypeTable};
use crate::version::TdsVersion;

/// Everything a body decoder needs besides the bytes.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// Negotiated protocol version.
    pub version: TdsVersion,
    /// Client character set for single-byte strings.
    pub charset: Charset,
    /// Type table for `version`.
    pub types: TypeTable,
}

impl DecodeContext {
    /// Build a context for a protocol version.
    #[must_use]
    pub fn new(version: TdsVersion, charset: Charset) -> Self {
        Self {
            version,
            charset,
            types: TypeTable::for_version(version),
        }
    }
}

/// A decoded TDS token.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Token {
    /// Column metadata for the following rows.
    ColMetaData(ColMetaData),
    /// A data row.
    Row(RawRow),
    /// Error, informational or extended error message.
    Message(Message),
    /// Statement, procedure or in-procedure completion.
    Done(Done),
    /// Login acknowledgement.
    LoginAck(LoginAck),
    /// Environment changes.
    EnvChange(Vec<EnvChange>),
    /// Stored procedure return status.
    ReturnStatus(i32),
    /// ORDER BY column numbers.
    Order(Vec<u16>),
    /// TDS 5.0 capability bitmaps.
    Capability(Bytes),
    /// TDS 5.0 column format control.
    Control(Bytes),
    /// A token the client reads past.
    Ignored {
        /// Tag byte.
        tag: u8,
        /// Body length in bytes.
        length: usize,
    },
}

impl Token {
    /// Decode a token whose complete body is in `body`.
    ///
    /// Used for every fixed-size and length-prefixed token. Column metadata
    /// without a length prefix and rows are decoded incrementally by the
    /// tokenizer instead.
    pub fn decode_framed(
        entry: &TokenEntry,
        body: &mut Bytes,
        ctx: &DecodeContext,
    ) -> Result<Self, ProtocolError> {
        let token = match entry.kind {
            TokenKind::ColMetaData => Self::ColMetaData(ColMetaData::decode_v5(body, ctx)?),
            TokenKind::Error => Self::Message(Message::decode(body, ctx, MessageKind::Error)?),
            TokenKind::Info => Self::Message(Message::decode(body, ctx, MessageKind::Info)?),
            TokenKind::Eed => Self::Message(Message::decode(body, ctx, MessageKind::Extended)?),
            TokenKind::LoginAck => Self::LoginAck(LoginAck::decode(body, ctx)?),
            TokenKind::EnvChange => Self::EnvChange(EnvChange::decode_all(body, ctx)?),
            TokenKind::Done => Self::Done(Done::decode(body, ctx.version, DoneKind::Done)?),
            TokenKind::DoneProc => Self::Done(Done::decode(body, ctx.version, DoneKind::Proc)?),
            TokenKind::DoneInProc => {
                Self::Done(Done::decode(body, ctx.version, DoneKind::InProc)?)
            }
            TokenKind::ReturnStatus => {
                ensure(body, 4)?;
                Self::ReturnStatus(body.get_i32_le())
            }
            TokenKind::Order => {
                let mut columns = Vec::new();
                if ctx.version.is_sybase() {
                    while body.has_remaining() {
                        columns.push(u16::from(body.get_u8()));
                    }
                } else {
                    while body.remaining() >= 2 {
                        columns.push(body.get_u16_le());
                    }
                }
                Self::Order(columns)
            }
            TokenKind::Capability => Self::Capability(std::mem::take(body)),
            TokenKind::Control => Self::Control(std::mem::take(body)),
            TokenKind::Row | TokenKind::NbcRow | TokenKind::Ignored => {
                let length = body.remaining();
                body.advance(length);
                Self::Ignored {
                    tag: entry.tag,
                    length,
                }
            }
        };
        Ok(token)
    }

    /// Whether this token ends a logical response.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done(done) if done.kind == DoneKind::Done && !done.has_more())
    }
}

// =============================================================================
// Column metadata
// =============================================================================

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name (may be empty for unnamed expressions).
    pub name: String,
    /// Declared type.
    pub type_info: TypeInfo,
    /// Server user type.
    pub user_type: u32,
    /// Raw status flags.
    pub flags: u16,
    /// Whether the column allows NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Decode one TDS 7.x COLMETADATA column entry.
    pub fn decode_v7(src: &mut impl Buf, ctx: &DecodeContext) -> Result<Self, ProtocolError> {
        let user_type = if ctx.version.has_wide_user_type() {
            ensure(src, 4)?;
            src.get_u32_le()
        } else {
            ensure(src, 2)?;
            u32::from(src.get_u16_le())
        };
        ensure(src, 3)?;
        let flags = src.get_u16_le();
        let type_id = src.get_u8();
        let type_info = ctx.types.decode_type_info(type_id, src)?;
        let name = read_b_varchar(src)?;

        Ok(Self {
            name,
            type_info,
            user_type,
            flags,
            nullable: flags & 0x0001 != 0,
        })
    }

    /// Decode one TDS 5.0 ROWFMT column entry.
    pub fn decode_v5(src: &mut impl Buf, ctx: &DecodeContext) -> Result<Self, ProtocolError> {
        let name = read_b_charstring(src, ctx.charset)?;
        ensure(src, 6)?;
        let status = src.get_u8();
        let user_type = src.get_u32_le();
        let type_id = src.get_u8();
        let type_info = ctx.types.decode_type_info(type_id, src)?;
        // locale information
        read_b_varbyte(src)?;

        Ok(Self {
            name,
            type_info,
            user_type,
            flags: u16::from(status),
            nullable: status & 0x20 != 0,
        })
    }
}

/// Column metadata for a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColMetaData {
    /// Columns in select-list order.
    pub columns: Vec<ColumnDescriptor>,
}

/// COLMETADATA column count announcing that no metadata follows.
pub const NO_METADATA: u16 = 0xFFFF;

impl ColMetaData {
    /// Decode a complete TDS 5.0 ROWFMT body.
    pub fn decode_v5(src: &mut impl Buf, ctx: &DecodeContext) -> Result<Self, ProtocolError> {
        ensure(src, 2)?;
        let count = src.get_u16_le() as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(ColumnDescriptor::decode_v5(src, ctx)?);
        }
        Ok(Self { columns })
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this represents no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Length in bytes of the NBCROW null bitmap for these columns.
    #[must_use]
    pub fn null_bitmap_len(&self) -> usize {
        self.columns.len().div_ceil(8)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A data row with undecoded field bytes; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Field values in column order.
    pub fields: Vec<Option<Bytes>>,
}

/// PLP total length announcing NULL.
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Decode one row field framed according to `info`.
///
/// Returns `UnexpectedEof` without a partial result when the field is not
/// complete; callers retry once more bytes arrive.
pub fn decode_field(src: &mut impl Buf, info: &TypeInfo) -> Result<Option<Bytes>, ProtocolError> {
    match info.layout {
        DataLayout::Fixed(0) => Ok(None),
        DataLayout::Fixed(width) => {
            ensure(src, width)?;
            Ok(Some(src.copy_to_bytes(width)))
        }
        DataLayout::ByteLen => {
            ensure(src, 1)?;
            let len = src.get_u8() as usize;
            take_or_null(src, len, len == 0)
        }
        DataLayout::UShortLen => {
            ensure(src, 2)?;
            let len = src.get_u16_le();
            take_or_null(src, len as usize, len == 0xFFFF)
        }
        DataLayout::LongLen => {
            ensure(src, 4)?;
            let len = src.get_u32_le() as usize;
            take_or_null(src, len, len == 0)
        }
        DataLayout::TextPtr => {
            ensure(src, 1)?;
            let ptr_len = src.get_u8() as usize;
            if ptr_len == 0 {
                return Ok(None);
            }
            // text pointer, 8-byte timestamp, data length
            ensure(src, ptr_len + 8 + 4)?;
            src.advance(ptr_len + 8);
            let len = src.get_u32_le() as usize;
            take_or_null(src, len, false)
        }
        DataLayout::Plp => {
            ensure(src, 8)?;
            let total = src.get_u64_le();
            if total == PLP_NULL {
                return Ok(None);
            }
            let mut data = BytesMut::new();
            loop {
                ensure(src, 4)?;
                let chunk = src.get_u32_le() as usize;
                if chunk == 0 {
                    break;
                }
                ensure(src, chunk)?;
                data.put(src.copy_to_bytes(chunk));
            }
            Ok(Some(data.freeze()))
        }
    }
}

fn take_or_null(
    src: &mut impl Buf,
    len: usize,
    is_null: bool,
) -> Result<Option<Bytes>, ProtocolError> {
    if is_null {
        return Ok(None);
    }
    ensure(src, len)?;
    Ok(Some(src.copy_to_bytes(len)))
}

/// Whether column `index` is flagged NULL in an NBCROW bitmap.
#[must_use]
pub fn is_null_in_bitmap(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

// =============================================================================
// Messages
// =============================================================================

/// Which message token produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// ERROR token.
    Error,
    /// INFO token.
    Info,
    /// TDS 5.0 EED token.
    Extended,
}

/// A server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Originating token.
    pub kind: MessageKind,
    /// Message number.
    pub number: i32,
    /// Message state.
    pub state: u8,
    /// Severity class.
    pub severity: u8,
    /// SQLSTATE (TDS 5.0 EED only).
    pub sql_state: Option<String>,
    /// Message text.
    pub text: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: u32,
}

impl Message {
    /// Decode an ERROR, INFO or EED body.
    pub fn decode(
        src: &mut impl Buf,
        ctx: &DecodeContext,
        kind: MessageKind,
    ) -> Result<Self, ProtocolError> {
        ensure(src, 6)?;
        let number = src.get_i32_le();
        let state = src.get_u8();
        let severity = src.get_u8();

        if ctx.version.is_sybase() {
            let sql_state = if kind == MessageKind::Extended {
                let state_text = read_b_charstring(src, ctx.charset)?;
                // status and transaction state
                ensure(src, 3)?;
                src.advance(3);
                Some(state_text)
            } else {
                None
            };
            let text = read_us_charstring(src, ctx.charset)?;
            let server = read_b_charstring(src, ctx.charset)?;
            let procedure = read_b_charstring(src, ctx.charset)?;
            ensure(src, 2)?;
            let line = u32::from(src.get_u16_le());
            Ok(Self {
                kind,
                number,
                state,
                severity,
                sql_state,
                text,
                server,
                procedure,
                line,
            })
        } else {
            let text = read_us_varchar(src)?;
            let server = read_b_varchar(src)?;
            let procedure = read_b_varchar(src)?;
            let line = if ctx.version.has_wide_user_type() {
                ensure(src, 4)?;
                src.get_u32_le()
            } else {
                ensure(src, 2)?;
                u32::from(src.get_u16_le())
            };
            Ok(Self {
                kind,
                number,
                state,
                severity,
                sql_state: None,
                text,
                server,
                procedure,
                line,
            })
        }
    }

    /// Encode a TDS 7.2+ ERROR/INFO body, without tag or length.
    pub fn encode_v7(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.number);
        dst.put_u8(self.state);
        dst.put_u8(self.severity);
        write_us_varchar(dst, &self.text);
        write_b_varchar(dst, &self.server);
        write_b_varchar(dst, &self.procedure);
        dst.put_u32_le(self.line);
    }

    /// Whether the severity exceeds `threshold`.
    #[must_use]
    pub fn is_error(&self, threshold: u8) -> bool {
        self.severity > threshold
    }
}

// =============================================================================
// DONE
// =============================================================================

bitflags! {
    /// DONE token status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DoneStatus: u16 {
        /// More results follow.
        const MORE = 0x0001;
        /// The statement failed.
        const ERROR = 0x0002;
        /// A transaction is in progress.
        const IN_XACT = 0x0004;
        /// The row count is valid.
        const COUNT = 0x0010;
        /// Acknowledges an attention.
        const ATTN = 0x0020;
        /// A server error terminated the batch.
        const SRVERROR = 0x0100;
    }
}

/// Which DONE token this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneKind {
    /// DONE.
    Done,
    /// DONEPROC.
    Proc,
    /// DONEINPROC.
    InProc,
}

/// Completion of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done {
    /// Token variant.
    pub kind: DoneKind,
    /// Status bits.
    pub status: DoneStatus,
    /// Current command (TDS 7.x) or transaction state (TDS 5.0).
    pub cur_cmd: u16,
    /// Affected or returned rows; valid when `COUNT` is set.
    pub row_count: u64,
}

impl Done {
    /// Decode a DONE-family body.
    pub fn decode(
        src: &mut impl Buf,
        version: TdsVersion,
        kind: DoneKind,
    ) -> Result<Self, ProtocolError> {
        ensure(src, 4)?;
        let status = DoneStatus::from_bits_retain(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = if version.has_wide_row_count() {
            ensure(src, 8)?;
            src.get_u64_le()
        } else {
            ensure(src, 4)?;
            u64::from(src.get_u32_le())
        };
        Ok(Self {
            kind,
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the body (without the tag).
    pub fn encode(&self, dst: &mut impl BufMut, version: TdsVersion) {
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le(self.cur_cmd);
        if version.has_wide_row_count() {
            dst.put_u64_le(self.row_count);
        } else {
            dst.put_u32_le(self.row_count as u32);
        }
    }

    /// Whether more results follow.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Whether the statement failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status
            .intersects(DoneStatus::ERROR | DoneStatus::SRVERROR)
    }

    /// Row count when the server flagged it valid.
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        self.status
            .contains(DoneStatus::COUNT)
            .then_some(self.row_count)
    }
}

// =============================================================================
// LOGINACK / ENVCHANGE
// =============================================================================

/// TDS 5.0 LOGINACK status: login accepted.
pub const LOGIN_SUCCEED: u8 = 5;

/// Login acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// Interface (TDS 7.x) or login status (TDS 5.0).
    pub status: u8,
    /// Version the server agreed to.
    pub tds_version: TdsVersion,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: u32,
}

impl LoginAck {
    /// Decode a LOGINACK body.
    pub fn decode(src: &mut impl Buf, ctx: &DecodeContext) -> Result<Self, ProtocolError> {
        ensure(src, 5)?;
        let status = src.get_u8();
        let tds_version = TdsVersion::new(src.get_u32());
        let prog_name = if ctx.version.is_sybase() {
            read_b_charstring(src, ctx.charset)?
        } else {
            read_b_varchar(src)?
        };
        ensure(src, 4)?;
        let prog_version = src.get_u32();
        Ok(Self {
            status,
            tds_version,
            prog_name,
            prog_version,
        })
    }

    /// Whether the login was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.tds_version.is_sybase() || self.status == LOGIN_SUCCEED
    }
}

/// Value carried by an environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// Textual value (database, language, charset, packet size).
    Text(String),
    /// Binary value (collation, transaction descriptor).
    Binary(Bytes),
}

impl EnvValue {
    /// Text content, if textual.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

/// Environment change type: current database.
pub const ENV_DATABASE: u8 = 1;
/// Environment change type: language.
pub const ENV_LANGUAGE: u8 = 2;
/// Environment change type: character set.
pub const ENV_CHARSET: u8 = 3;
/// Environment change type: packet size.
pub const ENV_PACKET_SIZE: u8 = 4;

/// A single environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChange {
    /// Change type.
    pub kind: u8,
    /// New value.
    pub new_value: EnvValue,
    /// Previous value.
    pub old_value: EnvValue,
}

impl EnvChange {
    /// Decode every change in an ENVCHANGE body.
    ///
    /// TDS 5.0 packs several changes in one token; TDS 7.x sends one per
    /// token. Unknown TDS 7.x change types consume the rest of the body.
    pub fn decode_all(src: &mut impl Buf, ctx: &DecodeContext) -> Result<Vec<Self>, ProtocolError> {
        let mut changes = Vec::new();
        while src.has_remaining() {
            let kind = src.get_u8();
            let change = if ctx.version.is_sybase() {
                Self {
                    kind,
                    new_value: EnvValue::Text(read_b_charstring(src, ctx.charset)?),
                    old_value: EnvValue::Text(read_b_charstring(src, ctx.charset)?),
                }
            } else if (1..=6).contains(&kind) || kind == 13 {
                Self {
                    kind,
                    new_value: EnvValue::Text(read_b_varchar(src)?),
                    old_value: EnvValue::Text(read_b_varchar(src)?),
                }
            } else if (7..=12).contains(&kind) {
                Self {
                    kind,
                    new_value: EnvValue::Binary(read_b_varbyte(src)?),
                    old_value: EnvValue::Binary(read_b_varbyte(src)?),
                }
            } else {
                let rest = src.remaining();
                Self {
                    kind,
                    new_value: EnvValue::Binary(src.copy_to_bytes(rest)),
                    old_value: EnvValue::Binary(Bytes::new()),
                }
            };
            changes.push(change);
        }
        Ok(changes)
    }

    /// Negotiated packet size, for packet size changes.
    #[must_use]
    pub fn packet_size(&self) -> Option<usize> {
        if self.kind != ENV_PACKET_SIZE {
            return None;
        }
        self.new_value.as_text()?.trim().parse().ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tables::TokenTable;
    use crate::types::TypeClass;

    fn v7() -> DecodeContext {
        DecodeContext::new(TdsVersion::V7_4, Charset::Utf8)
    }

    fn v5() -> DecodeContext {
        DecodeContext::new(TdsVersion::V5_0, Charset::Iso88591)
    }

    #[test]
    fn test_done_roundtrip_widths() {
        let done = Done {
            kind: DoneKind::Done,
            status: DoneStatus::COUNT,
            cur_cmd: 0xC1,
            row_count: 3,
        };
        for (version, width) in [(TdsVersion::V7_4, 12), (TdsVersion::V5_0, 8)] {
            let mut buf = BytesMut::new();
            done.encode(&mut buf, version);
            assert_eq!(buf.len(), width);
            let decoded = Done::decode(&mut buf.freeze(), version, DoneKind::Done).unwrap();
            assert_eq!(decoded, done);
            assert_eq!(decoded.count(), Some(3));
            assert!(!decoded.has_more());
        }
    }

    #[test]
    fn test_done_status_flags() {
        let raw = [0x03u8, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        let done = Done::decode(&mut &raw[..], TdsVersion::V7_4, DoneKind::Done).unwrap();
        assert!(done.has_more());
        assert!(done.is_error());
        assert_eq!(done.count(), None);
    }

    #[test]
    fn test_message_v7() {
        let msg = Message {
            kind: MessageKind::Error,
            number: 102,
            state: 1,
            severity: 15,
            sql_state: None,
            text: "Incorrect syntax near 'selec'.".into(),
            server: "db1".into(),
            procedure: String::new(),
            line: 1,
        };
        let mut buf = BytesMut::new();
        msg.encode_v7(&mut buf);
        let decoded = Message::decode(&mut buf.freeze(), &v7(), MessageKind::Error).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_error(10));
    }

    #[test]
    fn test_message_v5_eed() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(2812);
        buf.put_u8(5);
        buf.put_u8(16);
        buf.put_u8(5);
        buf.put_slice(b"ZZZZZ");
        buf.put_u8(0);
        buf.put_u16_le(0);
        buf.put_u16_le(4);
        buf.put_slice(b"oops");
        buf.put_u8(3);
        buf.put_slice(b"SYB");
        buf.put_u8(0);
        buf.put_u16_le(1);
        let msg = Message::decode(&mut buf.freeze(), &v5(), MessageKind::Extended).unwrap();
        assert_eq!(msg.number, 2812);
        assert_eq!(msg.severity, 16);
        assert_eq!(msg.sql_state.as_deref(), Some("ZZZZZ"));
        assert_eq!(msg.text, "oops");
        assert_eq!(msg.server, "SYB");
    }

    #[test]
    fn test_loginack_v5() {
        let mut buf = BytesMut::new();
        buf.put_u8(LOGIN_SUCCEED);
        buf.put_slice(&[5, 0, 0, 0]);
        buf.put_u8(10);
        buf.put_slice(b"sql server");
        buf.put_slice(&[15, 0, 0, 0]);
        let ack = LoginAck::decode(&mut buf.freeze(), &v5()).unwrap();
        assert_eq!(ack.tds_version, TdsVersion::V5_0);
        assert_eq!(ack.prog_name, "sql server");
        assert!(ack.is_success());
    }

    #[test]
    fn test_envchange_packet_size() {
        let mut buf = BytesMut::new();
        buf.put_u8(ENV_PACKET_SIZE);
        write_b_varchar(&mut buf, "8192");
        write_b_varchar(&mut buf, "4096");
        let changes = EnvChange::decode_all(&mut buf.freeze(), &v7()).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].packet_size(), Some(8192));
    }

    #[test]
    fn test_envchange_v5_multiple() {
        let raw = [1u8, 2, b'd', b'b', 0, 3, 5, b'i', b's', b'o', b'_', b'1', 0];
        let changes = EnvChange::decode_all(&mut &raw[..], &v5()).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].new_value.as_text(), Some("db"));
        assert_eq!(changes[1].kind, ENV_CHARSET);
    }

    #[test]
    fn test_rowfmt_v5() {
        let mut body = BytesMut::new();
        body.put_u16_le(2);
        // id int
        body.put_u8(2);
        body.put_slice(b"id");
        body.put_u8(0);
        body.put_u32_le(7);
        body.put_u8(0x38);
        body.put_u8(0);
        // name varchar(30) null
        body.put_u8(4);
        body.put_slice(b"name");
        body.put_u8(0x20);
        body.put_u32_le(2);
        body.put_u8(0x27);
        body.put_u8(30);
        body.put_u8(0);

        let meta = ColMetaData::decode_v5(&mut body.freeze(), &v5()).unwrap();
        assert_eq!(meta.column_count(), 2);
        assert_eq!(meta.columns[0].name, "id");
        assert_eq!(meta.columns[0].type_info.layout, DataLayout::Fixed(4));
        assert!(!meta.columns[0].nullable);
        assert_eq!(meta.columns[1].type_info.class, TypeClass::Char);
        assert!(meta.columns[1].nullable);
    }

    #[test]
    fn test_colmetadata_v7_column() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0x0001);
        buf.put_u8(0x26);
        buf.put_u8(4);
        write_b_varchar(&mut buf, "job_id");
        let col = ColumnDescriptor::decode_v7(&mut buf.freeze(), &v7()).unwrap();
        assert_eq!(col.name, "job_id");
        assert!(col.nullable);
        assert_eq!(col.type_info.class, TypeClass::Int);
    }

    #[test]
    fn test_decode_field_layouts() {
        let table = TypeTable::for_version(TdsVersion::V7_4);
        let intn = table.decode_type_info(0x26, &mut &[4u8][..]).unwrap();
        assert_eq!(
            decode_field(&mut &[4u8, 1, 0, 0, 0][..], &intn).unwrap(),
            Some(Bytes::from_static(&[1, 0, 0, 0]))
        );
        assert_eq!(decode_field(&mut &[0u8][..], &intn).unwrap(), None);

        let nvarchar = table
            .decode_type_info(0xE7, &mut &[0x10u8, 0, 9, 4, 0xD0, 0, 0x34][..])
            .unwrap();
        assert_eq!(decode_field(&mut &[0xFFu8, 0xFF][..], &nvarchar).unwrap(), None);
        assert_eq!(
            decode_field(&mut &[2u8, 0, b'a'][..], &nvarchar),
            Err(ProtocolError::UnexpectedEof)
        );
    }

    #[test]
    fn test_decode_plp_field() {
        let table = TypeTable::for_version(TdsVersion::V7_4);
        let max = table
            .decode_type_info(0xA5, &mut &[0xFFu8, 0xFF][..])
            .unwrap();
        let mut raw = BytesMut::new();
        raw.put_u64_le(5);
        raw.put_u32_le(2);
        raw.put_slice(b"ab");
        raw.put_u32_le(3);
        raw.put_slice(b"cde");
        raw.put_u32_le(0);
        assert_eq!(
            decode_field(&mut raw.freeze(), &max).unwrap(),
            Some(Bytes::from_static(b"abcde"))
        );
        let mut null = BytesMut::new();
        null.put_u64_le(PLP_NULL);
        assert_eq!(decode_field(&mut null.freeze(), &max).unwrap(), None);
    }

    #[test]
    fn test_decode_textptr_field() {
        let table = TypeTable::for_version(TdsVersion::V5_0);
        let text = table
            .decode_type_info(0x23, &mut &[0u8, 0, 0, 0x7F, 0, 0][..])
            .unwrap();
        let mut raw = BytesMut::new();
        raw.put_u8(16);
        raw.put_bytes(0xAB, 16);
        raw.put_bytes(0, 8);
        raw.put_u32_le(3);
        raw.put_slice(b"xyz");
        assert_eq!(
            decode_field(&mut raw.freeze(), &text).unwrap(),
            Some(Bytes::from_static(b"xyz"))
        );
        assert_eq!(decode_field(&mut &[0u8][..], &text).unwrap(), None);
    }

    #[test]
    fn test_null_bitmap() {
        let bitmap = [0b0000_0101u8, 0b0000_0001];
        assert!(is_null_in_bitmap(&bitmap, 0));
        assert!(!is_null_in_bitmap(&bitmap, 1));
        assert!(is_null_in_bitmap(&bitmap, 2));
        assert!(is_null_in_bitmap(&bitmap, 8));
        assert!(!is_null_in_bitmap(&bitmap, 20));
    }

    #[test]
    fn test_decode_framed_order_and_status() {
        let table = TokenTable::for_version(TdsVersion::V7_4);
        let entry = table.lookup(0x79).unwrap();
        let mut body = Bytes::from_static(&[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            Token::decode_framed(entry, &mut body, &v7()).unwrap(),
            Token::ReturnStatus(-2)
        );
        let entry = table.lookup(0xA9).unwrap();
        let mut body = Bytes::from_static(&[1, 0, 3, 0]);
        assert_eq!(
            Token::decode_framed(entry, &mut body, &v7()).unwrap(),
            Token::Order(vec![1, 3])
        );
    }
}
