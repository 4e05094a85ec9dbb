//! Resumable TDS token stream decoder.
//!
//! The transport hands over response bytes at arbitrary boundaries. The
//! [`Tokenizer`] keeps its position inside the current token across calls:
//! framed tokens wait until their announced length is buffered, while
//! column metadata and rows keep every completed column or field and retry
//! only the one that was cut short.
//!
//! ```text
//! AwaitToken -> ReadTokenHeader -> ReadTokenBody -> (emit) -> AwaitToken
//!                                                     \-> Finished (final DONE)
//! any error -> Failed (until reset)
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tds_protocol::codec::Charset;
use tds_protocol::error::ProtocolError;
use tds_protocol::tables::{TokenEntry, TokenKind, TokenLength, TokenTable};
use tds_protocol::token::{
    ColMetaData, ColumnDescriptor, DecodeContext, NO_METADATA, RawRow, Token, decode_field,
    is_null_in_bitmap,
};
use tds_protocol::version::TdsVersion;
use tokio_util::codec::Decoder;

use crate::error::CodecError;

/// Observable tokenizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerState {
    /// Waiting for the tag byte of the next token.
    AwaitToken,
    /// Tag read; waiting for the length or count that frames the body.
    ReadTokenHeader,
    /// Body partially received.
    ReadTokenBody,
    /// A DONE without the MORE bit ended the response.
    Finished,
    /// A protocol error aborted the response.
    Failed,
}

#[derive(Debug)]
enum State {
    AwaitToken,
    ReadTokenHeader(&'static TokenEntry),
    ReadTokenBody(Body),
    Finished,
    Failed,
}

#[derive(Debug)]
enum Body {
    Framed {
        entry: &'static TokenEntry,
        len: usize,
    },
    Columns {
        remaining: usize,
        columns: Vec<ColumnDescriptor>,
    },
    Row {
        bitmap: Option<Vec<u8>>,
        fields: Vec<Option<Bytes>>,
    },
}

/// Decodes a TDS response into [`Token`]s.
///
/// Implements [`Decoder`] so it can be driven by any byte buffer: call
/// `decode` after appending bytes and collect tokens until it returns
/// `Ok(None)`.
#[derive(Debug)]
pub struct Tokenizer {
    ctx: DecodeContext,
    table: TokenTable,
    state: State,
    metadata: Option<ColMetaData>,
}

impl Tokenizer {
    /// Create a tokenizer for a protocol version and client character set.
    #[must_use]
    pub fn new(version: TdsVersion, charset: Charset) -> Self {
        Self {
            ctx: DecodeContext::new(version, charset),
            table: TokenTable::for_version(version),
            state: State::AwaitToken,
            metadata: None,
        }
    }

    /// Switch tables after the server acknowledged a different version.
    pub fn set_version(&mut self, version: TdsVersion) {
        self.ctx = DecodeContext::new(version, self.ctx.charset);
        self.table = TokenTable::for_version(version);
    }

    /// Switch the character set used for single-byte strings.
    pub fn set_charset(&mut self, charset: Charset) {
        self.ctx.charset = charset;
    }

    /// Negotiated protocol version.
    #[must_use]
    pub fn version(&self) -> TdsVersion {
        self.ctx.version
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TokenizerState {
        match self.state {
            State::AwaitToken => TokenizerState::AwaitToken,
            State::ReadTokenHeader(_) => TokenizerState::ReadTokenHeader,
            State::ReadTokenBody(_) => TokenizerState::ReadTokenBody,
            State::Finished => TokenizerState::Finished,
            State::Failed => TokenizerState::Failed,
        }
    }

    /// Column metadata of the current result set.
    #[must_use]
    pub fn metadata(&self) -> Option<&ColMetaData> {
        self.metadata.as_ref()
    }

    /// Whether the final DONE of the response has been emitted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Whether the tokenizer is between tokens.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitToken | State::Finished)
    }

    /// Prepare for the next response, keeping the negotiated version.
    pub fn begin_response(&mut self) {
        self.state = State::AwaitToken;
        self.metadata = None;
    }

    /// Clear a failed state and all partial progress.
    ///
    /// The caller discards its residue buffer; after a failure the stream
    /// position is unknown.
    pub fn reset(&mut self) {
        self.begin_response();
    }

    fn step(&mut self, src: &mut BytesMut) -> Result<Option<Token>, ProtocolError> {
        loop {
            match std::mem::replace(&mut self.state, State::AwaitToken) {
                State::Finished => {
                    self.state = State::Finished;
                    return Ok(None);
                }
                State::Failed => {
                    self.state = State::Failed;
                    return Err(ProtocolError::Poisoned);
                }
                State::AwaitToken => {
                    let Some(&tag) = src.first() else {
                        return Ok(None);
                    };
                    let entry = self.table.lookup(tag)?;
                    src.advance(1);
                    self.state = State::ReadTokenHeader(entry);
                }
                State::ReadTokenHeader(entry) => match self.read_header(entry, src)? {
                    Some(body) => self.state = State::ReadTokenBody(body),
                    None => {
                        self.state = State::ReadTokenHeader(entry);
                        return Ok(None);
                    }
                },
                State::ReadTokenBody(body) => {
                    if let Some(token) = self.read_body(body, src)? {
                        return Ok(Some(self.emit(token)));
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn read_header(
        &mut self,
        entry: &'static TokenEntry,
        src: &mut BytesMut,
    ) -> Result<Option<Body>, ProtocolError> {
        let body = match entry.length {
            TokenLength::Fixed(_) | TokenLength::Done => {
                let len = self
                    .table
                    .fixed_length(entry)
                    .ok_or(ProtocolError::InvalidField {
                        field: "token length",
                        value: u32::from(entry.tag),
                    })?;
                Body::Framed { entry, len }
            }
            TokenLength::UShort => {
                if src.len() < 2 {
                    return Ok(None);
                }
                let len = src.get_u16_le() as usize;
                Body::Framed { entry, len }
            }
            TokenLength::ULong => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = src.get_u32_le() as usize;
                Body::Framed { entry, len }
            }
            TokenLength::ColumnCount => {
                if src.len() < 2 {
                    return Ok(None);
                }
                let count = src.get_u16_le();
                let remaining = if count == NO_METADATA {
                    0
                } else {
                    count as usize
                };
                Body::Columns {
                    remaining,
                    columns: Vec::with_capacity(remaining.min(64)),
                }
            }
            TokenLength::Columns => {
                let meta = self.metadata.as_ref().ok_or(ProtocolError::InvalidField {
                    field: "row without column metadata",
                    value: u32::from(entry.tag),
                })?;
                let bitmap = if entry.kind == TokenKind::NbcRow {
                    let len = meta.null_bitmap_len();
                    if src.len() < len {
                        return Ok(None);
                    }
                    Some(src.split_to(len).to_vec())
                } else {
                    None
                };
                Body::Row {
                    bitmap,
                    fields: Vec::with_capacity(meta.column_count()),
                }
            }
        };
        Ok(Some(body))
    }

    fn read_body(&mut self, body: Body, src: &mut BytesMut) -> Result<Option<Token>, ProtocolError> {
        match body {
            Body::Framed { entry, len } => {
                if src.len() < len {
                    self.state = State::ReadTokenBody(Body::Framed { entry, len });
                    return Ok(None);
                }
                let mut bytes = src.split_to(len).freeze();
                let token = Token::decode_framed(entry, &mut bytes, &self.ctx)?;
                if let Token::ColMetaData(meta) = &token {
                    self.metadata = Some(meta.clone());
                }
                tracing::trace!(token = entry.name, length = len, "decoded token");
                Ok(Some(token))
            }
            Body::Columns {
                mut remaining,
                mut columns,
            } => {
                while remaining > 0 {
                    let mut cursor = &src[..];
                    match ColumnDescriptor::decode_v7(&mut cursor, &self.ctx) {
                        Ok(column) => {
                            let consumed = src.len() - cursor.len();
                            src.advance(consumed);
                            columns.push(column);
                            remaining -= 1;
                        }
                        Err(e) if e.is_incomplete() => {
                            self.state = State::ReadTokenBody(Body::Columns { remaining, columns });
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    }
                }
                let meta = ColMetaData { columns };
                tracing::trace!(columns = meta.column_count(), "decoded column metadata");
                self.metadata = Some(meta.clone());
                Ok(Some(Token::ColMetaData(meta)))
            }
            Body::Row { bitmap, mut fields } => {
                let Some(meta) = &self.metadata else {
                    return Err(ProtocolError::UnexpectedEof);
                };
                while fields.len() < meta.columns.len() {
                    let index = fields.len();
                    if bitmap
                        .as_deref()
                        .is_some_and(|bits| is_null_in_bitmap(bits, index))
                    {
                        fields.push(None);
                        continue;
                    }
                    let mut cursor = &src[..];
                    match decode_field(&mut cursor, &meta.columns[index].type_info) {
                        Ok(value) => {
                            let consumed = src.len() - cursor.len();
                            src.advance(consumed);
                            fields.push(value);
                        }
                        Err(e) if e.is_incomplete() => {
                            self.state = State::ReadTokenBody(Body::Row { bitmap, fields });
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(Some(Token::Row(RawRow { fields })))
            }
        }
    }

    fn emit(&mut self, token: Token) -> Token {
        self.state = if token.is_final() {
            State::Finished
        } else {
            State::AwaitToken
        };
        token
    }
}

impl Decoder for Tokenizer {
    type Item = Token;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.step(src) {
            Ok(token) => Ok(token),
            Err(ProtocolError::Poisoned) => Err(ProtocolError::Poisoned.into()),
            Err(e) => {
                tracing::warn!(error = %e, version = %self.ctx.version, "token stream rejected");
                self.state = State::Failed;
                Err(e.into())
            }
        }
    }
}
