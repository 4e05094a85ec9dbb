//! Protocol-level error types.

use thiserror::Error;

use crate::version::TdsVersion;

/// Errors that can occur during TDS protocol parsing or encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Packet data is truncated or incomplete.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes available.
        actual: usize,
    },

    /// Invalid packet type value.
    #[error("invalid packet type: {0:#04x}")]
    InvalidPacketType(u8),

    /// Invalid packet status flags.
    #[error("invalid packet status: {0:#04x}")]
    InvalidPacketStatus(u8),

    /// Token tag not present in the token table of the negotiated version.
    #[error("invalid token type {tag:#04x} for {version}")]
    InvalidTokenType {
        /// The offending tag byte.
        tag: u8,
        /// Protocol version whose table was consulted.
        version: TdsVersion,
    },

    /// Data type not present in the type table of the negotiated version.
    #[error("invalid data type: {0:#04x}")]
    InvalidDataType(u8),

    /// Invalid prelogin option.
    #[error("invalid prelogin option: {0:#04x}")]
    InvalidPreloginOption(u8),

    /// String encoding error.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// Packet length exceeds maximum allowed.
    #[error("packet too large: {length} bytes (max {max})")]
    PacketTooLarge {
        /// Actual packet length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Unexpected end of data.
    ///
    /// Inside the tokenizer this only means "not enough bytes yet"; it is
    /// never surfaced for a token that is still being received.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Invalid field value in a protocol structure.
    #[error("invalid {field} value: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Invalid value.
        value: u32,
    },

    /// The tokenizer was fed after a failed parse without being reset.
    #[error("tokenizer is in a failed state and must be reset")]
    Poisoned,
}

impl ProtocolError {
    /// Whether the error only signals that more input is needed.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::UnexpectedEof | Self::IncompletePacket { .. })
    }
}
