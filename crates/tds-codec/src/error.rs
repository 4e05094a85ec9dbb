//! Codec-level error types.

use std::io;

use tds_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing packets or tokenizing a response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Transport I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed protocol data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Packet header announces a length smaller than the header itself.
    #[error("invalid packet header")]
    InvalidHeader,

    /// Packet exceeds the negotiated maximum.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Announced size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// The peer closed the stream mid-message.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the error was caused by malformed data rather than I/O.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::InvalidHeader | Self::PacketTooLarge { .. }
        )
    }
}
