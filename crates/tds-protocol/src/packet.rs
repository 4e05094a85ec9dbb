//! The 8-byte packet header shared by TDS 5.0 and TDS 7.x.
//!
//! ```text
//! offset  0     1       2..4        4..6      6          7
//!         type  status  length (BE) channel   packet id  window
//! ```
//!
//! `length` counts the header itself. A message spans packets until one
//! carries [`PacketStatus::END_OF_MESSAGE`].

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Size of the header in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Largest packet the 16-bit length field can describe.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Smallest packet size servers of either family accept.
pub const MIN_PACKET_SIZE: usize = 512;

/// Packet size used until the server announces another one.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Packet type byte.
///
/// TDS 5.0 sends its login record as [`PacketType::Login`] and every other
/// request as a token stream in [`PacketType::Normal`] packets; TDS 7.x has
/// a dedicated type per request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// TDS 7.x SQL batch.
    SqlBatch = 0x01,
    /// TDS 5.0 login record.
    Login = 0x02,
    /// TDS 7.x remote procedure call. Never sent by this crate.
    Rpc = 0x03,
    /// Server response of either family.
    TabularResult = 0x04,
    /// TDS 5.0 token-encoded request.
    Normal = 0x0F,
    /// TDS 7.x LOGIN7.
    Tds7Login = 0x10,
    /// TDS 7.x PRELOGIN.
    PreLogin = 0x12,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, ProtocolError> {
        Ok(match raw {
            0x01 => Self::SqlBatch,
            0x02 => Self::Login,
            0x03 => Self::Rpc,
            0x04 => Self::TabularResult,
            0x0F => Self::Normal,
            0x10 => Self::Tds7Login,
            0x12 => Self::PreLogin,
            _ => return Err(ProtocolError::InvalidPacketType(raw)),
        })
    }
}

bitflags! {
    /// Packet status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// More packets follow.
        const NORMAL = 0x00;
        /// Last packet of the message.
        const END_OF_MESSAGE = 0x01;
        /// Acknowledges an attention; the packet carries no data.
        const IGNORE = 0x02;
        /// TDS 5.0 event notification.
        const EVENT = 0x04;
        /// TDS 7.x: reset session state before the request.
        const RESET_CONNECTION = 0x08;
        /// TDS 7.x: as `RESET_CONNECTION`, keeping the transaction.
        const RESET_KEEP_TRANSACTION = 0x10;
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Status bits.
    pub status: PacketStatus,
    /// Packet length, header included.
    pub length: u16,
    /// Server process id (TDS 7.x) or channel (TDS 5.0); zero from clients.
    pub channel: u16,
    /// Sequence number within a message, starting at 1 and wrapping.
    pub packet_id: u8,
}

impl PacketHeader {
    /// Header with channel and sequence number zero.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            channel: 0,
            packet_id: 0,
        }
    }

    /// Set the sequence number.
    #[must_use]
    pub const fn with_packet_id(mut self, packet_id: u8) -> Self {
        self.packet_id = packet_id;
        self
    }

    /// Read a header. Unknown type bytes and status bits are rejected.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let packet_type = PacketType::try_from(src.get_u8())?;
        let raw_status = src.get_u8();
        let status = PacketStatus::from_bits(raw_status)
            .ok_or(ProtocolError::InvalidPacketStatus(raw_status))?;
        let length = src.get_u16();
        let channel = src.get_u16();
        let packet_id = src.get_u8();
        src.advance(1); // window, always zero

        Ok(Self {
            packet_type,
            status,
            length,
            channel,
            packet_id,
        })
    }

    /// Write the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.channel);
        dst.put_u8(self.packet_id);
        dst.put_u8(0);
    }

    /// Bytes following the header.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(PACKET_HEADER_SIZE)
    }

    /// Whether this packet ends its message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sybase_response_header() {
        // TDS 5.0 response on channel 0, second packet, final
        let raw = [0x04u8, 0x01, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00];
        let header = PacketHeader::decode(&mut &raw[..]).unwrap();
        assert_eq!(header.packet_type, PacketType::TabularResult);
        assert!(header.is_end_of_message());
        assert_eq!(header.length, 512);
        assert_eq!(header.payload_length(), 504);
        assert_eq!(header.packet_id, 2);

        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn test_request_header_layout() {
        let header = PacketHeader::new(PacketType::Normal, PacketStatus::NORMAL, 0x0123)
            .with_packet_id(7);
        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out, [0x0F, 0x00, 0x01, 0x23, 0x00, 0x00, 0x07, 0x00]);
    }

    #[test]
    fn test_short_length_has_empty_payload() {
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 3);
        assert_eq!(header.payload_length(), 0);
    }

    #[test]
    fn test_packet_types() {
        assert_eq!(PacketType::try_from(0x0F).unwrap(), PacketType::Normal);
        assert_eq!(PacketType::try_from(0x02).unwrap(), PacketType::Login);
        assert_eq!(PacketType::try_from(0x12).unwrap(), PacketType::PreLogin);
        assert_eq!(
            PacketType::try_from(0x06),
            Err(ProtocolError::InvalidPacketType(0x06))
        );
    }

    #[test]
    fn test_header_validation() {
        let unknown_status = [0x04u8, 0x40, 0x00, 0x08, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(
            PacketHeader::decode(&mut &unknown_status[..]),
            Err(ProtocolError::InvalidPacketStatus(0x40))
        );

        let short = [0x04u8, 0x01, 0x00];
        assert!(matches!(
            PacketHeader::decode(&mut &short[..]),
            Err(ProtocolError::IncompletePacket { actual: 3, .. })
        ));
    }
}
