//! TDS packet codec implementation.

use bytes::{BufMut, Bytes, BytesMut};
use tds_protocol::packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A TDS packet with header and payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Packet payload (excluding header).
    pub payload: BytesMut,
}

impl Packet {
    /// Create a new packet with the given header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Get the total packet size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// A complete request to be split into packets.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Packet type stamped on every packet.
    pub packet_type: PacketType,
    /// Message payload.
    pub payload: Bytes,
}

impl OutgoingMessage {
    /// Create a message.
    #[must_use]
    pub fn new(packet_type: PacketType, payload: Bytes) -> Self {
        Self {
            packet_type,
            payload,
        }
    }
}

/// TDS packet codec.
///
/// Decodes one packet at a time and encodes either single packets or whole
/// messages, which are split at the negotiated packet size.
#[derive(Debug)]
pub struct TdsCodec {
    /// Maximum packet size to accept.
    max_packet_size: usize,
    /// Packet size used when splitting outgoing messages.
    packet_size: usize,
    /// Current packet sequence number for encoding.
    packet_id: u8,
}

impl TdsCodec {
    /// Create a new TDS codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_size: DEFAULT_PACKET_SIZE,
            packet_id: 1,
        }
    }

    /// Create a new TDS codec with a custom maximum packet size.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self
    }

    /// Set the size outgoing messages are split at.
    pub fn set_packet_size(&mut self, size: usize) {
        self.packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
    }

    /// Size outgoing messages are split at.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Get the next packet ID and increment the counter.
    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        id
    }

    /// Reset the packet ID counter.
    pub fn reset_packet_id(&mut self) {
        self.packet_id = 1;
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header to get the length
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;

        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut packet_bytes = src.split_to(length);
        let header = PacketHeader::decode(&mut packet_bytes.as_ref())?;
        let payload = packet_bytes.split_off(PACKET_HEADER_SIZE);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = length,
            is_eom = header.is_end_of_message(),
            "decoded TDS packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();

        if total_length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.max_packet_size,
            });
        }

        dst.reserve(total_length);

        let mut header = item.header;
        header.length = total_length as u16;
        header.packet_id = self.next_packet_id();
        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            packet_id = header.packet_id,
            "encoded TDS packet"
        );

        Ok(())
    }
}

impl Encoder<OutgoingMessage> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let chunk_size = self.packet_size - PACKET_HEADER_SIZE;
        let mut payload = item.payload;
        self.reset_packet_id();

        loop {
            let take = payload.len().min(chunk_size);
            let chunk = payload.split_to(take);
            let status = if payload.is_empty() {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            let header = PacketHeader::new(item.packet_type, status, 0);
            self.encode(Packet::new(header, BytesMut::from(&chunk[..])), dst)?;
            if payload.is_empty() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw_packet(packet_type: PacketType, status: PacketStatus, payload: &[u8]) -> BytesMut {
        let mut data = BytesMut::new();
        data.put_u8(packet_type as u8);
        data.put_u8(status.bits());
        data.put_u16((PACKET_HEADER_SIZE + payload.len()) as u16);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(payload);
        data
    }

    #[test]
    fn test_decode_packet() {
        let mut codec = TdsCodec::new();
        let mut data = raw_packet(
            PacketType::TabularResult,
            PacketStatus::END_OF_MESSAGE,
            b"test",
        );

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::TabularResult);
        assert!(packet.header.is_end_of_message());
        assert_eq!(&packet.payload[..], b"test");
        assert!(data.is_empty());
    }

    #[test]
    fn test_incomplete_packet() {
        let mut codec = TdsCodec::new();
        let full = raw_packet(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, b"test");
        let mut data = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut data).unwrap().is_none());
        data.extend_from_slice(&full[10..]);
        assert!(codec.decode(&mut data).unwrap().is_some());
    }

    #[test]
    fn test_header_too_short() {
        let mut codec = TdsCodec::new();
        let mut data = BytesMut::from(&[0x04u8, 0x01, 0x00, 0x04, 0, 0, 1, 0][..]);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::InvalidHeader)
        ));
    }

    #[test]
    fn test_encode_packet() {
        let mut codec = TdsCodec::new();
        let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 0);
        let packet = Packet::new(header, BytesMut::from(&b"test"[..]));

        let mut dst = BytesMut::new();
        codec.encode(packet, &mut dst).unwrap();

        assert_eq!(dst.len(), 12);
        assert_eq!(dst[0], PacketType::SqlBatch as u8);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 12);
    }

    #[test]
    fn test_message_split_at_packet_size() {
        let mut codec = TdsCodec::new();
        codec.set_packet_size(MIN_PACKET_SIZE);
        let payload = Bytes::from(vec![7u8; 1200]);
        let mut dst = BytesMut::new();
        codec
            .encode(OutgoingMessage::new(PacketType::Normal, payload), &mut dst)
            .unwrap();

        let mut packets = Vec::new();
        while let Some(p) = codec.decode(&mut dst).unwrap() {
            packets.push(p);
        }
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].total_size(), MIN_PACKET_SIZE);
        assert!(!packets[0].is_end_of_message());
        assert!(packets[2].is_end_of_message());
        assert_eq!(packets[1].header.packet_id, 2);
        let total: usize = packets.iter().map(|p| p.payload.len()).sum();
        assert_eq!(total, 1200);
    }

    #[test]
    fn test_empty_message_is_one_packet() {
        let mut codec = TdsCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                OutgoingMessage::new(PacketType::SqlBatch, Bytes::new()),
                &mut dst,
            )
            .unwrap();
        assert_eq!(dst.len(), PACKET_HEADER_SIZE);
        assert_eq!(dst[1], PacketStatus::END_OF_MESSAGE.bits());
    }
}
