//! Framed packet stream over a blocking transport.
//!
//! [`PacketStream`] owns the transport and the read/write buffers. Requests
//! are split into packets by [`TdsCodec`]; responses are read one packet at
//! a time and either concatenated into a whole payload (PRELOGIN) or fed
//! straight into a [`Tokenizer`], so tokens are produced while later packets
//! are still in flight.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};
use tds_protocol::error::ProtocolError;
use tds_protocol::packet::PacketType;
use tds_protocol::token::Token;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::packet_codec::{OutgoingMessage, Packet, TdsCodec};
use crate::tokenizer::Tokenizer;

const READ_CHUNK: usize = 8192;

/// A packet stream over a blocking I/O transport.
pub struct PacketStream<T> {
    transport: T,
    codec: TdsCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Payload bytes of the current response not yet consumed as tokens.
    residue: BytesMut,
    /// Whether the last packet of the current response has been read.
    response_complete: bool,
}

impl<T> PacketStream<T>
where
    T: Read + Write,
{
    /// Create a new packet stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, TdsCodec::new())
    }

    /// Create a new packet stream with a custom codec.
    pub fn with_codec(transport: T, codec: TdsCodec) -> Self {
        Self {
            transport,
            codec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            residue: BytesMut::new(),
            response_complete: false,
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &TdsCodec {
        &self.codec
    }

    /// Consume the stream and return the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Apply a packet size negotiated with the server.
    pub fn set_packet_size(&mut self, size: usize) {
        tracing::debug!(packet_size = size, "packet size changed");
        self.codec.set_packet_size(size);
    }

    /// Send a complete request, split into packets.
    ///
    /// Starts a new response: any unread bytes of the previous one are
    /// dropped.
    pub fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<(), CodecError> {
        self.residue.clear();
        self.response_complete = false;

        let len = payload.len();
        self.codec
            .encode(OutgoingMessage::new(packet_type, payload), &mut self.write_buf)?;
        let result = self
            .transport
            .write_all(&self.write_buf)
            .and_then(|()| self.transport.flush());
        self.write_buf.clear();
        result?;

        tracing::trace!(packet_type = ?packet_type, length = len, "sent message");
        Ok(())
    }

    /// Read the next packet, blocking until it is complete.
    pub fn read_packet(&mut self) -> Result<Packet, CodecError> {
        loop {
            if let Some(packet) = self.codec.decode(&mut self.read_buf)? {
                return Ok(packet);
            }
            self.fill()?;
        }
    }

    /// Read packets until one carries `END_OF_MESSAGE` and return their
    /// joined payload.
    pub fn read_message(&mut self) -> Result<Bytes, CodecError> {
        let mut payload = BytesMut::new();
        let mut packets = 0usize;
        loop {
            let packet = self.read_packet()?;
            packets += 1;
            payload.extend_from_slice(&packet.payload);
            if packet.is_end_of_message() {
                self.response_complete = true;
                tracing::trace!(packets, length = payload.len(), "read message");
                return Ok(payload.freeze());
            }
        }
    }

    /// Read the next token of the current response.
    ///
    /// Packets are pulled only when the tokenizer needs more bytes. A
    /// response that ends inside a token is a protocol error.
    pub fn read_token(&mut self, tokenizer: &mut Tokenizer) -> Result<Token, CodecError> {
        loop {
            if let Some(token) = tokenizer.decode(&mut self.residue)? {
                return Ok(token);
            }
            if self.response_complete {
                return Err(ProtocolError::UnexpectedEof.into());
            }
            let packet = self.read_packet()?;
            self.response_complete = packet.is_end_of_message();
            self.residue.extend_from_slice(&packet.payload);
        }
    }

    fn fill(&mut self) -> Result<(), CodecError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => return Err(CodecError::ConnectionClosed),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<T> std::fmt::Debug for PacketStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("transport", &self.transport)
            .field("packet_size", &self.codec.packet_size())
            .field("buffered", &self.read_buf.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tds_protocol::codec::Charset;
    use tds_protocol::packet::{MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketStatus};
    use tds_protocol::token::{Done, DoneKind, DoneStatus};
    use tds_protocol::version::TdsVersion;

    /// In-memory transport returning at most `max_read` bytes per read.
    #[derive(Debug, Default)]
    struct Pipe {
        input: Vec<u8>,
        pos: usize,
        max_read: usize,
        written: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf
                .len()
                .min(self.max_read)
                .min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn packets(payload: &[u8], per_packet: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let chunks: Vec<&[u8]> = payload.chunks(per_packet).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let status = if i + 1 == chunks.len() {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            out.push(PacketType::TabularResult as u8);
            out.push(status.bits());
            out.extend_from_slice(&((PACKET_HEADER_SIZE + chunk.len()) as u16).to_be_bytes());
            out.extend_from_slice(&[0, 0, (i + 1) as u8, 0]);
            out.extend_from_slice(chunk);
        }
        out
    }

    fn done_stream(count: usize) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for i in 0..count {
            let status = if i + 1 == count {
                DoneStatus::COUNT
            } else {
                DoneStatus::COUNT | DoneStatus::MORE
            };
            buf.put_u8(0xFD);
            Done {
                kind: DoneKind::Done,
                status,
                cur_cmd: 0,
                row_count: i as u64,
            }
            .encode(&mut buf, TdsVersion::V7_4);
        }
        buf.to_vec()
    }

    #[test]
    fn test_send_message_splits_packets() {
        let mut stream = PacketStream::new(Pipe::default());
        stream.set_packet_size(MIN_PACKET_SIZE);
        stream
            .send_message(PacketType::SqlBatch, Bytes::from(vec![1u8; 600]))
            .unwrap();

        let written = &stream.get_ref().written;
        assert_eq!(written.len(), 600 + 2 * PACKET_HEADER_SIZE);
        assert_eq!(written[1], PacketStatus::NORMAL.bits());
        assert_eq!(written[MIN_PACKET_SIZE + 1], PacketStatus::END_OF_MESSAGE.bits());
    }

    #[test]
    fn test_read_message_across_small_reads() {
        let pipe = Pipe {
            input: packets(b"hello world", 4),
            max_read: 3,
            ..Pipe::default()
        };
        let mut stream = PacketStream::new(pipe);
        let payload = stream.read_message().unwrap();
        assert_eq!(&payload[..], b"hello world");
    }

    #[test]
    fn test_tokens_span_packet_boundaries() {
        let payload = done_stream(3);
        let pipe = Pipe {
            input: packets(&payload, 5),
            max_read: 7,
            ..Pipe::default()
        };
        let mut stream = PacketStream::new(pipe);
        let mut tokenizer = Tokenizer::new(TdsVersion::V7_4, Charset::Utf8);

        let mut rows = Vec::new();
        loop {
            let token = stream.read_token(&mut tokenizer).unwrap();
            let Token::Done(done) = &token else {
                unreachable!("only DONE tokens were sent");
            };
            rows.push(done.row_count);
            if token.is_final() {
                break;
            }
        }
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_truncated_response_is_protocol_error() {
        let payload = done_stream(1);
        let pipe = Pipe {
            input: packets(&payload[..6], 64),
            max_read: 64,
            ..Pipe::default()
        };
        let mut stream = PacketStream::new(pipe);
        let mut tokenizer = Tokenizer::new(TdsVersion::V7_4, Charset::Utf8);
        let err = stream.read_token(&mut tokenizer).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_closed_transport() {
        let mut stream = PacketStream::new(Pipe {
            max_read: 16,
            ..Pipe::default()
        });
        assert!(matches!(
            stream.read_packet(),
            Err(CodecError::ConnectionClosed)
        ));
    }
}
