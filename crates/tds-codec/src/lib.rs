//! # tds-codec
//!
//! Blocking framing layer for TDS packet handling and the resumable token
//! tokenizer.
//!
//! ## Architecture
//!
//! ```text
//! Read + Write -> TdsCodec (packet framing) -> PacketStream -> Tokenizer -> Token
//! ```
//!
//! The [`Tokenizer`] implements tokio-util's `Decoder`, so it works on any
//! `BytesMut` the caller keeps appending to. It never re-parses a field it
//! already completed, which makes decoding independent of how the transport
//! chunks the response.
//!
//! ```rust
//! use bytes::BytesMut;
//! use tds_codec::{Tokenizer, TokenizerState};
//! use tds_protocol::{Charset, TdsVersion, Token};
//! use tokio_util::codec::Decoder;
//!
//! let mut tokenizer = Tokenizer::new(TdsVersion::V5_0, Charset::Utf8);
//! // DONE, status COUNT, 3 rows, split mid-body
//! let mut buf = BytesMut::from(&[0xFD, 0x10, 0x00, 0x00][..]);
//! assert!(tokenizer.decode(&mut buf).unwrap().is_none());
//! assert_eq!(tokenizer.state(), TokenizerState::ReadTokenBody);
//!
//! buf.extend_from_slice(&[0x00, 0x00, 0x03, 0x00, 0x00, 0x00]);
//! let token = tokenizer.decode(&mut buf).unwrap();
//! assert!(matches!(token, Some(Token::Done(done)) if done.count() == Some(3)));
//! assert!(tokenizer.is_finished());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod framed;
pub mod packet_codec;
pub mod tokenizer;

pub use error::CodecError;
pub use framed::PacketStream;
pub use packet_codec::{OutgoingMessage, Packet, TdsCodec};
pub use tokenizer::{Tokenizer, TokenizerState};
