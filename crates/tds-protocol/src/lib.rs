//! # tds-protocol
//!
//! Wire structures of the Tabular Data Stream protocol spoken by Sybase
//! Adaptive Server (TDS 5.0) and Microsoft SQL Server (TDS 7.x).
//!
//! Tag bytes and type bytes are interpreted through per-version tables
//! ([`TokenTable`], [`TypeTable`]) so the same tokenizer drives both
//! families.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic;
//! framing and the resumable tokenizer live in `tds-codec`.
//!
//! ## Example
//!
//! ```rust
//! use tds_protocol::{PacketHeader, PacketStatus, PacketType, TokenKind, TokenTable, TdsVersion};
//!
//! let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 100);
//! assert_eq!(header.payload_length(), 92);
//!
//! let table = TokenTable::for_version(TdsVersion::V5_0);
//! assert_eq!(table.lookup(0xEE).map(|e| e.kind), Ok(TokenKind::ColMetaData));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod login5;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod sql_batch;
pub mod tables;
pub mod token;
pub mod types;
pub mod version;

pub use codec::Charset;
pub use error::ProtocolError;
pub use login5::Login5;
pub use login7::Login7;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin};
pub use sql_batch::{encode_language, encode_sql_batch};
pub use tables::{TokenEntry, TokenKind, TokenLength, TokenTable};
pub use token::{
    ColMetaData, ColumnDescriptor, DecodeContext, Done, DoneKind, DoneStatus, EnvChange,
    EnvValue, LoginAck, Message, MessageKind, RawRow, Token,
};
pub use types::{Collation, DataLayout, NumericFormat, TypeClass, TypeInfo, TypeTable};
pub use version::{Family, TdsVersion};
