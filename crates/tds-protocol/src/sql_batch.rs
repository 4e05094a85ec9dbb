//! SQL text request encoding.
//!
//! TDS 7.x sends SQL text as a SQL batch message (packet type 0x01):
//! an ALL_HEADERS section (7.2+) followed by UTF-16LE text. TDS 5.0 sends a
//! LANGUAGE token inside a [`crate::PacketType::Normal`] message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{Charset, write_utf16_string};
use crate::version::TdsVersion;

/// TDS 5.0 LANGUAGE token tag.
pub const LANGUAGE_TOKEN: u8 = 0x21;

/// Encode a SQL batch request with auto-commit (no explicit transaction).
///
/// The ALL_HEADERS section is emitted only for versions that require it.
///
/// # Example
///
/// ```
/// use tds_protocol::{TdsVersion, sql_batch::encode_sql_batch};
///
/// let payload = encode_sql_batch("select 1", TdsVersion::V7_4);
/// assert_eq!(payload.len(), 22 + 16);
/// ```
#[must_use]
pub fn encode_sql_batch(sql: &str, version: TdsVersion) -> Bytes {
    encode_sql_batch_with_transaction(sql, version, 0)
}

/// Encode a SQL batch request with a transaction descriptor.
///
/// `transaction_descriptor` is the value from the BeginTransaction
/// ENVCHANGE, or 0 in auto-commit mode.
#[must_use]
pub fn encode_sql_batch_with_transaction(
    sql: &str,
    version: TdsVersion,
    transaction_descriptor: u64,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(22 + sql.len() * 2);

    if version.requires_all_headers() {
        buf.put_u32_le(22); // ALL_HEADERS total length
        buf.put_u32_le(18); // transaction descriptor header length
        buf.put_u16_le(0x0002);
        buf.put_u64_le(transaction_descriptor);
        buf.put_u32_le(1); // outstanding request count
    }

    write_utf16_string(&mut buf, sql);
    buf.freeze()
}

/// Encode a TDS 5.0 LANGUAGE token carrying SQL text.
///
/// Layout: tag, 4-byte length (status byte + text), status 0, text in the
/// client character set.
#[must_use]
pub fn encode_language(sql: &str, charset: Charset) -> Bytes {
    let text = charset.encode(sql);
    let mut buf = BytesMut::with_capacity(text.len() + 6);
    buf.put_u8(LANGUAGE_TOKEN);
    buf.put_u32_le(text.len() as u32 + 1);
    buf.put_u8(0);
    buf.put_slice(&text);
    buf.freeze()
}
