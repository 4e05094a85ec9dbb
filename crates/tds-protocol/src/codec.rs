//! Codec utilities for TDS protocol encoding and decoding.
//!
//! TDS 7.x strings are UTF-16LE with a character-count prefix. TDS 5.0
//! strings are single-byte (or UTF-8) in the client character set with a
//! byte-count prefix. All readers return [`ProtocolError::UnexpectedEof`]
//! when the buffer runs short, which callers use to wait for more input.

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Fail with `UnexpectedEof` unless `n` bytes remain.
#[inline]
pub fn ensure(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        Err(ProtocolError::UnexpectedEof)
    } else {
        Ok(())
    }
}

/// Read a length-prefixed UTF-16LE string.
///
/// The format is: 1-byte length (in characters) followed by UTF-16LE bytes.
pub fn read_b_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(src, 1)?;
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a length-prefixed UTF-16LE string with 2-byte length.
pub fn read_us_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(src, 2)?;
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read a UTF-16LE string of specified character length.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Result<String, ProtocolError> {
    ensure(src, char_count * 2)?;
    let mut chars = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        chars.push(src.get_u16_le());
    }
    String::from_utf16(&chars).map_err(|e| ProtocolError::StringEncoding(e.to_string()))
}

/// Read a 1-byte length-prefixed byte string.
pub fn read_b_varbyte(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    ensure(src, 1)?;
    let len = src.get_u8() as usize;
    ensure(src, len)?;
    Ok(src.copy_to_bytes(len))
}

/// Read a 1-byte length-prefixed string in a single-byte character set.
pub fn read_b_charstring(src: &mut impl Buf, charset: Charset) -> Result<String, ProtocolError> {
    let raw = read_b_varbyte(src)?;
    Ok(charset.decode(&raw).into_owned())
}

/// Read a 2-byte length-prefixed string in a single-byte character set.
pub fn read_us_charstring(src: &mut impl Buf, charset: Charset) -> Result<String, ProtocolError> {
    ensure(src, 2)?;
    let len = src.get_u16_le() as usize;
    ensure(src, len)?;
    let raw = src.copy_to_bytes(len);
    Ok(charset.decode(&raw).into_owned())
}

/// Write a length-prefixed UTF-16LE string (1-byte length).
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = chars.len().min(255) as u8;
    dst.put_u8(len);
    for &c in &chars[..len as usize] {
        dst.put_u16_le(c);
    }
}

/// Write a length-prefixed UTF-16LE string (2-byte length).
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = chars.len().min(65535) as u16;
    dst.put_u16_le(len);
    for &c in &chars[..len as usize] {
        dst.put_u16_le(c);
    }
}

/// Write a UTF-16LE string without length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for c in s.encode_utf16() {
        dst.put_u16_le(c);
    }
}

/// Write a fixed-width, zero-padded field followed by its length byte.
///
/// TDS 5.0 login records use this layout for every name field.
pub fn write_padded(dst: &mut impl BufMut, value: &[u8], width: usize) {
    let len = value.len().min(width);
    dst.put_slice(&value[..len]);
    dst.put_bytes(0, width - len);
    dst.put_u8(len as u8);
}

/// Calculate the byte length of a UTF-16 encoded string.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

/// Client character set for single-byte TDS 5.0 and VARCHAR data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// UTF-8.
    #[default]
    Utf8,
    /// ISO 8859-1 (`iso_1`).
    Iso88591,
    /// Windows code page 1252.
    Windows1252,
    /// Any other encoding known to `encoding_rs`.
    #[cfg(feature = "encoding")]
    Other(&'static encoding_rs::Encoding),
}

impl Charset {
    /// Resolve a Sybase or WHATWG charset name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Some(Self::Utf8),
            "iso_1" | "iso-8859-1" | "latin1" => Some(Self::Iso88591),
            "cp1252" | "windows-1252" => Some(Self::Windows1252),
            #[cfg(feature = "encoding")]
            other => encoding_rs::Encoding::for_label(other.as_bytes()).map(Self::Other),
            #[cfg(not(feature = "encoding"))]
            _ => None,
        }
    }

    /// Name sent to the server in the login record.
    #[must_use]
    pub fn server_name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Iso88591 => "iso_1",
            Self::Windows1252 => "cp1252",
            #[cfg(feature = "encoding")]
            Self::Other(enc) => enc.name(),
        }
    }

    /// Decode bytes received from the server.
    #[must_use]
    pub fn decode<'a>(&self, raw: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(raw),
            Self::Iso88591 => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
            #[cfg(feature = "encoding")]
            Self::Windows1252 => encoding_rs::WINDOWS_1252.decode_without_bom_handling(raw).0,
            #[cfg(not(feature = "encoding"))]
            Self::Windows1252 => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
            #[cfg(feature = "encoding")]
            Self::Other(enc) => enc.decode_without_bom_handling(raw).0,
        }
    }

    /// Encode text for the server.
    ///
    /// Characters not representable in the target set are replaced.
    #[must_use]
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            Self::Utf8 => Cow::Borrowed(text.as_bytes()),
            Self::Iso88591 => Cow::Owned(
                text.chars()
                    .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                    .collect(),
            ),
            #[cfg(feature = "encoding")]
            Self::Windows1252 => encoding_rs::WINDOWS_1252.encode(text).0,
            #[cfg(not(feature = "encoding"))]
            Self::Windows1252 => Self::Iso88591.encode(text),
            #[cfg(feature = "encoding")]
            Self::Other(enc) => enc.encode(text).0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_b_varchar_roundtrip() {
        let original = "Hello, 世界!";
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, original);

        let mut cursor = buf.freeze();
        let decoded = read_b_varchar(&mut cursor).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_us_varchar_short_buffer() {
        let mut buf = BytesMut::new();
        write_us_varchar(&mut buf, "abcdef");
        let mut truncated = &buf[..5];
        assert_eq!(
            read_us_varchar(&mut truncated),
            Err(ProtocolError::UnexpectedEof)
        );
    }

    #[test]
    fn test_charstring_latin1() {
        let raw = [3u8, b'n', 0xE4, b'h'];
        let mut cursor = &raw[..];
        let s = read_b_charstring(&mut cursor, Charset::Iso88591).unwrap();
        assert_eq!(s, "näh");
    }

    #[test]
    fn test_write_padded() {
        let mut buf = BytesMut::new();
        write_padded(&mut buf, b"sa", 30);
        assert_eq!(buf.len(), 31);
        assert_eq!(&buf[..2], b"sa");
        assert_eq!(buf[30], 2);
    }

    #[test]
    fn test_charset_names() {
        assert_eq!(Charset::from_name("iso_1"), Some(Charset::Iso88591));
        assert_eq!(Charset::from_name("UTF8"), Some(Charset::Utf8));
        assert_eq!(Charset::Windows1252.server_name(), "cp1252");
        assert_eq!(Charset::Iso88591.encode("ä€").as_ref(), &[0xE4, b'?']);
    }
}
