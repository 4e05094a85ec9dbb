//! TDS 5.0 (Sybase) login record.
//!
//! The login record is a fixed layout of space-padded name fields, each
//! followed by its length byte, then a CAPABILITY token. It is sent in a
//! single [`crate::PacketType::Login`] message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{Charset, write_padded};
use crate::error::ProtocolError;

/// Width of most name fields in the login record.
const NAME_WIDTH: usize = 30;

/// CAPABILITY token tag.
pub const CAPABILITY_TOKEN: u8 = 0xE2;

/// Byte orders and formats: int2 LSB, int4 LSB, ASCII, IEEE LSB float,
/// LSB datetime, notify on USE db.
const FORMAT_FLAGS: [u8; 6] = [0x03, 0x01, 0x06, 0x0A, 0x09, 0x01];

/// Requested capabilities (language, ROWFMT, ORDERBY, datatype support).
const REQUEST_CAPS: [u8; 14] = [
    0x01, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x6A, 0xAB, 0xCB, 0xEF, 0xFF,
];

/// Response capabilities (no data conversion by the server).
const RESPONSE_CAPS: [u8; 14] = [
    0x02, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// TDS 5.0 login record builder.
#[derive(Debug, Clone)]
pub struct Login5 {
    /// Client host name.
    pub hostname: String,
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Client process id.
    pub host_process: String,
    /// Application name.
    pub app_name: String,
    /// Server name.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Language.
    pub language: String,
    /// Client character set.
    pub charset: Charset,
    /// Requested packet size.
    pub packet_size: u16,
}

impl Default for Login5 {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            host_process: std::process::id().to_string(),
            app_name: String::from("rdbms-rs"),
            server_name: String::new(),
            library_name: String::from("rdbms-rs"),
            language: String::new(),
            charset: Charset::Utf8,
            packet_size: 512,
        }
    }
}

impl Login5 {
    /// Create a login record with default client settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the client host name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Set the client character set.
    #[must_use]
    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u16) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Encode the login record followed by the CAPABILITY token.
    ///
    /// Fails when the user name or password does not fit its 30-byte field
    /// in the session character set. Other name fields are cut to fit.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(600);
        let text = |s: &str| self.charset.encode(s).into_owned();

        let username = text(&self.username);
        let password = text(&self.password);
        for (field, value) in [("username", &username), ("password", &password)] {
            if value.len() > NAME_WIDTH {
                return Err(ProtocolError::InvalidField {
                    field,
                    value: value.len() as u32,
                });
            }
        }

        write_padded(&mut buf, &text(&self.hostname), NAME_WIDTH);
        write_padded(&mut buf, &username, NAME_WIDTH);
        write_padded(&mut buf, &password, NAME_WIDTH);
        write_padded(&mut buf, self.host_process.as_bytes(), NAME_WIDTH);
        buf.put_slice(&FORMAT_FLAGS);
        buf.put_u8(0); // bulk copy
        buf.put_bytes(0, 2 + 4 + 3); // reserved
        write_padded(&mut buf, &text(&self.app_name), NAME_WIDTH);
        write_padded(&mut buf, &text(&self.server_name), NAME_WIDTH);

        // remote password: server name length 0, then the password
        let mut remote = Vec::with_capacity(password.len() + 2);
        remote.push(0);
        remote.push(password.len().min(253) as u8);
        remote.extend_from_slice(&password[..password.len().min(253)]);
        buf.put_slice(&remote);
        buf.put_bytes(0, 255 - remote.len());
        buf.put_u8(remote.len() as u8);

        buf.put_slice(&[5, 0, 0, 0]); // protocol version
        write_padded(&mut buf, &text(&self.library_name), 10);
        buf.put_slice(&[5, 0, 0, 0]); // program version
        buf.put_slice(&[0, 0x0D, 0x11]); // no short conversion, float4, date4
        write_padded(&mut buf, &text(&self.language), NAME_WIDTH);
        buf.put_u8(1); // notify on language change
        buf.put_bytes(0, 2 + 1 + 10); // security options
        write_padded(&mut buf, self.charset.server_name().as_bytes(), NAME_WIDTH);
        buf.put_u8(1); // notify on charset change
        write_padded(&mut buf, self.packet_size.to_string().as_bytes(), 6);
        buf.put_bytes(0, 4);

        buf.put_u8(CAPABILITY_TOKEN);
        buf.put_u16_le((REQUEST_CAPS.len() + RESPONSE_CAPS.len()) as u16);
        buf.put_slice(&REQUEST_CAPS);
        buf.put_slice(&RESPONSE_CAPS);

        Ok(buf.freeze())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_name_fields() {
        let encoded = Login5::new()
            .with_hostname("client")
            .with_credentials("sa", "secret")
            .encode()
            .unwrap();
        assert_eq!(&encoded[..6], b"client");
        assert_eq!(encoded[30], 6);
        assert_eq!(&encoded[31..33], b"sa");
        assert_eq!(encoded[61], 2);
        assert_eq!(&encoded[62..68], b"secret");
        assert_eq!(encoded[92], 6);
        assert_eq!(&encoded[124..130], &FORMAT_FLAGS);
    }

    #[test]
    fn test_capability_trailer() {
        let encoded = Login5::new().encode().unwrap();
        let caps_at = encoded.len() - 3 - REQUEST_CAPS.len() - RESPONSE_CAPS.len();
        assert_eq!(encoded[caps_at], CAPABILITY_TOKEN);
        assert_eq!(
            u16::from_le_bytes([encoded[caps_at + 1], encoded[caps_at + 2]]),
            28
        );
    }

    #[test]
    fn test_charset_name_written() {
        let encoded = Login5::new()
            .with_charset(Charset::Iso88591)
            .encode()
            .unwrap();
        let needle = b"iso_1";
        assert!(encoded.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_overlong_credentials_are_rejected() {
        let long = "p".repeat(31);
        let err = Login5::new()
            .with_credentials("sa", long.as_str())
            .encode()
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidField {
                field: "password",
                value: 31
            }
        );

        let err = Login5::new()
            .with_credentials("u".repeat(40), "pw")
            .encode()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "username", value: 40 }));

        // exactly the field width still fits
        let encoded = Login5::new()
            .with_credentials("sa", "p".repeat(30))
            .encode()
            .unwrap();
        assert_eq!(encoded[92], 30);

        // long host names are cut, not rejected
        assert!(Login5::new().with_hostname("h".repeat(64)).encode().is_ok());
    }
}
