//! TDS 7.x LOGIN7 packet construction.
//!
//! The packet has a 94-byte fixed header holding offsets and lengths into a
//! variable data section of UTF-16LE strings. Only SQL authentication is
//! supported; the password is obfuscated, not encrypted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{utf16_byte_len, write_utf16_string};
use crate::version::TdsVersion;

/// LOGIN7 packet header size (fixed portion).
pub const LOGIN7_HEADER_SIZE: usize = 94;

/// OptionFlags1: USE_DB and SET_LANG notifications, database change fatal.
const OPTION_FLAGS1: u8 = 0x20 | 0x40 | 0x80;
/// OptionFlags2: language change fatal, ODBC semantics.
const OPTION_FLAGS2: u8 = 0x01 | 0x02;
/// OptionFlags3: accept unknown collations.
const OPTION_FLAGS3: u8 = 0x08;

/// LOGIN7 packet builder.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// TDS version to request.
    pub tds_version: TdsVersion,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client process ID.
    pub client_pid: u32,
    /// Client timezone offset in minutes.
    pub client_timezone: i32,
    /// Client LCID (locale ID).
    pub client_lcid: u32,
    /// Hostname (client machine name).
    pub hostname: String,
    /// Username for SQL authentication.
    pub username: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Language.
    pub language: String,
    /// Initial database.
    pub database: String,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: 4096,
            client_pid: std::process::id(),
            client_timezone: 0,
            client_lcid: 0x0409,
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("rdbms-rs"),
            server_name: String::new(),
            library_name: String::from("rdbms-rs"),
            language: String::new(),
            database: String::new(),
        }
    }
}

impl Login7 {
    /// Create a new Login7 packet builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TDS version.
    #[must_use]
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn with_sql_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the database to connect to.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the hostname (client machine name).
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

    /// Set the packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Encode the LOGIN7 packet to bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Offset/length pairs in header order; the password slot is obfuscated.
        let fields: [(&str, bool); 9] = [
            (&self.hostname, false),
            (&self.username, false),
            (&self.password, true),
            (&self.app_name, false),
            (&self.server_name, false),
            ("", false),
            (&self.library_name, false),
            (&self.language, false),
            (&self.database, false),
        ];

        let mut var_data = BytesMut::new();
        let mut pointers = Vec::with_capacity(fields.len() + 3);
        let mut offset = LOGIN7_HEADER_SIZE as u16;
        for (value, obfuscate) in fields {
            let chars = value.encode_utf16().count() as u16;
            pointers.push((offset, chars));
            if obfuscate {
                write_obfuscated_password(&mut var_data, value);
            } else {
                write_utf16_string(&mut var_data, value);
            }
            offset += utf16_byte_len(value) as u16;
        }

        let total_length = LOGIN7_HEADER_SIZE + var_data.len();
        let mut buf = BytesMut::with_capacity(total_length);
        buf.put_u32_le(total_length as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(0); // client program version
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id
        buf.put_u8(OPTION_FLAGS1);
        buf.put_u8(OPTION_FLAGS2);
        buf.put_u8(0); // type flags
        buf.put_u8(OPTION_FLAGS3);
        buf.put_i32_le(self.client_timezone);
        buf.put_u32_le(self.client_lcid);

        for (field_offset, chars) in &pointers {
            buf.put_u16_le(*field_offset);
            buf.put_u16_le(*chars);
        }
        buf.put_slice(&[0u8; 6]); // client id
        // SSPI, attach db file, change password: all empty
        for _ in 0..3 {
            buf.put_u16_le(offset);
            buf.put_u16_le(0);
        }
        buf.put_u32_le(0); // long SSPI length

        buf.put_slice(&var_data);
        buf.freeze()
    }
}

/// Write password with TDS obfuscation.
///
/// Each byte has its nibbles swapped and is then XORed with 0xA5.
fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for c in password.encode_utf16() {
        for byte in c.to_le_bytes() {
            dst.put_u8(byte.rotate_right(4) ^ 0xA5);
        }
    }
}
