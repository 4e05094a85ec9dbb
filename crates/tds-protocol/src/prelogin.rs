//! TDS 7.x pre-login packet handling.
//!
//! The pre-login packet is the first message of a SQL Server connection.
//! This crate only negotiates plaintext sessions, so the client always
//! announces `NotSupported` for encryption and rejects servers that insist
//! on it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Pre-login option types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PreLoginOption {
    /// Version information.
    Version = 0x00,
    /// Encryption negotiation.
    Encryption = 0x01,
    /// Instance name (for named instances).
    Instance = 0x02,
    /// Thread ID.
    ThreadId = 0x03,
    /// MARS support.
    Mars = 0x04,
    /// Terminator (end of options).
    Terminator = 0xFF,
}

/// Encryption level for connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encrypt the login only.
    Off = 0x00,
    /// Encryption is on.
    On = 0x01,
    /// Encryption is not supported.
    #[default]
    NotSupported = 0x02,
    /// Encryption is required.
    Required = 0x03,
}

impl EncryptionLevel {
    /// Create from raw byte value.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Off,
            0x01 => Self::On,
            0x03 => Self::Required,
            _ => Self::NotSupported,
        }
    }

    /// Check if the peer insists on TLS.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self, Self::On | Self::Required)
    }
}

/// Pre-login message builder and parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreLogin {
    /// Client driver version (request) or server product version (response).
    pub version: u32,
    /// Sub-build number.
    pub sub_build: u16,
    /// Encryption level.
    pub encryption: EncryptionLevel,
    /// Instance name (for named instances).
    pub instance: Option<String>,
    /// Client thread ID.
    pub thread_id: Option<u32>,
    /// MARS enabled.
    pub mars: bool,
}

impl PreLogin {
    /// Create a pre-login request for a plaintext session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Set the client thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Encode the pre-login message to bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut options: Vec<(PreLoginOption, Vec<u8>)> = Vec::with_capacity(5);

        let mut version = Vec::with_capacity(6);
        version.extend_from_slice(&self.version.to_be_bytes());
        version.extend_from_slice(&self.sub_build.to_le_bytes());
        options.push((PreLoginOption::Version, version));
        options.push((PreLoginOption::Encryption, vec![self.encryption as u8]));
        if let Some(ref instance) = self.instance {
            let mut data = instance.as_bytes().to_vec();
            data.push(0);
            options.push((PreLoginOption::Instance, data));
        }
        if let Some(thread_id) = self.thread_id {
            options.push((PreLoginOption::ThreadId, thread_id.to_be_bytes().to_vec()));
        }
        options.push((PreLoginOption::Mars, vec![u8::from(self.mars)]));

        let header_size = options.len() * 5 + 1;
        let mut buf = BytesMut::with_capacity(header_size + 32);
        let mut data_offset = header_size as u16;
        for (option, data) in &options {
            buf.put_u8(*option as u8);
            buf.put_u16(data_offset);
            buf.put_u16(data.len() as u16);
            data_offset += data.len() as u16;
        }
        buf.put_u8(PreLoginOption::Terminator as u8);
        for (_, data) in &options {
            buf.put_slice(data);
        }
        buf.freeze()
    }

    /// Decode a pre-login response from the server.
    ///
    /// Offsets in the option headers are absolute from the start of the
    /// payload. Unknown options are skipped.
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        let mut options = Vec::new();
        loop {
            if src.remaining() < 1 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let option_type = src.get_u8();
            if option_type == PreLoginOption::Terminator as u8 {
                break;
            }
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let offset = src.get_u16() as usize;
            let length = src.get_u16() as usize;
            options.push((option_type, offset, length));
        }

        let header_size = options.len() * 5 + 1;
        let data = src.copy_to_bytes(src.remaining());
        let mut prelogin = Self::default();

        for (option, offset, length) in options {
            let Some(start) = offset.checked_sub(header_size) else {
                return Err(ProtocolError::InvalidField {
                    field: "prelogin offset",
                    value: offset as u32,
                });
            };
            let Some(value) = data.get(start..start + length) else {
                return Err(ProtocolError::UnexpectedEof);
            };
            match option {
                0x00 if length >= 4 => {
                    prelogin.version = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                    if length >= 6 {
                        prelogin.sub_build = u16::from_le_bytes([value[4], value[5]]);
                    }
                }
                0x01 if length >= 1 => prelogin.encryption = EncryptionLevel::from_u8(value[0]),
                0x02 => {
                    let name = value.split(|&b| b == 0).next().unwrap_or_default();
                    if !name.is_empty() {
                        prelogin.instance = Some(String::from_utf8_lossy(name).into_owned());
                    }
                }
                0x03 if length >= 4 => {
                    prelogin.thread_id =
                        Some(u32::from_be_bytes([value[0], value[1], value[2], value[3]]));
                }
                0x04 if length >= 1 => prelogin.mars = value[0] != 0,
                _ => {}
            }
        }

        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prelogin_roundtrip() {
        let request = PreLogin {
            version: 0x0100_0000,
            sub_build: 7,
            ..PreLogin::new().with_instance("SQLEXPRESS").with_thread_id(42)
        };
        let decoded = PreLogin::decode(request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_default_is_plaintext() {
        let prelogin = PreLogin::new();
        assert_eq!(prelogin.encryption, EncryptionLevel::NotSupported);
        assert!(!prelogin.encryption.is_required());
        assert!(EncryptionLevel::Required.is_required());
    }

    #[test]
    fn test_bad_offset() {
        let raw = [0x01u8, 0x00, 0x01, 0x00, 0x01, 0xFF, 0x02];
        assert!(matches!(
            PreLogin::decode(&raw[..]),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_truncated_option_data() {
        let raw = [0x01u8, 0x00, 0x06, 0x00, 0x04, 0xFF, 0x02];
        assert_eq!(PreLogin::decode(&raw[..]), Err(ProtocolError::UnexpectedEof));
    }
}
