//! Token tag tables.
//!
//! Tag bytes and body framing differ between TDS 5.0 and TDS 7.x (0xEE is
//! ROWFMT in one and FEDAUTHINFO in the other, DONE bodies differ in width).
//! The tokenizer resolves every tag through a [`TokenTable`] and never
//! matches on raw tag values.

use crate::error::ProtocolError;
use crate::version::{Family, TdsVersion};

/// Semantic kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TokenKind {
    /// Column metadata (TDS 7.x COLMETADATA, TDS 5.0 ROWFMT).
    ColMetaData,
    /// Data row.
    Row,
    /// Data row with a null bitmap (TDS 7.3+).
    NbcRow,
    /// Server error message.
    Error,
    /// Server informational message.
    Info,
    /// Extended error data (TDS 5.0).
    Eed,
    /// Login acknowledgement.
    LoginAck,
    /// Environment change notification.
    EnvChange,
    /// End of a statement.
    Done,
    /// End of a stored procedure.
    DoneProc,
    /// End of a statement inside a stored procedure.
    DoneInProc,
    /// Stored procedure return status.
    ReturnStatus,
    /// ORDER BY column list.
    Order,
    /// Capability negotiation (TDS 5.0).
    Capability,
    /// Column format control (TDS 5.0).
    Control,
    /// Tokens whose body is read and discarded.
    Ignored,
}

/// How the body length of a token is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenLength {
    /// Fixed number of body bytes.
    Fixed(usize),
    /// DONE-family body whose width depends on the protocol version.
    Done,
    /// 2-byte little-endian length prefix.
    UShort,
    /// 4-byte little-endian length prefix.
    ULong,
    /// Column metadata: self-describing, no length prefix (TDS 7.x).
    ColumnCount,
    /// Row data: framed by the current column metadata.
    Columns,
}

/// One row of a token table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEntry {
    /// Tag byte.
    pub tag: u8,
    /// Protocol name of the token.
    pub name: &'static str,
    /// Semantic kind.
    pub kind: TokenKind,
    /// Body framing.
    pub length: TokenLength,
}

const fn token(tag: u8, name: &'static str, kind: TokenKind, length: TokenLength) -> TokenEntry {
    TokenEntry {
        tag,
        name,
        kind,
        length,
    }
}

/// TDS 5.0 token table.
pub static TDS5_TOKENS: &[TokenEntry] = &[
    token(0xEE, "ROWFMT", TokenKind::ColMetaData, TokenLength::UShort),
    token(0xD1, "ROW", TokenKind::Row, TokenLength::Columns),
    token(0xAA, "ERROR", TokenKind::Error, TokenLength::UShort),
    token(0xAB, "INFO", TokenKind::Info, TokenLength::UShort),
    token(0xE5, "EED", TokenKind::Eed, TokenLength::UShort),
    token(0xAD, "LOGINACK", TokenKind::LoginAck, TokenLength::UShort),
    token(0xE3, "ENVCHANGE", TokenKind::EnvChange, TokenLength::UShort),
    token(0xFD, "DONE", TokenKind::Done, TokenLength::Done),
    token(0xFE, "DONEPROC", TokenKind::DoneProc, TokenLength::Done),
    token(0xFF, "DONEINPROC", TokenKind::DoneInProc, TokenLength::Done),
    token(0x79, "RETURNSTATUS", TokenKind::ReturnStatus, TokenLength::Fixed(4)),
    token(0xA9, "ORDERBY", TokenKind::Order, TokenLength::UShort),
    token(0xE2, "CAPABILITY", TokenKind::Capability, TokenLength::UShort),
    token(0xAE, "CONTROL", TokenKind::Control, TokenLength::UShort),
    token(0xA5, "COLINFO", TokenKind::Ignored, TokenLength::UShort),
    token(0xA4, "TABNAME", TokenKind::Ignored, TokenLength::UShort),
    token(0x20, "PARAMFMT", TokenKind::Ignored, TokenLength::UShort),
    token(0x61, "ROWFMT2", TokenKind::Ignored, TokenLength::ULong),
    token(0x62, "DYNAMIC2", TokenKind::Ignored, TokenLength::ULong),
    token(0xE7, "DYNAMIC", TokenKind::Ignored, TokenLength::UShort),
    token(0x71, "LOGOUT", TokenKind::Ignored, TokenLength::Fixed(1)),
];

/// TDS 7.x token table.
pub static TDS7_TOKENS: &[TokenEntry] = &[
    token(0x81, "COLMETADATA", TokenKind::ColMetaData, TokenLength::ColumnCount),
    token(0xD1, "ROW", TokenKind::Row, TokenLength::Columns),
    token(0xD2, "NBCROW", TokenKind::NbcRow, TokenLength::Columns),
    token(0xAA, "ERROR", TokenKind::Error, TokenLength::UShort),
    token(0xAB, "INFO", TokenKind::Info, TokenLength::UShort),
    token(0xAD, "LOGINACK", TokenKind::LoginAck, TokenLength::UShort),
    token(0xE3, "ENVCHANGE", TokenKind::EnvChange, TokenLength::UShort),
    token(0xFD, "DONE", TokenKind::Done, TokenLength::Done),
    token(0xFE, "DONEPROC", TokenKind::DoneProc, TokenLength::Done),
    token(0xFF, "DONEINPROC", TokenKind::DoneInProc, TokenLength::Done),
    token(0x79, "RETURNSTATUS", TokenKind::ReturnStatus, TokenLength::Fixed(4)),
    token(0xA9, "ORDER", TokenKind::Order, TokenLength::UShort),
    token(0xA5, "COLINFO", TokenKind::Ignored, TokenLength::UShort),
    token(0xA4, "TABNAME", TokenKind::Ignored, TokenLength::UShort),
    token(0xED, "SSPI", TokenKind::Ignored, TokenLength::UShort),
    token(0xE4, "SESSIONSTATE", TokenKind::Ignored, TokenLength::ULong),
    token(0xEE, "FEDAUTHINFO", TokenKind::Ignored, TokenLength::ULong),
];

/// Token tag lookup for one protocol version.
#[derive(Debug, Clone, Copy)]
pub struct TokenTable {
    version: TdsVersion,
    entries: &'static [TokenEntry],
}

impl TokenTable {
    /// Table for the given protocol version.
    #[must_use]
    pub fn for_version(version: TdsVersion) -> Self {
        let entries = match version.family() {
            Family::Sybase => TDS5_TOKENS,
            Family::Mssql => TDS7_TOKENS,
        };
        Self { version, entries }
    }

    /// Version this table was built for.
    #[must_use]
    pub fn version(&self) -> TdsVersion {
        self.version
    }

    /// Resolve a tag byte.
    pub fn lookup(&self, tag: u8) -> Result<&'static TokenEntry, ProtocolError> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .ok_or(ProtocolError::InvalidTokenType {
                tag,
                version: self.version,
            })
    }

    /// Body width of a fixed-size token, resolving version-dependent sizes.
    #[must_use]
    pub fn fixed_length(&self, entry: &TokenEntry) -> Option<usize> {
        match entry.length {
            TokenLength::Fixed(n) => Some(n),
            TokenLength::Done if self.version.has_wide_row_count() => Some(12),
            TokenLength::Done => Some(8),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_meaning_depends_on_version() {
        let v5 = TokenTable::for_version(TdsVersion::V5_0);
        let v7 = TokenTable::for_version(TdsVersion::V7_4);
        assert_eq!(v5.lookup(0xEE).unwrap().kind, TokenKind::ColMetaData);
        assert_eq!(v7.lookup(0xEE).unwrap().kind, TokenKind::Ignored);
        assert_eq!(v7.lookup(0x81).unwrap().kind, TokenKind::ColMetaData);
        assert!(v5.lookup(0x81).is_err());
    }

    #[test]
    fn test_done_width() {
        let v5 = TokenTable::for_version(TdsVersion::V5_0);
        let v71 = TokenTable::for_version(TdsVersion::V7_1);
        let v74 = TokenTable::for_version(TdsVersion::V7_4);
        let done = v74.lookup(0xFD).unwrap();
        assert_eq!(v5.fixed_length(done), Some(8));
        assert_eq!(v71.fixed_length(done), Some(8));
        assert_eq!(v74.fixed_length(done), Some(12));
    }

    #[test]
    fn test_unknown_tag() {
        let v7 = TokenTable::for_version(TdsVersion::V7_4);
        assert_eq!(
            v7.lookup(0x05),
            Err(ProtocolError::InvalidTokenType {
                tag: 0x05,
                version: TdsVersion::V7_4
            })
        );
    }

    #[test]
    fn test_tags_unique_per_table() {
        for table in [TDS5_TOKENS, TDS7_TOKENS] {
            for (i, a) in table.iter().enumerate() {
                assert!(table[i + 1..].iter().all(|b| b.tag != a.tag), "{}", a.name);
            }
        }
    }
}
