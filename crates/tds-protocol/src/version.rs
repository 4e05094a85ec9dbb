//! TDS protocol version definitions.

use core::fmt;

/// Protocol family a [`TdsVersion`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Sybase Adaptive Server (TDS 5.0).
    Sybase,
    /// Microsoft SQL Server (TDS 7.x).
    Mssql,
}

/// TDS protocol version.
///
/// The raw value is the one exchanged in LOGIN/LOGINACK. TDS 5.0 uses
/// `0x05000000`; TDS 7.x uses the Microsoft encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TdsVersion(u32);

impl TdsVersion {
    /// TDS 5.0 (Sybase ASE).
    pub const V5_0: Self = Self(0x0500_0000);

    /// TDS 7.0 (SQL Server 7.0)
    pub const V7_0: Self = Self(0x7000_0000);

    /// TDS 7.1 (SQL Server 2000)
    pub const V7_1: Self = Self(0x7100_0001);

    /// TDS 7.2 (SQL Server 2005)
    pub const V7_2: Self = Self(0x7209_0002);

    /// TDS 7.3A (SQL Server 2008)
    pub const V7_3A: Self = Self(0x730A_0003);

    /// TDS 7.4 (SQL Server 2012+)
    pub const V7_4: Self = Self(0x7400_0004);

    /// Create a version from its raw LOGINACK value.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Get the raw version value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Protocol family of this version.
    #[must_use]
    pub const fn family(self) -> Family {
        if self.0 >> 24 == 0x05 {
            Family::Sybase
        } else {
            Family::Mssql
        }
    }

    /// Whether this is a Sybase TDS 5.0 version.
    #[must_use]
    pub const fn is_sybase(self) -> bool {
        matches!(self.family(), Family::Sybase)
    }

    /// Major version number.
    #[must_use]
    pub const fn major(self) -> u8 {
        if self.is_sybase() {
            5
        } else {
            ((self.0 >> 28) & 0x0F) as u8
        }
    }

    /// Minor version number.
    #[must_use]
    pub const fn minor(self) -> u8 {
        if self.is_sybase() {
            0
        } else {
            ((self.0 >> 24) & 0x0F) as u8
        }
    }

    /// Whether COLMETADATA carries a 4-byte user type (7.2+).
    #[must_use]
    pub const fn has_wide_user_type(self) -> bool {
        !self.is_sybase() && self.0 >= Self::V7_2.0
    }

    /// Whether DONE tokens carry a 64-bit row count (7.2+).
    #[must_use]
    pub const fn has_wide_row_count(self) -> bool {
        !self.is_sybase() && self.0 >= Self::V7_2.0
    }

    /// Whether SQL batches require the ALL_HEADERS prefix (7.2+).
    #[must_use]
    pub const fn requires_all_headers(self) -> bool {
        !self.is_sybase() && self.0 >= Self::V7_2.0
    }

    /// Whether DATE, TIME, DATETIME2 and DATETIMEOFFSET types exist (7.3+).
    #[must_use]
    pub const fn supports_date_time_types(self) -> bool {
        !self.is_sybase() && self.0 >= Self::V7_3A.0
    }
}

impl Default for TdsVersion {
    fn default() -> Self {
        Self::V7_4
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TDS {}.{}", self.major(), self.minor())
    }
}

impl From<u32> for TdsVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
