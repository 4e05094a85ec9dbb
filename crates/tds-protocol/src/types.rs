//! TDS data type tables.
//!
//! Each protocol family has its own table mapping the type byte found in
//! column metadata to a [`TypeEntry`]: the value class, how the TYPE_INFO
//! block is laid out in metadata, and how row data for the column is framed.
//! Nothing in the tokenizer switches on type bytes directly.

use bytes::Buf;

use crate::codec::{Charset, ensure, read_b_varchar, read_us_varchar};
use crate::error::ProtocolError;
use crate::version::{Family, TdsVersion};

/// Encoding of DECIMAL/NUMERIC magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    /// Sign byte 0 = positive, magnitude big-endian (TDS 5.0).
    SignFirstBigEndian,
    /// Sign byte 1 = positive, magnitude little-endian (TDS 7.x).
    SignFirstLittleEndian,
}

/// Value class of a column type, used to pick a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Untyped NULL.
    Null,
    /// Boolean.
    Bit,
    /// Signed integer (width taken from the field length).
    Int,
    /// Unsigned integer (TDS 5.0).
    UInt,
    /// IEEE float (width taken from the field length).
    Float,
    /// MONEY / SMALLMONEY.
    Money,
    /// DATETIME / SMALLDATETIME.
    DateTime,
    /// Date without time (TDS 5.0 DATE, TDS 7.3 DATE).
    Date,
    /// Time of day (TDS 5.0 TIME: 1/300 s ticks).
    Time,
    /// Time of day with scale (TDS 7.3 TIME).
    TimeN,
    /// DATETIME2.
    DateTime2,
    /// DATETIMEOFFSET.
    DateTimeOffset,
    /// DECIMAL / NUMERIC.
    Decimal(NumericFormat),
    /// Single-byte character data.
    Char,
    /// UTF-16 character data.
    NChar,
    /// Binary data.
    Binary,
    /// UNIQUEIDENTIFIER.
    Guid,
    /// XML document (UTF-16).
    Xml,
    /// SQL_VARIANT.
    Variant,
}

impl TypeClass {
    /// Whether values of this class carry a date or time.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::DateTime
                | Self::Date
                | Self::Time
                | Self::TimeN
                | Self::DateTime2
                | Self::DateTimeOffset
        )
    }
}

/// Layout of the TYPE_INFO block following the type byte in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoLayout {
    /// Nothing follows; the width is fixed by the table.
    Fixed(u8),
    /// Nothing follows; row data is byte-length framed (TDS 7.3 DATE).
    Empty,
    /// 1-byte maximum length.
    ByteLen,
    /// 1-byte length, precision and scale.
    ByteLenPrecisionScale,
    /// 1-byte fractional-second scale only.
    Scale,
    /// 2-byte maximum length, optionally followed by a 5-byte collation.
    UShortLen {
        /// Whether a collation follows (TDS 7.1+ character types).
        collation: bool,
    },
    /// 4-byte maximum length (TDS 5.0 LONGCHAR/LONGBINARY, SQL_VARIANT).
    LongLen,
    /// TEXT/IMAGE: 4-byte length, optional collation, table name.
    Text {
        /// Whether a collation follows (TDS 7.1+ TEXT/NTEXT).
        collation: bool,
    },
    /// XML schema presence byte and optional schema names.
    Xml,
}

/// Framing of a column value inside a ROW token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLayout {
    /// Exactly `n` bytes, never NULL.
    Fixed(usize),
    /// 1-byte length prefix; zero means NULL.
    ByteLen,
    /// 2-byte length prefix; `0xFFFF` means NULL.
    UShortLen,
    /// 4-byte length prefix; zero means NULL.
    LongLen,
    /// Text pointer + timestamp + 4-byte length; empty pointer means NULL.
    TextPtr,
    /// Partially length-prefixed chunks (TDS 7.2 MAX types).
    Plp,
}

/// One row of a type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    /// Type byte.
    pub id: u8,
    /// Server-side type name.
    pub name: &'static str,
    /// Value class.
    pub class: TypeClass,
    /// Metadata layout.
    pub info: InfoLayout,
}

const fn entry(id: u8, name: &'static str, class: TypeClass, info: InfoLayout) -> TypeEntry {
    TypeEntry {
        id,
        name,
        class,
        info,
    }
}

const SYB_DEC: TypeClass = TypeClass::Decimal(NumericFormat::SignFirstBigEndian);
const MS_DEC: TypeClass = TypeClass::Decimal(NumericFormat::SignFirstLittleEndian);

/// TDS 5.0 (Sybase) type table.
pub static TDS5_TYPES: &[TypeEntry] = &[
    entry(0x30, "tinyint", TypeClass::UInt, InfoLayout::Fixed(1)),
    entry(0x34, "smallint", TypeClass::Int, InfoLayout::Fixed(2)),
    entry(0x38, "int", TypeClass::Int, InfoLayout::Fixed(4)),
    entry(0xBF, "bigint", TypeClass::Int, InfoLayout::Fixed(8)),
    entry(0x26, "intn", TypeClass::Int, InfoLayout::ByteLen),
    entry(0x41, "usmallint", TypeClass::UInt, InfoLayout::Fixed(2)),
    entry(0x42, "uint", TypeClass::UInt, InfoLayout::Fixed(4)),
    entry(0x43, "ubigint", TypeClass::UInt, InfoLayout::Fixed(8)),
    entry(0x44, "uintn", TypeClass::UInt, InfoLayout::ByteLen),
    entry(0x32, "bit", TypeClass::Bit, InfoLayout::Fixed(1)),
    entry(0x3B, "real", TypeClass::Float, InfoLayout::Fixed(4)),
    entry(0x3E, "float", TypeClass::Float, InfoLayout::Fixed(8)),
    entry(0x6D, "floatn", TypeClass::Float, InfoLayout::ByteLen),
    entry(0x3C, "money", TypeClass::Money, InfoLayout::Fixed(8)),
    entry(0x7A, "smallmoney", TypeClass::Money, InfoLayout::Fixed(4)),
    entry(0x6E, "moneyn", TypeClass::Money, InfoLayout::ByteLen),
    entry(0x3D, "datetime", TypeClass::DateTime, InfoLayout::Fixed(8)),
    entry(0x3A, "smalldatetime", TypeClass::DateTime, InfoLayout::Fixed(4)),
    entry(0x6F, "datetimn", TypeClass::DateTime, InfoLayout::ByteLen),
    entry(0x31, "date", TypeClass::Date, InfoLayout::Fixed(4)),
    entry(0x33, "time", TypeClass::Time, InfoLayout::Fixed(4)),
    entry(0x7B, "daten", TypeClass::Date, InfoLayout::ByteLen),
    entry(0x93, "timen", TypeClass::Time, InfoLayout::ByteLen),
    entry(0x37, "decimal", SYB_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x3F, "numeric", SYB_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x6A, "decn", SYB_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x6C, "numn", SYB_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x2F, "char", TypeClass::Char, InfoLayout::ByteLen),
    entry(0x27, "varchar", TypeClass::Char, InfoLayout::ByteLen),
    entry(0xAF, "longchar", TypeClass::Char, InfoLayout::LongLen),
    entry(0x2D, "binary", TypeClass::Binary, InfoLayout::ByteLen),
    entry(0x25, "varbinary", TypeClass::Binary, InfoLayout::ByteLen),
    entry(0xE1, "longbinary", TypeClass::Binary, InfoLayout::LongLen),
    entry(0x23, "text", TypeClass::Char, InfoLayout::Text { collation: false }),
    entry(0x22, "image", TypeClass::Binary, InfoLayout::Text { collation: false }),
];

/// TDS 7.x (SQL Server) type table.
pub static TDS7_TYPES: &[TypeEntry] = &[
    entry(0x1F, "null", TypeClass::Null, InfoLayout::Fixed(0)),
    entry(0x30, "tinyint", TypeClass::UInt, InfoLayout::Fixed(1)),
    entry(0x32, "bit", TypeClass::Bit, InfoLayout::Fixed(1)),
    entry(0x34, "smallint", TypeClass::Int, InfoLayout::Fixed(2)),
    entry(0x38, "int", TypeClass::Int, InfoLayout::Fixed(4)),
    entry(0x7F, "bigint", TypeClass::Int, InfoLayout::Fixed(8)),
    entry(0x3B, "real", TypeClass::Float, InfoLayout::Fixed(4)),
    entry(0x3E, "float", TypeClass::Float, InfoLayout::Fixed(8)),
    entry(0x3C, "money", TypeClass::Money, InfoLayout::Fixed(8)),
    entry(0x7A, "smallmoney", TypeClass::Money, InfoLayout::Fixed(4)),
    entry(0x3D, "datetime", TypeClass::DateTime, InfoLayout::Fixed(8)),
    entry(0x3A, "smalldatetime", TypeClass::DateTime, InfoLayout::Fixed(4)),
    entry(0x24, "uniqueidentifier", TypeClass::Guid, InfoLayout::ByteLen),
    entry(0x26, "intn", TypeClass::Int, InfoLayout::ByteLen),
    entry(0x68, "bitn", TypeClass::Bit, InfoLayout::ByteLen),
    entry(0x6D, "floatn", TypeClass::Float, InfoLayout::ByteLen),
    entry(0x6E, "moneyn", TypeClass::Money, InfoLayout::ByteLen),
    entry(0x6F, "datetimn", TypeClass::DateTime, InfoLayout::ByteLen),
    entry(0x37, "decimal", MS_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x3F, "numeric", MS_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x6A, "decimaln", MS_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x6C, "numericn", MS_DEC, InfoLayout::ByteLenPrecisionScale),
    entry(0x28, "date", TypeClass::Date, InfoLayout::Empty),
    entry(0x29, "time", TypeClass::TimeN, InfoLayout::Scale),
    entry(0x2A, "datetime2", TypeClass::DateTime2, InfoLayout::Scale),
    entry(0x2B, "datetimeoffset", TypeClass::DateTimeOffset, InfoLayout::Scale),
    entry(0x2F, "char", TypeClass::Char, InfoLayout::ByteLen),
    entry(0x27, "varchar", TypeClass::Char, InfoLayout::ByteLen),
    entry(0x2D, "binary", TypeClass::Binary, InfoLayout::ByteLen),
    entry(0x25, "varbinary", TypeClass::Binary, InfoLayout::ByteLen),
    entry(0xA7, "varchar", TypeClass::Char, InfoLayout::UShortLen { collation: true }),
    entry(0xAF, "char", TypeClass::Char, InfoLayout::UShortLen { collation: true }),
    entry(0xE7, "nvarchar", TypeClass::NChar, InfoLayout::UShortLen { collation: true }),
    entry(0xEF, "nchar", TypeClass::NChar, InfoLayout::UShortLen { collation: true }),
    entry(0xA5, "varbinary", TypeClass::Binary, InfoLayout::UShortLen { collation: false }),
    entry(0xAD, "binary", TypeClass::Binary, InfoLayout::UShortLen { collation: false }),
    entry(0x23, "text", TypeClass::Char, InfoLayout::Text { collation: true }),
    entry(0x63, "ntext", TypeClass::NChar, InfoLayout::Text { collation: true }),
    entry(0x22, "image", TypeClass::Binary, InfoLayout::Text { collation: false }),
    entry(0xF1, "xml", TypeClass::Xml, InfoLayout::Xml),
    entry(0x62, "sql_variant", TypeClass::Variant, InfoLayout::LongLen),
];

/// Type table lookup for one protocol version.
#[derive(Debug, Clone, Copy)]
pub struct TypeTable {
    version: TdsVersion,
    entries: &'static [TypeEntry],
}

impl TypeTable {
    /// Table for the given protocol version.
    #[must_use]
    pub fn for_version(version: TdsVersion) -> Self {
        let entries = match version.family() {
            Family::Sybase => TDS5_TYPES,
            Family::Mssql => TDS7_TYPES,
        };
        Self { version, entries }
    }

    /// Version this table was built for.
    #[must_use]
    pub fn version(&self) -> TdsVersion {
        self.version
    }

    /// Look up a type byte.
    pub fn lookup(&self, id: u8) -> Result<&'static TypeEntry, ProtocolError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(ProtocolError::InvalidDataType(id))
    }

    /// Decode the TYPE_INFO block that follows a type byte.
    pub fn decode_type_info(&self, id: u8, src: &mut impl Buf) -> Result<TypeInfo, ProtocolError> {
        let entry = self.lookup(id)?;
        let mut info = TypeInfo {
            type_id: id,
            name: entry.name,
            class: entry.class,
            layout: DataLayout::ByteLen,
            max_length: None,
            precision: None,
            scale: None,
            collation: None,
        };

        match entry.info {
            InfoLayout::Fixed(width) => {
                info.max_length = Some(u32::from(width));
                info.layout = DataLayout::Fixed(width as usize);
            }
            InfoLayout::Empty => {}
            InfoLayout::ByteLen => {
                ensure(src, 1)?;
                info.max_length = Some(u32::from(src.get_u8()));
            }
            InfoLayout::ByteLenPrecisionScale => {
                ensure(src, 3)?;
                info.max_length = Some(u32::from(src.get_u8()));
                info.precision = Some(src.get_u8());
                info.scale = Some(src.get_u8());
            }
            InfoLayout::Scale => {
                ensure(src, 1)?;
                info.scale = Some(src.get_u8());
            }
            InfoLayout::UShortLen { collation } => {
                ensure(src, 2)?;
                let max = src.get_u16_le();
                info.max_length = Some(u32::from(max));
                info.layout = if max == 0xFFFF {
                    DataLayout::Plp
                } else {
                    DataLayout::UShortLen
                };
                if collation {
                    info.collation = Some(Collation::decode(src)?);
                }
            }
            InfoLayout::LongLen => {
                ensure(src, 4)?;
                info.max_length = Some(src.get_u32_le());
                info.layout = DataLayout::LongLen;
            }
            InfoLayout::Text { collation } => {
                ensure(src, 4)?;
                info.max_length = Some(src.get_u32_le());
                if collation {
                    info.collation = Some(Collation::decode(src)?);
                }
                self.skip_table_name(src)?;
                info.layout = DataLayout::TextPtr;
            }
            InfoLayout::Xml => {
                ensure(src, 1)?;
                if src.get_u8() != 0 {
                    // database, owning schema, schema collection
                    read_b_varchar(src)?;
                    read_b_varchar(src)?;
                    read_us_varchar(src)?;
                }
                info.layout = DataLayout::Plp;
            }
        }

        Ok(info)
    }

    fn skip_table_name(&self, src: &mut impl Buf) -> Result<(), ProtocolError> {
        if self.version.is_sybase() {
            ensure(src, 2)?;
            let len = src.get_u16_le() as usize;
            ensure(src, len)?;
            src.advance(len);
        } else if self.version.has_wide_user_type() {
            ensure(src, 1)?;
            let parts = src.get_u8();
            for _ in 0..parts {
                read_us_varchar(src)?;
            }
        } else {
            read_us_varchar(src)?;
        }
        Ok(())
    }
}

/// Decoded TYPE_INFO for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Type byte.
    pub type_id: u8,
    /// Server-side type name.
    pub name: &'static str,
    /// Value class.
    pub class: TypeClass,
    /// Row data framing.
    pub layout: DataLayout,
    /// Declared maximum length.
    pub max_length: Option<u32>,
    /// Precision for decimal types.
    pub precision: Option<u8>,
    /// Scale for decimal and time types.
    pub scale: Option<u8>,
    /// Collation for TDS 7.x character types.
    pub collation: Option<Collation>,
}

/// SQL Server collation (5 bytes in TYPE_INFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Collation {
    /// LCID and comparison flags.
    pub info: u32,
    /// Sort ID.
    pub sort_id: u8,
}

/// UTF-8 collation flag (SQL Server 2019+).
pub const COLLATION_FLAG_UTF8: u32 = 0x0800_0000;

impl Collation {
    /// Decode a 5-byte collation.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure(src, 5)?;
        Ok(Self {
            info: src.get_u32_le(),
            sort_id: src.get_u8(),
        })
    }

    /// Locale identifier.
    #[must_use]
    pub fn lcid(&self) -> u32 {
        self.info & 0x000F_FFFF
    }

    /// Character set used for single-byte data in this collation.
    #[must_use]
    pub fn charset(&self) -> Charset {
        if self.info & COLLATION_FLAG_UTF8 != 0 {
            return Charset::Utf8;
        }
        #[cfg(feature = "encoding")]
        {
            let enc = match self.lcid() & 0xFFFF {
                0x0411 => Some(encoding_rs::SHIFT_JIS),
                0x0804 | 0x1004 => Some(encoding_rs::GB18030),
                0x0404 | 0x0C04 | 0x1404 => Some(encoding_rs::BIG5),
                0x0412 => Some(encoding_rs::EUC_KR),
                0x041E => Some(encoding_rs::WINDOWS_874),
                0x0405 | 0x0415 | 0x040E | 0x041A | 0x041B | 0x0424 | 0x0418 => {
                    Some(encoding_rs::WINDOWS_1250)
                }
                0x0419 | 0x0422 | 0x0423 | 0x0402 => Some(encoding_rs::WINDOWS_1251),
                0x0408 => Some(encoding_rs::WINDOWS_1253),
                0x041F => Some(encoding_rs::WINDOWS_1254),
                0x040D => Some(encoding_rs::WINDOWS_1255),
                0x0401 => Some(encoding_rs::WINDOWS_1256),
                0x0425..=0x0427 => Some(encoding_rs::WINDOWS_1257),
                _ => None,
            };
            if let Some(enc) = enc {
                return Charset::Other(enc);
            }
        }
        Charset::Windows1252
    }
}
