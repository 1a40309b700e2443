//! Assembly error types.

use std::fmt;

/// Errors raised while emitting, serializing or restoring an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Stream does not start with the `SSAS` magic.
    BadMagic(u32),
    /// Major version differs from the reader's.
    VersionMismatch { found: u16, expected: u16 },
    /// Minor version is newer than the reader understands.
    UnsupportedMinor { found: u16, supported: u16 },
    /// Stream ended before the structure was complete.
    Truncated,
    /// A string table entry is not valid UTF-8.
    InvalidUtf8,
    /// An unknown tag byte was read where a value or ref kind was expected.
    InvalidTag(u8),
    /// Object-typed constants are runtime addresses and cannot be encoded.
    ObjectConstant,
    /// A jump or loop distance does not fit in 16 bits.
    JumpTooLarge,
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::BadMagic(m) => write!(f, "bad magic 0x{m:08X}"),
            AssemblyError::VersionMismatch { found, expected } => {
                write!(f, "version mismatch: found {found}, expected {expected}")
            }
            AssemblyError::UnsupportedMinor { found, supported } => {
                write!(f, "unsupported version: minor {found} > {supported}")
            }
            AssemblyError::Truncated => write!(f, "truncated assembly stream"),
            AssemblyError::InvalidUtf8 => write!(f, "string table entry is not valid UTF-8"),
            AssemblyError::InvalidTag(t) => write!(f, "invalid tag byte 0x{t:02X}"),
            AssemblyError::ObjectConstant => {
                write!(f, "object-typed constant is not serializable in assembly constants")
            }
            AssemblyError::JumpTooLarge => write!(f, "jump offset too large"),
        }
    }
}

impl std::error::Error for AssemblyError {}
