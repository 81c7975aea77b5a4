use crate::coding::{DecodeError, EncodeError};
use crate::file_type::FileType;

/// Represents errors that can occur while reading or writing a MED session.
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// A path did not look like any recognized MED file/directory type
    NotMed(std::path::PathBuf),

    /// A path's extension type code did not match the file's on-disk type code
    TypeMismatch {
        /// Type implied by the file extension
        expected: FileType,
        /// Type actually found in the universal header
        got: FileType,
    },

    /// The universal header's CRC, byte-order code, or version could not be validated
    InvalidHeader(&'static str),

    /// No password supplied gave access above the current level
    BadPassword,

    /// Metadata could not be read or decrypted
    NoMetadata(&'static str),

    /// The requested slice or index does not fall inside any segment
    NoEntry,

    /// Session channels disagreed on a value that must be uniform (e.g. session UID)
    Inconsistent(&'static str),

    /// A checksum did not match the expected value
    InvalidChecksum {
        /// Checksum recorded in the file
        expected: u32,
        /// Checksum computed while reading
        got: u32,
    },

    /// An operation needing an open file handle was attempted on an FPS
    /// that has not been opened (or was already closed)
    NoFile,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MedError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// MED result type
pub type Result<T> = std::result::Result<T, Error>;
