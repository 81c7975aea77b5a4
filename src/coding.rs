use std::io::{Read, Write};

/// Error during serialization of an on-disk MED structure
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
    /// A field exceeded the fixed width reserved for it on disk
    FieldTooLarge(&'static str),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "EncodeError::Io({e})"),
            Self::FieldTooLarge(field) => write!(f, "EncodeError::FieldTooLarge({field})"),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::FieldTooLarge(_) => None,
        }
    }
}

/// Error during deserialization of an on-disk MED structure
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),
    /// A fixed magic/type-code prefix did not match what was expected
    InvalidHeader(&'static str),
    /// An enum tag byte did not map to any known variant
    InvalidTag((&'static str, u8)),
    /// A version field was outside the range this crate understands
    InvalidVersion,
    /// A string field was not valid UTF-8
    InvalidUtf8(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError::Io({e})"),
            Self::InvalidHeader(what) => write!(f, "DecodeError::InvalidHeader({what})"),
            Self::InvalidTag((what, tag)) => write!(f, "DecodeError::InvalidTag({what}, {tag})"),
            Self::InvalidVersion => write!(f, "DecodeError::InvalidVersion"),
            Self::InvalidUtf8(what) => write!(f, "DecodeError::InvalidUtf8({what})"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Trait for types with a fixed, well-known on-disk binary encoding.
pub trait Encode {
    /// Serializes into a writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly allocated vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing to a Vec cannot fail");
        v
    }
}

/// Trait for types with a fixed, well-known on-disk binary decoding.
pub trait Decode {
    /// Deserializes from a reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
