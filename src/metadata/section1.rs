//! Metadata section 1: always plaintext, carrying password hints and the
//! encryption level of sections 2 and 3 and of the channel's time-series
//! data (spec §3).

use super::EncryptionState;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const HINT_FIELD_LEN: usize = 256;

/// Plaintext metadata section 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section1 {
    /// Hint for the level-1 password, shown when no supplied password
    /// unlocks anything (spec §7 "surface hints from section 1").
    pub password_hint_1: String,
    /// Hint for the level-2 password.
    pub password_hint_2: String,
    /// Encryption level guarding section 2 of this file.
    pub section_2_encryption: EncryptionState,
    /// Encryption level guarding section 3 of this file.
    pub section_3_encryption: EncryptionState,
    /// Encryption level guarding this channel's time-series data blocks.
    /// Not meaningful for video channels.
    pub time_series_data_encryption: EncryptionState,
}

impl Default for Section1 {
    fn default() -> Self {
        Self {
            password_hint_1: String::new(),
            password_hint_2: String::new(),
            section_2_encryption: EncryptionState::plaintext(),
            section_3_encryption: EncryptionState::plaintext(),
            time_series_data_encryption: EncryptionState::plaintext(),
        }
    }
}

fn write_hint<W: Write>(w: &mut W, s: &str) -> Result<(), EncodeError> {
    let bytes = s.as_bytes();
    if bytes.len() >= HINT_FIELD_LEN {
        return Err(EncodeError::FieldTooLarge("password hint"));
    }
    let mut buf = vec![0u8; HINT_FIELD_LEN];
    #[allow(clippy::indexing_slicing)]
    buf[..bytes.len()].copy_from_slice(bytes);
    w.write_all(&buf)
        .map_err(std::convert::Into::<EncodeError>::into)
}

fn read_hint<R: Read>(r: &mut R) -> Result<String, DecodeError> {
    let mut buf = vec![0u8; HINT_FIELD_LEN];
    r.read_exact(&mut buf)?;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    #[allow(clippy::indexing_slicing)]
    std::str::from_utf8(&buf[..nul])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8("password hint"))
}

impl Encode for Section1 {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_hint(writer, &self.password_hint_1)?;
        write_hint(writer, &self.password_hint_2)?;
        writer.write_i8(self.section_2_encryption.to_raw())?;
        writer.write_i8(self.section_3_encryption.to_raw())?;
        writer.write_i8(self.time_series_data_encryption.to_raw())?;
        Ok(())
    }
}

impl Decode for Section1 {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            password_hint_1: read_hint(reader)?,
            password_hint_2: read_hint(reader)?,
            section_2_encryption: EncryptionState::from_raw(reader.read_i8()?),
            section_3_encryption: EncryptionState::from_raw(reader.read_i8()?),
            time_series_data_encryption: EncryptionState::from_raw(reader.read_i8()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn round_trips() {
        let mut s = Section1::default();
        s.password_hint_1 = "pet's name".to_string();
        s.section_2_encryption.level = super::super::EncryptionLevel::Level2;

        let bytes = s.encode_into_vec();
        let decoded = Section1::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(s, decoded);
    }
}
