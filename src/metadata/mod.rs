//! The three metadata sections carried by every `.tmet`/`.vmet` file
//! (spec §3 "Metadata (section 1 / section 2 / section 3)", §4.7 open
//! pipeline step 4).
//!
//! Section 1 is always plaintext and records password hints plus the
//! encryption level of sections 2 and 3 and of the channel's time-series
//! data. Section 2 is type-specific (time series vs. video). Section 3
//! holds recording-time offset, timezone/DST codes, and subject
//! information, and is the most likely of the three to be withheld from
//! a caller who only has an L1 password.

mod section1;
mod section2;
mod section3;

pub use section1::Section1;
pub use section2::{Section2, TimeSeriesSection2, VideoSection2};
pub use section3::Section3;

use crate::aes::Aes128Key;
use crate::coding::{Decode, Encode};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// The encryption level applied to a metadata section or to a channel's
/// time-series data, per spec §3: `NoEnc`, `L1`, `L2`. A negative stored
/// value means "natively encrypted, currently decrypted in memory" —
/// i.e. the bytes in hand have already been unwrapped by a previous read
/// and should not be re-decrypted; [`EncryptionState::decrypted`] carries
/// that bit separately from the level itself rather than overloading the
/// sign of an integer, per this crate's general avoidance of sentinel-
/// packed fields (Design Notes §9).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncryptionLevel {
    /// Section/data is stored in plaintext.
    NoEncryption,
    /// Section/data is wrapped with the level-1 key.
    Level1,
    /// Section/data is wrapped with the level-2 key.
    Level2,
}

/// An [`EncryptionLevel`] plus whether this in-memory copy has already
/// been decrypted (source: "negative values indicate natively
/// encrypted, currently decrypted in memory").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EncryptionState {
    /// The nominal encryption level this section/data carries on disk.
    pub level: EncryptionLevel,
    /// Whether the in-memory copy has already been unwrapped.
    pub decrypted: bool,
}

impl EncryptionState {
    /// Builds a state from the raw on-disk byte: `0` = `NoEncryption`,
    /// `1`/`-1` = `Level1`, `2`/`-2` = `Level2`; negative means already
    /// decrypted in memory.
    #[must_use]
    pub fn from_raw(raw: i8) -> Self {
        let decrypted = raw < 0;
        let level = match raw.unsigned_abs() {
            1 => EncryptionLevel::Level1,
            2 => EncryptionLevel::Level2,
            _ => EncryptionLevel::NoEncryption,
        };
        Self { level, decrypted }
    }

    /// Encodes back to the raw on-disk byte.
    #[must_use]
    pub fn to_raw(self) -> i8 {
        let magnitude = match self.level {
            EncryptionLevel::NoEncryption => 0,
            EncryptionLevel::Level1 => 1,
            EncryptionLevel::Level2 => 2,
        };
        if self.decrypted {
            -magnitude
        } else {
            magnitude
        }
    }

    /// A plaintext, not-yet-decrypted state (the only state section 1
    /// itself can ever carry).
    #[must_use]
    pub const fn plaintext() -> Self {
        Self {
            level: EncryptionLevel::NoEncryption,
            decrypted: false,
        }
    }

    /// Whether this section/data still requires a key to read.
    #[must_use]
    pub const fn requires_key(self) -> bool {
        !self.decrypted && !matches!(self.level, EncryptionLevel::NoEncryption)
    }
}

/// Decrypts `bytes` in place according to `state`, given the L1/L2 keys
/// available from [`crate::password::PasswordData`]. Section-2 failure is
/// fatal to the enclosing metadata read (spec §7); section-3 failure is
/// non-fatal and the caller substitutes defaults — that distinction is
/// made by the caller based on which section this was ([`Metadata::open`]),
/// not by this helper.
pub fn decrypt_section(
    bytes: &mut [u8],
    state: EncryptionState,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<()> {
    if !state.requires_key() {
        return Ok(());
    }
    let key = match state.level {
        EncryptionLevel::Level1 => level_1_key,
        EncryptionLevel::Level2 => level_2_key,
        EncryptionLevel::NoEncryption => None,
    };
    let Some(key) = key else {
        return Err(Error::NoMetadata("password did not unlock this section"));
    };
    key.decrypt_blocks_in_place(bytes);
    Ok(())
}

/// Writes `region` behind a 4-byte little-endian length prefix.
///
/// Sections 2 and 3 are variable-length and, when encrypted, padded to a
/// multiple of 16 bytes (`Aes128Key` only ever touches whole blocks, see
/// [`crate::aes::Aes128Key::decrypt_blocks_in_place`]) — neither property a
/// plaintext `Decode` impl can recover on its own, so a reader needs the
/// exact byte span up front rather than relying on the section's own
/// framing to delimit itself the way fixed-width section 1 does.
fn write_length_prefixed<W: Write>(writer: &mut W, region: &[u8]) -> Result<()> {
    let len = u32::try_from(region.len()).map_err(|_| Error::Encode(crate::coding::EncodeError::FieldTooLarge("metadata section")))?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(region)?;
    Ok(())
}

/// Reads a region written by [`write_length_prefixed`].
fn read_length_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// The three-section metadata structure read from a `.tmet`/`.vmet` file.
#[derive(Clone, Debug)]
pub struct Metadata {
    /// Always-plaintext section 1.
    pub section_1: Section1,
    /// Type-specific section 2, `None` if it could not be decrypted.
    pub section_2: Option<Section2>,
    /// Recording-time/subject section 3, `None` if it could not be
    /// decrypted (non-fatal — spec §7).
    pub section_3: Option<Section3>,
}

impl Metadata {
    /// Reads a full metadata body: fixed-width plaintext section 1,
    /// followed by length-prefixed section 2 and section 3 regions
    /// (spec §3, §7 error-propagation policy).
    ///
    /// A section-2 decrypt or decode failure is fatal — without it a
    /// channel has no sampling frequency, so there is nothing useful left
    /// to return (spec §7: "a metadata read with no section 2 fails
    /// outright"). A section-3 failure — wrong password, corrupt region,
    /// absent recording-time/subject data — is swallowed and recorded as
    /// `None`; callers fall back to defaults (spec §7: "section 3
    /// failures are non-fatal").
    pub fn read_body<R: Read>(
        reader: &mut R,
        level_1_key: Option<&Aes128Key>,
        level_2_key: Option<&Aes128Key>,
    ) -> Result<Self> {
        let section_1 = Section1::decode_from(reader)?;

        let mut section_2_bytes = read_length_prefixed(reader)?;
        decrypt_section(&mut section_2_bytes, section_1.section_2_encryption, level_1_key, level_2_key)?;
        let section_2 = Section2::decode_from(&mut Cursor::new(section_2_bytes))?;

        let section_3 = (|| -> Result<Section3> {
            let mut bytes = read_length_prefixed(reader)?;
            decrypt_section(&mut bytes, section_1.section_3_encryption, level_1_key, level_2_key)?;
            Ok(Section3::decode_from(&mut Cursor::new(bytes))?)
        })()
        .ok();

        Ok(Self {
            section_1,
            section_2: Some(section_2),
            section_3,
        })
    }

    /// Writes a full metadata body in plaintext. Section-creation from
    /// scratch is not this crate's core workflow (spec §1 Non-goals), so
    /// this only serializes unencrypted sections; fixtures that need an
    /// encrypted body assemble one directly with
    /// [`crate::aes::Aes128Key::encrypt_blocks_in_place`] over the bytes
    /// this produces.
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.section_1.encode_into(writer)?;

        let section_2 = self
            .section_2
            .as_ref()
            .ok_or(Error::NoMetadata("no section 2 to write"))?;
        write_length_prefixed(writer, &section_2.encode_into_vec())?;

        let section_3_bytes = self
            .section_3
            .as_ref()
            .map(Encode::encode_into_vec)
            .unwrap_or_default();
        write_length_prefixed(writer, &section_3_bytes)?;

        Ok(())
    }

    /// Whether section 2 (and therefore the channel's own sampling
    /// frequency / frame rate) is currently readable.
    #[must_use]
    pub const fn has_section_2(&self) -> bool {
        self.section_2.is_some()
    }
}
