//! Metadata section 3: recording-time offset (used to anonymize absolute
//! timestamps into oUTC), DST/timezone codes, subject information, and an
//! optional geotag (spec §3). This is the section most likely to be
//! withheld from an L1-only caller; its absence is non-fatal (spec §7)
//! and callers fall back to offset `0` / empty strings.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const NAME_FIELD_LEN: usize = 64;
const TZ_FIELD_LEN: usize = 8;

/// Daylight-saving-time handling code for a session's recording
/// location. The table of actual DST transition rules is out of scope
/// (spec §1 OUT OF SCOPE: "Locale/timezone tables ... DST math"); this
/// crate only stores and round-trips the code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DaylightTimeCode {
    /// The recording location does not observe DST.
    NoDaylightSaving,
    /// The recording location observes DST under the stored timezone
    /// strings.
    Observed,
    /// DST status unknown/unspecified.
    Unspecified,
}

impl DaylightTimeCode {
    const fn to_raw(self) -> i8 {
        match self {
            Self::NoDaylightSaving => 0,
            Self::Observed => 1,
            Self::Unspecified => -1,
        }
    }

    const fn from_raw(raw: i8) -> Self {
        match raw {
            0 => Self::NoDaylightSaving,
            1 => Self::Observed,
            _ => Self::Unspecified,
        }
    }
}

/// Metadata section 3.
#[derive(Clone, Debug, PartialEq)]
pub struct Section3 {
    /// Microsecond offset subtracted from every absolute µUTC timestamp
    /// to produce the anonymized oUTC value shown to callers without
    /// access to this section (spec glossary "oUTC").
    pub recording_time_offset: i64,
    /// DST handling at the recording location.
    pub daylight_time_code: DaylightTimeCode,
    /// Standard-time timezone acronym, e.g. `"EST"`.
    pub standard_timezone_acronym: String,
    /// Standard-time timezone full name.
    pub standard_timezone_string: String,
    /// Daylight-time timezone acronym, e.g. `"EDT"`.
    pub daylight_timezone_acronym: String,
    /// Daylight-time timezone full name.
    pub daylight_timezone_string: String,
    /// Subject's name (or pseudonym), field 1.
    pub subject_name_1: String,
    /// Subject's name (or pseudonym), field 2.
    pub subject_name_2: String,
    /// Subject ID, separate from the Universal Header's anonymized ID.
    pub subject_id: String,
    /// Recording location latitude, degrees, or `f64::NAN` if unset.
    pub recording_latitude: f64,
    /// Recording location longitude, degrees, or `f64::NAN` if unset.
    pub recording_longitude: f64,
}

impl Default for Section3 {
    fn default() -> Self {
        Self {
            recording_time_offset: 0,
            daylight_time_code: DaylightTimeCode::Unspecified,
            standard_timezone_acronym: String::new(),
            standard_timezone_string: String::new(),
            daylight_timezone_acronym: String::new(),
            daylight_timezone_string: String::new(),
            subject_name_1: String::new(),
            subject_name_2: String::new(),
            subject_id: String::new(),
            recording_latitude: f64::NAN,
            recording_longitude: f64::NAN,
        }
    }
}

fn write_fixed<W: Write>(w: &mut W, s: &str, len: usize) -> Result<(), EncodeError> {
    let bytes = s.as_bytes();
    if bytes.len() >= len {
        return Err(EncodeError::FieldTooLarge("fixed string"));
    }
    let mut buf = vec![0u8; len];
    #[allow(clippy::indexing_slicing)]
    buf[..bytes.len()].copy_from_slice(bytes);
    w.write_all(&buf)?;
    Ok(())
}

fn read_fixed<R: Read>(r: &mut R, len: usize) -> Result<String, DecodeError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    #[allow(clippy::indexing_slicing)]
    std::str::from_utf8(&buf[..nul])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8("fixed string"))
}

impl Encode for Section3 {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i64::<LittleEndian>(self.recording_time_offset)?;
        writer.write_i8(self.daylight_time_code.to_raw())?;
        write_fixed(writer, &self.standard_timezone_acronym, TZ_FIELD_LEN)?;
        write_fixed(writer, &self.standard_timezone_string, NAME_FIELD_LEN)?;
        write_fixed(writer, &self.daylight_timezone_acronym, TZ_FIELD_LEN)?;
        write_fixed(writer, &self.daylight_timezone_string, NAME_FIELD_LEN)?;
        write_fixed(writer, &self.subject_name_1, NAME_FIELD_LEN)?;
        write_fixed(writer, &self.subject_name_2, NAME_FIELD_LEN)?;
        write_fixed(writer, &self.subject_id, NAME_FIELD_LEN)?;
        writer.write_f64::<LittleEndian>(self.recording_latitude)?;
        writer.write_f64::<LittleEndian>(self.recording_longitude)?;
        Ok(())
    }
}

impl Decode for Section3 {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            recording_time_offset: reader.read_i64::<LittleEndian>()?,
            daylight_time_code: DaylightTimeCode::from_raw(reader.read_i8()?),
            standard_timezone_acronym: read_fixed(reader, TZ_FIELD_LEN)?,
            standard_timezone_string: read_fixed(reader, NAME_FIELD_LEN)?,
            daylight_timezone_acronym: read_fixed(reader, TZ_FIELD_LEN)?,
            daylight_timezone_string: read_fixed(reader, NAME_FIELD_LEN)?,
            subject_name_1: read_fixed(reader, NAME_FIELD_LEN)?,
            subject_name_2: read_fixed(reader, NAME_FIELD_LEN)?,
            subject_id: read_fixed(reader, NAME_FIELD_LEN)?,
            recording_latitude: reader.read_f64::<LittleEndian>()?,
            recording_longitude: reader.read_f64::<LittleEndian>()?,
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
        let mut s = Section3::default();
        s.recording_time_offset = 123_456;
        s.daylight_time_code = DaylightTimeCode::Observed;
        s.standard_timezone_acronym = "EST".to_string();
        s.subject_id = "subj-01".to_string();
        s.recording_latitude = 42.36;
        s.recording_longitude = -71.06;

        let bytes = s.encode_into_vec();
        let decoded = Section3::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn default_has_unspecified_dst_and_nan_geotag() {
        let s = Section3::default();
        assert_eq!(s.daylight_time_code, DaylightTimeCode::Unspecified);
        assert!(s.recording_latitude.is_nan());
    }
}
