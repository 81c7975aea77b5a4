//! The fixed 1024-byte prefix carried by every MED file: CRCs, UIDs, time
//! bounds, the 4-byte type code, and the three password-validation fields.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::crc32;
use crate::file_type::FileType;
use crate::sentinels::{
    UH_CHANNEL_LEVEL_SEGMENT_NUMBER, UH_SESSION_LEVEL_SEGMENT_NUMBER, UID_NO_ENTRY,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Total on-disk size of the Universal Header.
pub const HEADER_SIZE: usize = 1024;

const HEADER_CRC_OFFSET: usize = 0;
const NAME_FIELD_LEN: usize = 64;
const PW_FIELD_LEN: usize = 16;

/// The 1024-byte prefix of every MED file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniversalHeader {
    /// CRC over bytes 4..1024 (everything after this field through the end
    /// of the header).
    pub header_crc: u32,
    /// CRC over the file body (the bytes following the header).
    pub body_crc: u32,
    /// Last sample/frame's time in this segment (or aggregate, at
    /// session/channel level).
    pub segment_end_time: i64,
    /// Number of entries in this file (index count, record count, ...).
    pub number_of_entries: i64,
    /// Largest single entry size seen, in bytes.
    pub maximum_entry_size: i64,
    /// Segment number, or one of [`UH_SESSION_LEVEL_SEGMENT_NUMBER`] /
    /// [`UH_CHANNEL_LEVEL_SEGMENT_NUMBER`] for aggregate headers.
    pub segment_number: i32,
    /// 4-byte ASCII type code, matching the path's extension.
    pub type_code: [u8; 4],
    /// MED format major version.
    pub version_major: u8,
    /// MED format minor version.
    pub version_minor: u8,
    /// Byte-order code; must be `1` (little-endian) for this crate to
    /// accept the file.
    pub byte_order_code: u8,
    /// Session-wide recording start, in µUTC.
    pub session_start_time: i64,
    /// This segment's recording start, in µUTC.
    pub segment_start_time: i64,
    /// Printable session name.
    pub session_name: String,
    /// Printable channel name.
    pub channel_name: String,
    /// Anonymized subject identifier.
    pub anonymized_subject_id: String,
    /// Random 64-bit session UID.
    pub session_uid: u64,
    /// Random 64-bit channel UID.
    pub channel_uid: u64,
    /// Random 64-bit segment UID.
    pub segment_uid: u64,
    /// Random 64-bit file UID.
    pub file_uid: u64,
    /// Random 64-bit provenance UID (tracks derivation lineage across
    /// generated files).
    pub provenance_uid: u64,
    /// Leading bytes of `sha256(terminal_bytes(L1 password))`.
    pub level_1_password_validation_field: [u8; PW_FIELD_LEN],
    /// Leading bytes of `sha256(terminal_bytes(L2 password))`, XORed with
    /// an intermediate value as described in [`crate::password`].
    pub level_2_password_validation_field: [u8; PW_FIELD_LEN],
    /// Same scheme, for level-3 recovery.
    pub level_3_password_validation_field: [u8; PW_FIELD_LEN],
}

impl UniversalHeader {
    /// Builds a header with all UID/time fields at their sentinel/zero
    /// values and a type code, for a file of `file_type`.
    #[must_use]
    pub fn new(file_type: FileType) -> Self {
        Self {
            header_crc: 0,
            body_crc: 0,
            segment_end_time: crate::sentinels::UUTC_NO_ENTRY,
            number_of_entries: 0,
            maximum_entry_size: 0,
            segment_number: UH_SESSION_LEVEL_SEGMENT_NUMBER,
            type_code: file_type.type_code(),
            version_major: 1,
            version_minor: 0,
            byte_order_code: 1,
            session_start_time: crate::sentinels::UUTC_NO_ENTRY,
            segment_start_time: crate::sentinels::UUTC_NO_ENTRY,
            session_name: String::new(),
            channel_name: String::new(),
            anonymized_subject_id: String::new(),
            session_uid: UID_NO_ENTRY,
            channel_uid: UID_NO_ENTRY,
            segment_uid: UID_NO_ENTRY,
            file_uid: UID_NO_ENTRY,
            provenance_uid: UID_NO_ENTRY,
            level_1_password_validation_field: [0; PW_FIELD_LEN],
            level_2_password_validation_field: [0; PW_FIELD_LEN],
            level_3_password_validation_field: [0; PW_FIELD_LEN],
        }
    }

    /// Returns the [`FileType`] implied by `type_code`, if recognized.
    #[must_use]
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_type_code(self.type_code)
    }

    /// Returns whether this header is a session-level aggregate.
    #[must_use]
    pub const fn is_session_level(&self) -> bool {
        self.segment_number == UH_SESSION_LEVEL_SEGMENT_NUMBER
    }

    /// Returns whether this header is a channel-level aggregate.
    #[must_use]
    pub const fn is_channel_level(&self) -> bool {
        self.segment_number == UH_CHANNEL_LEVEL_SEGMENT_NUMBER
    }

    /// Recomputes `header_crc` over the canonical 1024-byte encoding of
    /// this header (everything after the CRC field).
    pub fn compute_header_crc(&mut self) {
        let bytes = self.encode_into_vec();
        #[allow(clippy::indexing_slicing)]
        let tail = &bytes[4..HEADER_SIZE];
        self.header_crc = crc32::calculate(tail);
    }

    /// Sets `body_crc` from the given file body bytes.
    pub fn compute_body_crc(&mut self, body: &[u8]) {
        self.body_crc = crc32::calculate(body);
    }

    /// Validates the stored `header_crc` against a 1024-byte on-disk
    /// encoding of this header (typically the raw bytes as read from
    /// disk, not a re-encoding, so that unknown/reserved bytes are
    /// honored).
    #[must_use]
    pub fn validate_header_crc(raw_header: &[u8; HEADER_SIZE]) -> bool {
        #[allow(clippy::indexing_slicing)]
        let stored = u32::from_le_bytes([
            raw_header[0],
            raw_header[1],
            raw_header[2],
            raw_header[3],
        ]);
        #[allow(clippy::indexing_slicing)]
        let tail = &raw_header[4..HEADER_SIZE];
        crc32::validate(tail, stored)
    }

    /// Validates `body_crc` against the given body bytes.
    #[must_use]
    pub fn validate_body_crc(&self, body: &[u8]) -> bool {
        crc32::validate(body, self.body_crc)
    }

    /// Checks the structural invariants spec.md requires of every header:
    /// `session_start_time <= segment_start_time <= segment_end_time`
    /// (when all three are populated), a little-endian byte order code,
    /// and a type code matching the path's expected type.
    pub fn validate_invariants(&self, expected_type: FileType) -> crate::error::Result<()> {
        if self.byte_order_code != 1 {
            return Err(crate::error::Error::InvalidHeader("byte_order_code"));
        }

        let got = self
            .file_type()
            .ok_or(crate::error::Error::InvalidHeader("type_code"))?;
        if got != expected_type {
            return Err(crate::error::Error::TypeMismatch {
                expected: expected_type,
                got,
            });
        }

        use crate::sentinels::UUTC_NO_ENTRY;
        if self.session_start_time != UUTC_NO_ENTRY
            && self.segment_start_time != UUTC_NO_ENTRY
            && self.session_start_time > self.segment_start_time
        {
            return Err(crate::error::Error::InvalidHeader("session_start_time"));
        }
        if self.segment_start_time != UUTC_NO_ENTRY
            && self.segment_end_time != UUTC_NO_ENTRY
            && self.segment_start_time > self.segment_end_time
        {
            return Err(crate::error::Error::InvalidHeader("segment_start_time"));
        }

        Ok(())
    }
}

fn write_fixed_string<W: Write>(w: &mut W, s: &str, len: usize) -> Result<(), EncodeError> {
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

fn read_fixed_string<R: Read>(r: &mut R, len: usize) -> Result<String, DecodeError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    #[allow(clippy::indexing_slicing)]
    let s = std::str::from_utf8(&buf[..nul])
        .map_err(|_| DecodeError::InvalidUtf8("fixed string"))?
        .to_string();
    Ok(s)
}

impl Encode for UniversalHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.header_crc)?;
        writer.write_u32::<LittleEndian>(self.body_crc)?;
        writer.write_i64::<LittleEndian>(self.segment_end_time)?;
        writer.write_i64::<LittleEndian>(self.number_of_entries)?;
        writer.write_i64::<LittleEndian>(self.maximum_entry_size)?;
        writer.write_i32::<LittleEndian>(self.segment_number)?;
        writer.write_all(&self.type_code)?;
        writer.write_u8(0)?; // NUL terminator for type_string
        writer.write_u8(self.version_major)?;
        writer.write_u8(self.version_minor)?;
        writer.write_u8(self.byte_order_code)?;
        writer.write_i64::<LittleEndian>(self.session_start_time)?;
        writer.write_i64::<LittleEndian>(self.segment_start_time)?;
        write_fixed_string(writer, &self.session_name, NAME_FIELD_LEN)?;
        write_fixed_string(writer, &self.channel_name, NAME_FIELD_LEN)?;
        write_fixed_string(writer, &self.anonymized_subject_id, NAME_FIELD_LEN)?;
        writer.write_u64::<LittleEndian>(self.session_uid)?;
        writer.write_u64::<LittleEndian>(self.channel_uid)?;
        writer.write_u64::<LittleEndian>(self.segment_uid)?;
        writer.write_u64::<LittleEndian>(self.file_uid)?;
        writer.write_u64::<LittleEndian>(self.provenance_uid)?;
        writer.write_all(&self.level_1_password_validation_field)?;
        writer.write_all(&self.level_2_password_validation_field)?;
        writer.write_all(&self.level_3_password_validation_field)?;

        let written = HEADER_CRC_OFFSET
            + 4 + 4 + 8 + 8 + 8 + 4 + 4 + 1 + 1 + 1 + 1 + 8 + 8
            + NAME_FIELD_LEN * 3
            + 8 * 5
            + PW_FIELD_LEN * 3;
        if written < HEADER_SIZE {
            writer.write_all(&vec![0u8; HEADER_SIZE - written])?;
        }

        Ok(())
    }
}

impl Decode for UniversalHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let header_crc = reader.read_u32::<LittleEndian>()?;
        let body_crc = reader.read_u32::<LittleEndian>()?;
        let segment_end_time = reader.read_i64::<LittleEndian>()?;
        let number_of_entries = reader.read_i64::<LittleEndian>()?;
        let maximum_entry_size = reader.read_i64::<LittleEndian>()?;
        let segment_number = reader.read_i32::<LittleEndian>()?;

        let mut type_code = [0u8; 4];
        reader.read_exact(&mut type_code)?;
        let _nul = reader.read_u8()?;

        let version_major = reader.read_u8()?;
        let version_minor = reader.read_u8()?;
        let byte_order_code = reader.read_u8()?;

        let session_start_time = reader.read_i64::<LittleEndian>()?;
        let segment_start_time = reader.read_i64::<LittleEndian>()?;

        let session_name = read_fixed_string(reader, NAME_FIELD_LEN)?;
        let channel_name = read_fixed_string(reader, NAME_FIELD_LEN)?;
        let anonymized_subject_id = read_fixed_string(reader, NAME_FIELD_LEN)?;

        let session_uid = reader.read_u64::<LittleEndian>()?;
        let channel_uid = reader.read_u64::<LittleEndian>()?;
        let segment_uid = reader.read_u64::<LittleEndian>()?;
        let file_uid = reader.read_u64::<LittleEndian>()?;
        let provenance_uid = reader.read_u64::<LittleEndian>()?;

        let mut level_1_password_validation_field = [0u8; PW_FIELD_LEN];
        reader.read_exact(&mut level_1_password_validation_field)?;
        let mut level_2_password_validation_field = [0u8; PW_FIELD_LEN];
        reader.read_exact(&mut level_2_password_validation_field)?;
        let mut level_3_password_validation_field = [0u8; PW_FIELD_LEN];
        reader.read_exact(&mut level_3_password_validation_field)?;

        let consumed = 4 + 4 + 8 + 8 + 8 + 4 + 4 + 1 + 1 + 1 + 1 + 8 + 8
            + NAME_FIELD_LEN * 3
            + 8 * 5
            + PW_FIELD_LEN * 3;
        if consumed < HEADER_SIZE {
            let mut pad = vec![0u8; HEADER_SIZE - consumed];
            reader.read_exact(&mut pad)?;
        }

        Ok(Self {
            header_crc,
            body_crc,
            segment_end_time,
            number_of_entries,
            maximum_entry_size,
            segment_number,
            type_code,
            version_major,
            version_minor,
            byte_order_code,
            session_start_time,
            segment_start_time,
            session_name,
            channel_name,
            anonymized_subject_id,
            session_uid,
            channel_uid,
            segment_uid,
            file_uid,
            provenance_uid,
            level_1_password_validation_field,
            level_2_password_validation_field,
            level_3_password_validation_field,
        })
    }
}
