//! The record data stream and the `Sgmt` record layout that
//! session/channel-level segment resolution is built from. Record
//! *bodies* other than `Sgmt` (Note, Seiz, ...) are out of scope (spec
//! §1 OUT OF SCOPE) — this module only knows enough about a record's
//! shape to skip over it or to parse the one body type segment
//! resolution depends on. Record *indices* reuse the shared
//! [`crate::index_entry::IndexEntry`] layout.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// The fixed record-type code for an `Sgmt` (segment bounds) record.
pub const SGMT_RECORD_TYPE: [u8; 4] = *b"Sgmt";

/// A header every record-data entry carries before its opaque body, so
/// unrecognized record types can still be skipped and (optionally)
/// decrypted without understanding their contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// CRC over the record body.
    pub record_crc: u32,
    /// 4-byte ASCII record type code.
    pub record_type: [u8; 4],
    /// Version of the record type's body layout.
    pub version: u32,
    /// Total bytes of this record, header included.
    pub total_record_bytes: u32,
    /// Encryption level applied to the body: 0 none, 1 = L1, 2 = L2.
    pub encryption_level: u8,
}

impl Encode for RecordHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.record_crc)?;
        writer.write_all(&self.record_type)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.total_record_bytes)?;
        writer.write_u8(self.encryption_level)?;
        Ok(())
    }
}

impl Decode for RecordHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let record_crc = reader.read_u32::<LittleEndian>()?;
        let mut record_type = [0u8; 4];
        reader.read_exact(&mut record_type)?;
        let version = reader.read_u32::<LittleEndian>()?;
        let total_record_bytes = reader.read_u32::<LittleEndian>()?;
        let encryption_level = reader.read_u8()?;
        Ok(Self {
            record_crc,
            record_type,
            version,
            total_record_bytes,
            encryption_level,
        })
    }
}

/// A segment-bounds record: one entry per segment, stored at session or
/// channel level and used to resolve a [`crate::time_slice::TimeSlice`]
/// into a concrete segment range without opening every segment's own
/// metadata (spec §4.3 "Sgmt array build").
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sgmt {
    /// Segment start time, µUTC.
    pub start_time: i64,
    /// Segment end time, µUTC.
    pub end_time: i64,
    /// First sample (time series) or frame (video) number in the segment.
    pub start_sample_or_frame: i64,
    /// Last sample (time series) or frame (video) number in the segment.
    pub end_sample_or_frame: i64,
    /// Sampling frequency for this segment, or
    /// [`crate::sentinels::FREQUENCY_VARIABLE`].
    pub sampling_frequency: f64,
    /// Segment UID.
    pub uid: u64,
    /// Segment number.
    pub segment_number: i32,
}

impl Encode for Sgmt {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i64::<LittleEndian>(self.start_time)?;
        writer.write_i64::<LittleEndian>(self.end_time)?;
        writer.write_i64::<LittleEndian>(self.start_sample_or_frame)?;
        writer.write_i64::<LittleEndian>(self.end_sample_or_frame)?;
        writer.write_f64::<LittleEndian>(self.sampling_frequency)?;
        writer.write_u64::<LittleEndian>(self.uid)?;
        writer.write_i32::<LittleEndian>(self.segment_number)?;
        Ok(())
    }
}

impl Decode for Sgmt {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            start_time: reader.read_i64::<LittleEndian>()?,
            end_time: reader.read_i64::<LittleEndian>()?,
            start_sample_or_frame: reader.read_i64::<LittleEndian>()?,
            end_sample_or_frame: reader.read_i64::<LittleEndian>()?,
            sampling_frequency: reader.read_f64::<LittleEndian>()?,
            uid: reader.read_u64::<LittleEndian>()?,
            segment_number: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn sgmt_round_trips() {
        let s = Sgmt {
            start_time: 0,
            end_time: 1_000_000,
            start_sample_or_frame: 0,
            end_sample_or_frame: 999,
            sampling_frequency: 1000.0,
            uid: 42,
            segment_number: 1,
        };
        let bytes = s.encode_into_vec();
        let decoded = Sgmt::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(s, decoded);
    }
}
