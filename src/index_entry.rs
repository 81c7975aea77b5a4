//! The fixed 24-byte index entry shared by record indices, time-series
//! indices, and video indices (spec data model: "a record index,
//! time-series index, or video index carries `{file_offset, start_time,
//! start_sample_or_frame, …}`"). `find_index` (`crate::index_lookup`) and
//! `build_contigua` (`crate::contiguon`) both walk tables of these,
//! treating the third field as a sample number for time-series data and
//! as a frame number for video — the layouts are unified here rather
//! than kept as two near-duplicate 24-byte structs.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::sentinels::{FRAME_NUMBER_NO_ENTRY, SAMPLE_NUMBER_NO_ENTRY};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// One entry in a record, time-series, or video index table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset into the corresponding data file. Negative marks a
    /// discontinuity at the transition into the block/record this
    /// entry locates; the real offset is the absolute value.
    pub file_offset: i64,
    /// Start time of the block/record, in µUTC.
    pub start_time: i64,
    /// Start sample number (time-series/record index) or start frame
    /// number (video index), session-absolute.
    pub start_sample_or_frame: i64,
}

impl IndexEntry {
    /// A terminal entry one past the last real entry: its `start_time`/
    /// `start_sample_or_frame` give the "end" of the table (total
    /// samples/frames), and it never itself denotes a discontinuity.
    #[must_use]
    pub const fn terminal(end_time: i64, total_samples_or_frames: i64) -> Self {
        Self {
            file_offset: 0,
            start_time: end_time,
            start_sample_or_frame: total_samples_or_frames,
        }
    }

    /// The real (non-negative) file offset, ignoring the discontinuity sign bit.
    #[must_use]
    pub fn real_offset(&self) -> u64 {
        self.file_offset.unsigned_abs()
    }

    /// Whether this entry marks a discontinuity at its own start.
    #[must_use]
    pub const fn is_discontinuity(&self) -> bool {
        self.file_offset < 0
    }

    /// Start frame number, for a video index entry.
    #[must_use]
    pub fn start_frame_number(&self) -> u32 {
        if self.start_sample_or_frame < 0 {
            FRAME_NUMBER_NO_ENTRY
        } else {
            self.start_sample_or_frame as u32
        }
    }

    /// Whether the sample/frame field is unset.
    #[must_use]
    pub fn has_sample_or_frame(&self) -> bool {
        self.start_sample_or_frame != SAMPLE_NUMBER_NO_ENTRY
    }
}

impl Encode for IndexEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i64::<LittleEndian>(self.file_offset)?;
        writer.write_i64::<LittleEndian>(self.start_time)?;
        writer.write_i64::<LittleEndian>(self.start_sample_or_frame)?;
        Ok(())
    }
}

impl Decode for IndexEntry {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            file_offset: reader.read_i64::<LittleEndian>()?,
            start_time: reader.read_i64::<LittleEndian>()?,
            start_sample_or_frame: reader.read_i64::<LittleEndian>()?,
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
        let e = IndexEntry {
            file_offset: -4096,
            start_time: 1_000,
            start_sample_or_frame: 256,
        };
        let bytes = e.encode_into_vec();
        assert_eq!(bytes.len(), 24);
        let decoded = IndexEntry::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(e, decoded);
        assert!(decoded.is_discontinuity());
        assert_eq!(decoded.real_offset(), 4096);
    }

    #[test]
    fn terminal_entry_is_not_a_discontinuity() {
        let term = IndexEntry::terminal(5_000, 1_000);
        assert!(!term.is_discontinuity());
        assert_eq!(term.start_sample_or_frame, 1_000);
    }
}
