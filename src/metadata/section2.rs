//! Metadata section 2: type-specific channel description, either
//! time-series (sampling frequency, filter settings, units conversion,
//! absolute start sample, block statistics) or video (frame rate, pixel
//! dimensions, clip counts) — spec §3.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::sentinels::{FREQUENCY_NO_ENTRY, SAMPLE_NUMBER_NO_ENTRY};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const UNITS_FIELD_LEN: usize = 32;

/// Type-specific metadata section 2.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Section2 {
    /// A time-series channel's section 2.
    TimeSeries(TimeSeriesSection2),
    /// A video channel's section 2.
    Video(VideoSection2),
}

/// Time-series-specific fields of section 2.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeSeriesSection2 {
    /// Sampling frequency in Hz, or [`FREQUENCY_NO_ENTRY`]/
    /// [`crate::sentinels::FREQUENCY_VARIABLE`].
    pub sampling_frequency: f64,
    /// Session-absolute sample number of this channel/segment's first
    /// sample.
    pub absolute_start_sample_number: i64,
    /// Total number of samples.
    pub number_of_samples: i64,
    /// Total number of CMP blocks.
    pub number_of_blocks: i64,
    /// Largest single block size seen, in bytes.
    pub maximum_block_bytes: i64,
    /// Largest single block's sample count.
    pub maximum_block_samples: u32,
    /// Low-frequency (high-pass) filter setting in Hz, or
    /// [`FREQUENCY_NO_ENTRY`] if not applied.
    pub low_frequency_filter_setting: f64,
    /// High-frequency (low-pass) filter setting in Hz.
    pub high_frequency_filter_setting: f64,
    /// Notch filter frequency in Hz, or [`FREQUENCY_NO_ENTRY`].
    pub notch_filter_frequency: f64,
    /// AC line frequency, informational (mains hum rejection hint).
    pub ac_line_frequency: f64,
    /// Multiplies raw sample integers into the channel's physical units.
    pub units_conversion_factor: f64,
    /// Physical units description, e.g. `"uV"`.
    pub units_description: String,
}

impl Default for TimeSeriesSection2 {
    fn default() -> Self {
        Self {
            sampling_frequency: FREQUENCY_NO_ENTRY,
            absolute_start_sample_number: SAMPLE_NUMBER_NO_ENTRY,
            number_of_samples: 0,
            number_of_blocks: 0,
            maximum_block_bytes: 0,
            maximum_block_samples: 0,
            low_frequency_filter_setting: FREQUENCY_NO_ENTRY,
            high_frequency_filter_setting: FREQUENCY_NO_ENTRY,
            notch_filter_frequency: FREQUENCY_NO_ENTRY,
            ac_line_frequency: FREQUENCY_NO_ENTRY,
            units_conversion_factor: 1.0,
            units_description: String::new(),
        }
    }
}

/// Video-specific fields of section 2.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VideoSection2 {
    /// Frame rate in frames per second.
    pub frame_rate: f64,
    /// Frame width, pixels.
    pub horizontal_resolution: u32,
    /// Frame height, pixels.
    pub vertical_resolution: u32,
    /// Number of distinct video clips making up this channel's segments.
    pub number_of_clips: i64,
    /// Total number of frames.
    pub number_of_frames: i64,
}

impl Default for VideoSection2 {
    fn default() -> Self {
        Self {
            frame_rate: FREQUENCY_NO_ENTRY,
            horizontal_resolution: 0,
            vertical_resolution: 0,
            number_of_clips: 0,
            number_of_frames: 0,
        }
    }
}

fn write_units<W: Write>(w: &mut W, s: &str) -> Result<(), EncodeError> {
    let bytes = s.as_bytes();
    if bytes.len() >= UNITS_FIELD_LEN {
        return Err(EncodeError::FieldTooLarge("units_description"));
    }
    let mut buf = vec![0u8; UNITS_FIELD_LEN];
    #[allow(clippy::indexing_slicing)]
    buf[..bytes.len()].copy_from_slice(bytes);
    w.write_all(&buf)?;
    Ok(())
}

fn read_units<R: Read>(r: &mut R) -> Result<String, DecodeError> {
    let mut buf = vec![0u8; UNITS_FIELD_LEN];
    r.read_exact(&mut buf)?;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    #[allow(clippy::indexing_slicing)]
    std::str::from_utf8(&buf[..nul])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8("units_description"))
}

impl Encode for Section2 {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::TimeSeries(ts) => {
                writer.write_u8(0)?;
                writer.write_f64::<LittleEndian>(ts.sampling_frequency)?;
                writer.write_i64::<LittleEndian>(ts.absolute_start_sample_number)?;
                writer.write_i64::<LittleEndian>(ts.number_of_samples)?;
                writer.write_i64::<LittleEndian>(ts.number_of_blocks)?;
                writer.write_i64::<LittleEndian>(ts.maximum_block_bytes)?;
                writer.write_u32::<LittleEndian>(ts.maximum_block_samples)?;
                writer.write_f64::<LittleEndian>(ts.low_frequency_filter_setting)?;
                writer.write_f64::<LittleEndian>(ts.high_frequency_filter_setting)?;
                writer.write_f64::<LittleEndian>(ts.notch_filter_frequency)?;
                writer.write_f64::<LittleEndian>(ts.ac_line_frequency)?;
                writer.write_f64::<LittleEndian>(ts.units_conversion_factor)?;
                write_units(writer, &ts.units_description)?;
            }
            Self::Video(v) => {
                writer.write_u8(1)?;
                writer.write_f64::<LittleEndian>(v.frame_rate)?;
                writer.write_u32::<LittleEndian>(v.horizontal_resolution)?;
                writer.write_u32::<LittleEndian>(v.vertical_resolution)?;
                writer.write_i64::<LittleEndian>(v.number_of_clips)?;
                writer.write_i64::<LittleEndian>(v.number_of_frames)?;
            }
        }
        Ok(())
    }
}

impl Decode for Section2 {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        match tag {
            0 => Ok(Self::TimeSeries(TimeSeriesSection2 {
                sampling_frequency: reader.read_f64::<LittleEndian>()?,
                absolute_start_sample_number: reader.read_i64::<LittleEndian>()?,
                number_of_samples: reader.read_i64::<LittleEndian>()?,
                number_of_blocks: reader.read_i64::<LittleEndian>()?,
                maximum_block_bytes: reader.read_i64::<LittleEndian>()?,
                maximum_block_samples: reader.read_u32::<LittleEndian>()?,
                low_frequency_filter_setting: reader.read_f64::<LittleEndian>()?,
                high_frequency_filter_setting: reader.read_f64::<LittleEndian>()?,
                notch_filter_frequency: reader.read_f64::<LittleEndian>()?,
                ac_line_frequency: reader.read_f64::<LittleEndian>()?,
                units_conversion_factor: reader.read_f64::<LittleEndian>()?,
                units_description: read_units(reader)?,
            })),
            1 => Ok(Self::Video(VideoSection2 {
                frame_rate: reader.read_f64::<LittleEndian>()?,
                horizontal_resolution: reader.read_u32::<LittleEndian>()?,
                vertical_resolution: reader.read_u32::<LittleEndian>()?,
                number_of_clips: reader.read_i64::<LittleEndian>()?,
                number_of_frames: reader.read_i64::<LittleEndian>()?,
            })),
            other => Err(DecodeError::InvalidTag(("Section2", other))),
        }
    }
}

impl Section2 {
    /// Returns the time-series variant, if this is one.
    #[must_use]
    pub const fn as_time_series(&self) -> Option<&TimeSeriesSection2> {
        match self {
            Self::TimeSeries(ts) => Some(ts),
            Self::Video(_) => None,
        }
    }

    /// Returns the video variant, if this is one.
    #[must_use]
    pub const fn as_video(&self) -> Option<&VideoSection2> {
        match self {
            Self::Video(v) => Some(v),
            Self::TimeSeries(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn time_series_round_trips() {
        let mut ts = TimeSeriesSection2::default();
        ts.sampling_frequency = 512.0;
        ts.units_description = "uV".to_string();
        let s = Section2::TimeSeries(ts);

        let bytes = s.encode_into_vec();
        let decoded = Section2::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn video_round_trips() {
        let v = VideoSection2 {
            frame_rate: 30.0,
            horizontal_resolution: 1920,
            vertical_resolution: 1080,
            number_of_clips: 4,
            number_of_frames: 9000,
        };
        let s = Section2::Video(v);

        let bytes = s.encode_into_vec();
        let decoded = Section2::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(s, decoded);
        assert_eq!(decoded.as_video().unwrap().horizontal_resolution, 1920);
    }
}
