//! Ephemeral metadata: a field-wise merge of every active channel's
//! metadata into one consensus structure, built when
//! `GENERATE_EPHEMERAL_DATA` is requested (spec §4.7 step 8).
//!
//! Fields identical across every input are kept. Fields that disagree
//! are zeroed to their type's "no entry" sentinel rather than silently
//! picking one channel's value — a caller asking for ephemeral data
//! wants to know which fields are actually session-wide constants.
//! Two fields are explicit numeric aggregates instead of an
//! identical-or-sentinel comparison, per spec: `number_of_samples`
//! (and the video analogue `number_of_frames`) take the max across
//! channels, `absolute_start_sample_number` takes the min.

use crate::error::{Error, Result};
use crate::metadata::{Metadata, Section2, TimeSeriesSection2, VideoSection2};
use crate::sentinels::{FREQUENCY_NO_ENTRY, FRAME_NUMBER_NO_ENTRY, SAMPLE_NUMBER_NO_ENTRY};

fn merge_f64(values: impl Iterator<Item = f64>) -> f64 {
    let mut values = values;
    let Some(first) = values.next() else {
        return FREQUENCY_NO_ENTRY;
    };
    if values.all(|v| v == first) {
        first
    } else {
        FREQUENCY_NO_ENTRY
    }
}

fn merge_i64(values: impl Iterator<Item = i64>) -> i64 {
    let mut values = values;
    let Some(first) = values.next() else {
        return SAMPLE_NUMBER_NO_ENTRY;
    };
    if values.all(|v| v == first) {
        first
    } else {
        SAMPLE_NUMBER_NO_ENTRY
    }
}

fn merge_u32(values: impl Iterator<Item = u32>) -> u32 {
    let mut values = values;
    let Some(first) = values.next() else {
        return FRAME_NUMBER_NO_ENTRY;
    };
    if values.all(|v| v == first) {
        first
    } else {
        FRAME_NUMBER_NO_ENTRY
    }
}

fn merge_string<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut values = values;
    let Some(first) = values.next() else {
        return String::new();
    };
    if values.all(|v| v == first) {
        first.to_string()
    } else {
        String::new()
    }
}

/// Merges a set of time-series section 2 structures field-wise.
#[must_use]
pub fn merge_time_series(sections: &[TimeSeriesSection2]) -> TimeSeriesSection2 {
    TimeSeriesSection2 {
        sampling_frequency: merge_f64(sections.iter().map(|s| s.sampling_frequency)),
        absolute_start_sample_number: sections
            .iter()
            .map(|s| s.absolute_start_sample_number)
            .filter(|&v| v != SAMPLE_NUMBER_NO_ENTRY)
            .min()
            .unwrap_or(SAMPLE_NUMBER_NO_ENTRY),
        number_of_samples: sections.iter().map(|s| s.number_of_samples).max().unwrap_or(0),
        number_of_blocks: merge_i64(sections.iter().map(|s| s.number_of_blocks)),
        maximum_block_bytes: merge_i64(sections.iter().map(|s| s.maximum_block_bytes)),
        maximum_block_samples: merge_u32(sections.iter().map(|s| s.maximum_block_samples)),
        low_frequency_filter_setting: merge_f64(sections.iter().map(|s| s.low_frequency_filter_setting)),
        high_frequency_filter_setting: merge_f64(sections.iter().map(|s| s.high_frequency_filter_setting)),
        notch_filter_frequency: merge_f64(sections.iter().map(|s| s.notch_filter_frequency)),
        ac_line_frequency: merge_f64(sections.iter().map(|s| s.ac_line_frequency)),
        units_conversion_factor: merge_f64(sections.iter().map(|s| s.units_conversion_factor)),
        units_description: merge_string(sections.iter().map(|s| s.units_description.as_str())),
    }
}

/// Merges a set of video section 2 structures field-wise. `number_of_frames`
/// is the video analogue of `number_of_samples` and is likewise an
/// aggregate maximum rather than an identical-or-sentinel comparison.
#[must_use]
pub fn merge_video(sections: &[VideoSection2]) -> VideoSection2 {
    VideoSection2 {
        frame_rate: merge_f64(sections.iter().map(|s| s.frame_rate)),
        horizontal_resolution: merge_u32(sections.iter().map(|s| s.horizontal_resolution)),
        vertical_resolution: merge_u32(sections.iter().map(|s| s.vertical_resolution)),
        number_of_clips: merge_i64(sections.iter().map(|s| s.number_of_clips)),
        number_of_frames: sections.iter().map(|s| s.number_of_frames).max().unwrap_or(0),
    }
}

/// Merges a set of active channels' metadata into one ephemeral
/// [`Metadata`]. Every channel must share the same section-2 kind
/// (all time-series or all video) — mixing them is the caller's error,
/// since the partition by `INCLUDE_TIME_SERIES_CHANNELS`/
/// `INCLUDE_VIDEO_CHANNELS` (spec §4.7 step 2) should have already
/// separated them before this is called.
pub fn merge_metadata(per_channel: &[&Metadata]) -> Result<Metadata> {
    let Some(first) = per_channel.first() else {
        return Err(Error::Inconsistent("no channels to merge ephemeral metadata from"));
    };

    let section_2 = {
        let mut time_series = Vec::new();
        let mut video = Vec::new();
        for metadata in per_channel {
            match metadata.section_2.as_ref() {
                Some(Section2::TimeSeries(ts)) => time_series.push(*ts),
                Some(Section2::Video(v)) => video.push(*v),
                None => return Err(Error::NoMetadata("channel has no section 2 to merge")),
            }
        }
        match (time_series.is_empty(), video.is_empty()) {
            (false, true) => Section2::TimeSeries(merge_time_series(&time_series)),
            (true, false) => Section2::Video(merge_video(&video)),
            _ => return Err(Error::Inconsistent("cannot merge mixed time-series and video channels")),
        }
    };

    let section_3 = if per_channel
        .iter()
        .all(|m| m.section_3 == first.section_3 && m.section_3.is_some())
    {
        first.section_3.clone()
    } else {
        None
    };

    Ok(Metadata {
        section_1: first.section_1.clone(),
        section_2: Some(section_2),
        section_3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Section1;
    use test_log::test;

    fn metadata_with(ts: TimeSeriesSection2) -> Metadata {
        Metadata {
            section_1: Section1::default(),
            section_2: Some(Section2::TimeSeries(ts)),
            section_3: None,
        }
    }

    #[test]
    fn merging_one_channel_with_itself_is_identity() {
        let mut ts = TimeSeriesSection2::default();
        ts.sampling_frequency = 512.0;
        ts.number_of_samples = 1000;
        let metadata = metadata_with(ts);

        let merged = merge_metadata(&[&metadata, &metadata]).unwrap();
        assert_eq!(merged.section_2, metadata.section_2);
    }

    #[test]
    fn differing_field_is_zeroed_to_sentinel() {
        let mut a = TimeSeriesSection2::default();
        a.sampling_frequency = 512.0;
        a.units_description = "uV".to_string();
        let mut b = a;
        b.sampling_frequency = 256.0;

        let merged = merge_time_series(&[a, b]);
        assert_eq!(merged.sampling_frequency, FREQUENCY_NO_ENTRY);
        assert_eq!(merged.units_description, "uV");
    }

    #[test]
    fn number_of_samples_takes_the_max() {
        let mut a = TimeSeriesSection2::default();
        a.number_of_samples = 100;
        let mut b = TimeSeriesSection2::default();
        b.number_of_samples = 250;

        let merged = merge_time_series(&[a, b]);
        assert_eq!(merged.number_of_samples, 250);
    }

    #[test]
    fn absolute_start_sample_number_takes_the_min() {
        let mut a = TimeSeriesSection2::default();
        a.absolute_start_sample_number = 500;
        let mut b = TimeSeriesSection2::default();
        b.absolute_start_sample_number = 100;

        let merged = merge_time_series(&[a, b]);
        assert_eq!(merged.absolute_start_sample_number, 100);
    }

    #[test]
    fn mixed_time_series_and_video_is_rejected() {
        let ts_metadata = metadata_with(TimeSeriesSection2::default());
        let video_metadata = Metadata {
            section_1: Section1::default(),
            section_2: Some(Section2::Video(VideoSection2::default())),
            section_3: None,
        };
        assert!(merge_metadata(&[&ts_metadata, &video_metadata]).is_err());
    }
}
