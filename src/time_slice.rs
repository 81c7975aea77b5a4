//! [`TimeSlice`] and its conditioning: normalizing a caller-supplied
//! request (absolute/relative times, sample numbers, or frame numbers)
//! into canonical session-absolute bounds.

use crate::sentinels::{
    BEGINNING_OF_TIME, END_OF_TIME, SAMPLE_NUMBER_NO_ENTRY, SEGMENT_NUMBER_NO_ENTRY,
    UUTC_NO_ENTRY,
};

/// Sample/frame numbering for a [`TimeSlice`], realized as a tagged sum
/// type in place of the source's overlapping-union fields (Design Notes).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SliceAnchor {
    /// Time-series sample-number bounds.
    Samples {
        /// First sample, inclusive (or [`SAMPLE_NUMBER_NO_ENTRY`]).
        start: i64,
        /// Last sample, inclusive (or [`SAMPLE_NUMBER_NO_ENTRY`]).
        end: i64,
    },
    /// Video frame-number bounds.
    Frames {
        /// First frame, inclusive (or `u32::MAX` for unset).
        start: u32,
        /// Last frame, inclusive (or `u32::MAX` for unset).
        end: u32,
    },
}

impl Default for SliceAnchor {
    fn default() -> Self {
        Self::Samples {
            start: SAMPLE_NUMBER_NO_ENTRY,
            end: SAMPLE_NUMBER_NO_ENTRY,
        }
    }
}

/// A requested (or resolved) span over a session, in time and in
/// sample/frame space simultaneously.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeSlice {
    /// Start time in µUTC, a sentinel, or a non-positive session-relative
    /// offset (see [`condition_time_slice`]).
    pub start_time: i64,
    /// End time in µUTC, a sentinel, or a non-positive session-relative
    /// offset.
    pub end_time: i64,
    /// Sample- or frame-space bounds.
    pub anchor: SliceAnchor,
    /// First segment number covered by this slice, once resolved.
    pub start_segment: i32,
    /// Last segment number covered by this slice, once resolved.
    pub end_segment: i32,
    /// Number of segments covered, once resolved.
    pub number_of_segments: i64,
    /// Whether [`condition_time_slice`] has normalized this slice already.
    pub conditioned: bool,
}

impl Default for TimeSlice {
    fn default() -> Self {
        Self {
            start_time: UUTC_NO_ENTRY,
            end_time: UUTC_NO_ENTRY,
            anchor: SliceAnchor::default(),
            start_segment: SEGMENT_NUMBER_NO_ENTRY,
            end_segment: SEGMENT_NUMBER_NO_ENTRY,
            number_of_segments: 0,
            conditioned: false,
        }
    }
}

impl TimeSlice {
    /// A slice spanning the session's entire extent.
    #[must_use]
    pub fn full() -> Self {
        Self {
            start_time: BEGINNING_OF_TIME,
            end_time: END_OF_TIME,
            ..Self::default()
        }
    }

    /// A slice with explicit, already-absolute time bounds.
    #[must_use]
    pub fn from_times(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            ..Self::default()
        }
    }

    /// Whether this slice resolves to no data at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start_segment == SEGMENT_NUMBER_NO_ENTRY
    }
}

/// Normalizes a caller-supplied slice's time bounds against the session's
/// recording-time offset, per spec §4.3:
///
/// - If `start_time` is unset and no sample-space start is given, it
///   becomes [`BEGINNING_OF_TIME`].
/// - If `start_time <= 0` (and not itself a sentinel), it is a relative
///   offset: "N µs before session start".
/// - Otherwise, if `start_time - recording_time_offset > 0`, the caller
///   passed an un-offset wall-clock µUTC, so the offset is subtracted.
///
/// The same three rules apply symmetrically to `end_time`. Idempotent:
/// conditioning an already-conditioned slice is a no-op (spec §8 property 5).
#[must_use]
pub fn condition_time_slice(
    mut slice: TimeSlice,
    session_start_time: i64,
    recording_time_offset: i64,
) -> TimeSlice {
    if slice.conditioned {
        return slice;
    }

    let has_sample_start = matches!(
        slice.anchor,
        SliceAnchor::Samples { start, .. } if start != SAMPLE_NUMBER_NO_ENTRY
    ) || matches!(
        slice.anchor,
        SliceAnchor::Frames { start, .. } if start != u32::MAX
    );

    if slice.start_time == UUTC_NO_ENTRY && !has_sample_start {
        slice.start_time = BEGINNING_OF_TIME;
    } else if slice.start_time != UUTC_NO_ENTRY
        && slice.start_time != BEGINNING_OF_TIME
        && slice.start_time <= 0
    {
        slice.start_time = session_start_time + slice.start_time;
    } else if slice.start_time != UUTC_NO_ENTRY
        && slice.start_time != BEGINNING_OF_TIME
        && slice.start_time - recording_time_offset > 0
    {
        slice.start_time -= recording_time_offset;
    }

    let has_sample_end = matches!(
        slice.anchor,
        SliceAnchor::Samples { end, .. } if end != SAMPLE_NUMBER_NO_ENTRY
    ) || matches!(
        slice.anchor,
        SliceAnchor::Frames { end, .. } if end != u32::MAX
    );

    if slice.end_time == UUTC_NO_ENTRY && !has_sample_end {
        slice.end_time = END_OF_TIME;
    } else if slice.end_time != UUTC_NO_ENTRY
        && slice.end_time != END_OF_TIME
        && slice.end_time <= 0
    {
        slice.end_time = session_start_time + slice.end_time;
    } else if slice.end_time != UUTC_NO_ENTRY
        && slice.end_time != END_OF_TIME
        && slice.end_time - recording_time_offset > 0
    {
        slice.end_time -= recording_time_offset;
    }

    slice.conditioned = true;
    slice
}
