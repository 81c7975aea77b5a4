//! Building a session/channel's `Sgmt` array (spec §4.3 "Sgmt array
//! build") and resolving a [`TimeSlice`] against it via binary search.

use crate::records::Sgmt;
use crate::sentinels::{SAMPLE_NUMBER_NO_ENTRY, SEGMENT_NUMBER_NO_ENTRY, UUTC_NO_ENTRY};
use crate::time_slice::{SliceAnchor, TimeSlice};

/// Which space a range search is performed in. Time takes priority when
/// the caller supplied both a time and a sample/frame bound.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SearchMode {
    /// Search by `start_time`/`end_time`.
    Time,
    /// Search by sample or frame number.
    SampleOrFrame,
}

/// Chooses [`SearchMode`] for a slice: time search whenever any time
/// bound is set, sample/frame search otherwise.
#[must_use]
pub fn get_search_mode(slice: &TimeSlice) -> SearchMode {
    let has_time = slice.start_time != UUTC_NO_ENTRY || slice.end_time != UUTC_NO_ENTRY;
    if has_time {
        SearchMode::Time
    } else {
        SearchMode::SampleOrFrame
    }
}

/// Source of a `Sgmt` array, tried in priority order by
/// [`build_sgmt_array`] (spec §4.3's three-way fallback). Each tier is
/// supplied by the caller (the open pipeline), since producing one
/// requires file I/O this module has no access to.
pub trait SgmtArraySource {
    /// Tier 1: entries already read from a records index/data file pair
    /// (`REC_Sgmt` type code), in full or via targeted seeks.
    fn from_record_index(&self) -> Option<Vec<Sgmt>>;
    /// Tier 2: channel-level records, used when session-level records
    /// lack sample-number fields (variable-frequency sessions).
    fn from_channel_records(&self) -> Option<Vec<Sgmt>>;
    /// Tier 3: last resort, fabricated by reading every segment's own
    /// metadata file.
    fn from_segment_metadata_scan(&self) -> Vec<Sgmt>;
}

/// Builds a `Sgmt` array by trying each tier of `source` in priority order.
#[must_use]
pub fn build_sgmt_array(source: &dyn SgmtArraySource) -> Vec<Sgmt> {
    if let Some(sgmts) = source.from_record_index() {
        return sgmts;
    }
    if let Some(sgmts) = source.from_channel_records() {
        return sgmts;
    }
    source.from_segment_metadata_scan()
}

/// Outcome of resolving a slice's bounds against a `Sgmt` array.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResolvedRange {
    /// First segment number in range, or [`SEGMENT_NUMBER_NO_ENTRY`]
    /// when the slice resolves to nothing.
    pub start_segment: i32,
    /// Last segment number in range.
    pub end_segment: i32,
    /// Count of segments spanned.
    pub number_of_segments: i64,
}

impl ResolvedRange {
    const EMPTY: Self = Self {
        start_segment: SEGMENT_NUMBER_NO_ENTRY,
        end_segment: SEGMENT_NUMBER_NO_ENTRY,
        number_of_segments: 0,
    };
}

/// Resolves `slice`'s start/end bounds against `sgmts` (sorted ascending
/// by `start_time`), in the space chosen by `mode`.
///
/// Overflow rules: a target past the last segment's end resolves to
/// [`ResolvedRange::EMPTY`]; a target before the first segment snaps to
/// the first segment.
#[must_use]
pub fn resolve_segment_range(sgmts: &[Sgmt], slice: &TimeSlice, mode: SearchMode) -> ResolvedRange {
    if sgmts.is_empty() {
        return ResolvedRange::EMPTY;
    }

    let (slice_start, slice_end) = match mode {
        SearchMode::Time => (slice.start_time, slice.end_time),
        SearchMode::SampleOrFrame => match slice.anchor {
            SliceAnchor::Samples { start, end } => (start, end),
            SliceAnchor::Frames { start, end } => (i64::from(start), i64::from(end)),
        },
    };

    if slice_start == UUTC_NO_ENTRY && slice_start == SAMPLE_NUMBER_NO_ENTRY {
        return ResolvedRange::EMPTY;
    }

    let last = &sgmts[sgmts.len() - 1];
    let last_end = match mode {
        SearchMode::Time => last.end_time,
        SearchMode::SampleOrFrame => last.end_sample_or_frame,
    };
    if slice_start != UUTC_NO_ENTRY && slice_start > last_end {
        return ResolvedRange::EMPTY;
    }

    let start_idx = find_segment_index(sgmts, slice_start, mode, true);
    let end_idx = find_segment_index(sgmts, slice_end, mode, false);

    let start_idx = start_idx.min(end_idx);
    let end_idx = end_idx.max(start_idx);

    ResolvedRange {
        start_segment: sgmts[start_idx].segment_number,
        end_segment: sgmts[end_idx].segment_number,
        number_of_segments: (end_idx - start_idx + 1) as i64,
    }
}

/// Binary search for the segment containing `target`, snapping to the
/// first segment when `target` precedes all of them and to the last
/// when it's unset (`is_start` picks which extreme an unset bound maps
/// to: the first segment for a slice start, the last for a slice end).
fn find_segment_index(sgmts: &[Sgmt], target: i64, mode: SearchMode, is_start: bool) -> usize {
    if target == UUTC_NO_ENTRY || target == SAMPLE_NUMBER_NO_ENTRY {
        return if is_start { 0 } else { sgmts.len() - 1 };
    }

    let starts_at = |i: usize| match mode {
        SearchMode::Time => sgmts[i].start_time,
        SearchMode::SampleOrFrame => sgmts[i].start_sample_or_frame,
    };
    let ends_at = |i: usize| match mode {
        SearchMode::Time => sgmts[i].end_time,
        SearchMode::SampleOrFrame => sgmts[i].end_sample_or_frame,
    };

    if target < starts_at(0) {
        return 0;
    }

    // partition_point: first index whose start exceeds target, then step back one.
    let split = (0..sgmts.len()).partition_point(|&i| starts_at(i) <= target);
    let candidate = split.saturating_sub(1);

    if ends_at(candidate) < target && candidate + 1 < sgmts.len() {
        candidate + 1
    } else {
        candidate
    }
}
