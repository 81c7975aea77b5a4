//! Contiguity analysis (spec §4.6): walking a segment's index entries
//! to split a requested slice into maximal gap-free runs.

use crate::index_entry::IndexEntry;
use crate::sentinels::{SAMPLE_NUMBER_NO_ENTRY, SEGMENT_NUMBER_NO_ENTRY};

/// A maximal gap-free run within a slice.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Contiguon {
    /// Start time of the run, µUTC.
    pub start_time: i64,
    /// End time of the run, µUTC.
    pub end_time: i64,
    /// First sample/frame number in the run, or
    /// [`SAMPLE_NUMBER_NO_ENTRY`] for variable-frequency sessions.
    pub start_sample_or_frame: i64,
    /// Last sample/frame number in the run, or
    /// [`SAMPLE_NUMBER_NO_ENTRY`] for variable-frequency sessions.
    pub end_sample_or_frame: i64,
    /// First segment number the run touches.
    pub start_segment: i32,
    /// Last segment number the run touches.
    pub end_segment: i32,
}

/// One index entry tagged with the segment number it was read from, the
/// unit `build_contigua` walks across segment boundaries.
#[derive(Copy, Clone, Debug)]
pub struct SegmentIndexEntry {
    /// The segment this entry came from.
    pub segment_number: i32,
    /// Whether this segment's metadata/data was missing entirely (a
    /// forced discontinuity independent of the entry's own offset sign).
    pub segment_missing: bool,
    /// The underlying index entry. Ignored when `segment_missing` is set.
    pub entry: IndexEntry,
    /// End time of this entry's block/run, i.e. the next entry's start
    /// time (or the segment's end time for the last entry).
    pub entry_end_time: i64,
    /// End sample/frame number of this entry's block, symmetric with
    /// `entry_end_time`.
    pub entry_end_sample_or_frame: i64,
}

/// Walks `entries` (already filtered down to the caller's resolved
/// start/end index range, ordered by segment then by position within
/// segment) and produces the list of maximal gap-free contigua,
/// trimming the first and last to `slice_start`/`slice_end` in time.
///
/// Per spec §9 Design Notes, a discontinuity observed on the very first
/// entry is treated as opening the first contiguon, not as closing one
/// that was never opened (the source's uninitialized-on-first-iteration
/// ambiguity).
#[must_use]
pub fn build_contigua(
    entries: &[SegmentIndexEntry],
    slice_start_time: i64,
    slice_end_time: i64,
) -> Vec<Contiguon> {
    if entries.is_empty() {
        return Vec::new();
    }

    let variable_frequency = entries
        .iter()
        .any(|e| e.entry.start_sample_or_frame == SAMPLE_NUMBER_NO_ENTRY);

    let mut contigua = Vec::new();
    let mut current: Option<Contiguon> = None;

    for (i, seg_entry) in entries.iter().enumerate() {
        let discontinuity = seg_entry.segment_missing || seg_entry.entry.is_discontinuity();

        if discontinuity && i > 0 {
            if let Some(done) = current.take() {
                contigua.push(done);
            }
        }

        if seg_entry.segment_missing {
            current = None;
            continue;
        }

        match current.as_mut() {
            Some(run) => {
                run.end_time = seg_entry.entry_end_time;
                run.end_segment = seg_entry.segment_number;
                if !variable_frequency {
                    run.end_sample_or_frame = seg_entry.entry_end_sample_or_frame;
                }
            }
            None => {
                current = Some(Contiguon {
                    start_time: seg_entry.entry.start_time,
                    end_time: seg_entry.entry_end_time,
                    start_sample_or_frame: if variable_frequency {
                        SAMPLE_NUMBER_NO_ENTRY
                    } else {
                        seg_entry.entry.start_sample_or_frame
                    },
                    end_sample_or_frame: if variable_frequency {
                        SAMPLE_NUMBER_NO_ENTRY
                    } else {
                        seg_entry.entry_end_sample_or_frame
                    },
                    start_segment: seg_entry.segment_number,
                    end_segment: seg_entry.segment_number,
                });
            }
        }
    }

    if let Some(done) = current.take() {
        contigua.push(done);
    }

    if let Some(first) = contigua.first_mut() {
        if first.start_time < slice_start_time {
            first.start_time = slice_start_time;
        }
    }
    if let Some(last) = contigua.last_mut() {
        if last.end_time > slice_end_time {
            last.end_time = slice_end_time;
        }
    }

    contigua
}

impl Default for Contiguon {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: 0,
            start_sample_or_frame: SAMPLE_NUMBER_NO_ENTRY,
            end_sample_or_frame: SAMPLE_NUMBER_NO_ENTRY,
            start_segment: SEGMENT_NUMBER_NO_ENTRY,
            end_segment: SEGMENT_NUMBER_NO_ENTRY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn entry(segment_number: i32, start_time: i64, start_sample: i64) -> SegmentIndexEntry {
        SegmentIndexEntry {
            segment_number,
            segment_missing: false,
            entry: IndexEntry {
                file_offset: 4096,
                start_time,
                start_sample_or_frame: start_sample,
            },
            entry_end_time: start_time + 1_000,
            entry_end_sample_or_frame: start_sample + 100,
        }
    }

    fn discontinuous_entry(segment_number: i32, start_time: i64, start_sample: i64) -> SegmentIndexEntry {
        let mut e = entry(segment_number, start_time, start_sample);
        e.entry.file_offset = -e.entry.file_offset;
        e
    }

    #[test]
    fn single_segment_no_discontinuities_yields_one_contiguon() {
        let entries = vec![entry(1, 0, 0), entry(1, 1_000, 100), entry(1, 2_000, 200)];
        let contigua = build_contigua(&entries, 0, 3_000);
        assert_eq!(contigua.len(), 1);
        assert_eq!(contigua[0].start_time, 0);
        assert_eq!(contigua[0].end_time, 3_000);
        assert_eq!(contigua[0].start_segment, 1);
        assert_eq!(contigua[0].end_segment, 1);
    }

    #[test]
    fn first_block_discontinuity_opens_rather_than_closes() {
        let entries = vec![discontinuous_entry(1, 0, 0), entry(1, 1_000, 100)];
        let contigua = build_contigua(&entries, 0, 2_000);
        assert_eq!(contigua.len(), 1);
        assert_eq!(contigua[0].start_time, 0);
        assert_eq!(contigua[0].end_time, 2_000);
    }

    #[test]
    fn missing_segment_splits_into_two_contigua() {
        let entries = vec![
            entry(1, 0, 0),
            entry(1, 1_000, 100),
            SegmentIndexEntry {
                segment_number: 2,
                segment_missing: true,
                entry: IndexEntry {
                    file_offset: 0,
                    start_time: 0,
                    start_sample_or_frame: 0,
                },
                entry_end_time: 0,
                entry_end_sample_or_frame: 0,
            },
            entry(3, 3_000, 300),
            entry(3, 4_000, 400),
        ];
        let contigua = build_contigua(&entries, -500_000, 4_500 + 500_000);
        assert_eq!(contigua.len(), 2);
        assert_eq!(contigua[0].end_segment, 1);
        assert_eq!(contigua[1].start_segment, 3);
        assert_eq!(contigua[0].start_time, -500_000);
        assert_eq!(contigua[1].end_time, 4_500 + 500_000);
    }

    #[test]
    fn mid_stream_discontinuity_closes_and_reopens_within_segment() {
        let entries = vec![entry(1, 0, 0), discontinuous_entry(1, 5_000, 500)];
        let contigua = build_contigua(&entries, 0, 6_000);
        assert_eq!(contigua.len(), 2);
        assert_eq!(contigua[0].end_time, 1_000);
        assert_eq!(contigua[1].start_time, 5_000);
        assert_eq!(contigua[1].end_time, 6_000);
    }

    #[test]
    fn variable_frequency_sessions_leave_sample_fields_unset() {
        let mut entries = vec![entry(1, 0, 0), entry(1, 1_000, SAMPLE_NUMBER_NO_ENTRY)];
        entries[0].entry.start_sample_or_frame = SAMPLE_NUMBER_NO_ENTRY;
        let contigua = build_contigua(&entries, 0, 2_000);
        assert_eq!(contigua.len(), 1);
        assert_eq!(contigua[0].start_sample_or_frame, SAMPLE_NUMBER_NO_ENTRY);
        assert_eq!(contigua[0].end_sample_or_frame, SAMPLE_NUMBER_NO_ENTRY);
    }
}
