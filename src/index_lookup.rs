//! `find_index` (spec §4.4): locating the index entry that contains a
//! given time or sample/frame target within a single segment's index
//! table, without scanning from the start every time.
//!
//! The source jumps directly to an estimated entry using the segment's
//! (near-)constant block duration or sample count, then walks linearly
//! forward or backward to land on the exact entry — faster than a full
//! binary search when blocks are regular, and still correct when they
//! are not (variable block sizes just mean more linear steps).

use crate::index_entry::IndexEntry;
use crate::sentinels::{SAMPLE_NUMBER_NO_ENTRY, UUTC_NO_ENTRY};

/// Which space `find_index` searches in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexSearchMode {
    /// Search by `start_time`.
    Time,
    /// Search by `start_sample_or_frame`.
    SampleOrFrame,
}

/// How `find_index` should behave when `target` falls outside every
/// entry's range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Snap to the nearest valid entry (first entry for underflow, the
    /// terminal entry for overflow).
    Snap,
    /// Return `None` instead of snapping (spec: "return `NO_INDEX` when
    /// `NO_OVERFLOWS` is requested for index lookup").
    NoOverflows,
}

/// Finds the index of the entry in `entries` (ascending, including the
/// terminal sentinel entry one past the last real block/record) that
/// contains `target`, in the space selected by `mode`.
///
/// `entries[i]` is considered to "contain" a target `t` when
/// `value(entries[i]) <= t < value(entries[i+1])`; the terminal entry is
/// never itself returned as a containing entry except under
/// [`OverflowPolicy::Snap`] overflow.
#[must_use]
pub fn find_index(
    entries: &[IndexEntry],
    target: i64,
    mode: IndexSearchMode,
    overflow: OverflowPolicy,
) -> Option<usize> {
    if entries.len() < 2 {
        return None;
    }

    let value = |e: &IndexEntry| match mode {
        IndexSearchMode::Time => e.start_time,
        IndexSearchMode::SampleOrFrame => e.start_sample_or_frame,
    };

    let unset = match mode {
        IndexSearchMode::Time => UUTC_NO_ENTRY,
        IndexSearchMode::SampleOrFrame => SAMPLE_NUMBER_NO_ENTRY,
    };
    if target == unset {
        return None;
    }

    let n_blocks = entries.len() - 1;
    #[allow(clippy::indexing_slicing)]
    let first = value(&entries[0]);
    #[allow(clippy::indexing_slicing)]
    let last = value(&entries[n_blocks]);

    if target < first {
        return match overflow {
            OverflowPolicy::Snap => Some(0),
            OverflowPolicy::NoOverflows => None,
        };
    }
    if target >= last {
        return match overflow {
            OverflowPolicy::Snap => Some(n_blocks - 1),
            OverflowPolicy::NoOverflows => None,
        };
    }

    // Direct jump estimate assuming a roughly constant block duration /
    // sample count, then walk to the exact entry.
    let span = (last - first).max(1);
    #[allow(clippy::cast_precision_loss)]
    let estimate = (((target - first) as f64 / span as f64) * n_blocks as f64) as usize;
    let mut idx = estimate.min(n_blocks - 1);

    #[allow(clippy::indexing_slicing)]
    while idx > 0 && value(&entries[idx]) > target {
        idx -= 1;
    }
    #[allow(clippy::indexing_slicing)]
    while idx + 1 < n_blocks && value(&entries[idx + 1]) <= target {
        idx += 1;
    }

    Some(idx)
}
