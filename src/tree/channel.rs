//! A channel: the directory of segments under a session, plus the
//! channel-level `Sgmt` array that resolves a time slice to a segment
//! range (spec §3, §4.3).

use std::path::PathBuf;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::file_type::FileType;
use crate::metadata::Metadata;
use crate::records::Sgmt;
use crate::time_slice::TimeSlice;

use super::handles::SegmentHandle;
use super::segment::Segment;

/// One channel's worth of segments, sparsely mapped by segment number.
#[derive(Debug)]
pub struct Channel {
    /// Channel name (the directory's stem, without the `.ticd`/`.vicd`
    /// extension).
    pub name: String,
    /// Channel directory path.
    pub path: PathBuf,
    /// Whether this is a time-series or video channel.
    pub file_type: FileType,
    /// Whether this channel is in the session's requested active set
    /// (`CHANNEL_ACTIVE`, spec §6) as opposed to merely mapped because
    /// `MAP_ALL_*_CHANNELS` was set.
    pub active: bool,
    /// Channel-level metadata (sections 1–3), read once at open time.
    pub metadata: Metadata,
    /// The channel's `Sgmt` array, built by [`crate::segment_resolution::build_sgmt_array`].
    pub sgmt: Vec<Sgmt>,
    /// Sparse segment vector: index `i` holds the segment whose number is
    /// `first_mapped_segment_number + i`, or `None` if that segment
    /// wasn't mapped (spec "Session / Channel / Segment": "indices in
    /// the child vector correspond to `segment_number -
    /// first_mapped_segment_number`").
    segments: Vec<Option<Segment>>,
    /// The segment number that index `0` of `segments` corresponds to.
    pub first_mapped_segment_number: i32,
    /// This channel's effective time bounds, the intersection of the
    /// requested slice with what this channel actually has on disk.
    pub slice: TimeSlice,
    last_access_time: Instant,
}

impl Channel {
    /// Builds an empty channel shell ready to receive mapped segments.
    #[must_use]
    pub fn new(
        name: String,
        path: PathBuf,
        file_type: FileType,
        active: bool,
        metadata: Metadata,
        sgmt: Vec<Sgmt>,
        first_mapped_segment_number: i32,
        slice: TimeSlice,
    ) -> Self {
        Self {
            name,
            path,
            file_type,
            active,
            metadata,
            sgmt,
            segments: Vec::new(),
            first_mapped_segment_number,
            slice,
            last_access_time: Instant::now(),
        }
    }

    /// The handle for `segment_number`, if it falls within the mapped
    /// range (it may still resolve to an unmapped slot — see
    /// [`Self::segment`]).
    #[must_use]
    pub fn handle_for_segment_number(&self, segment_number: i32) -> Option<SegmentHandle> {
        let offset = segment_number.checked_sub(self.first_mapped_segment_number)?;
        usize::try_from(offset).ok().map(SegmentHandle::new)
    }

    /// Inserts `segment` at the sparse slot implied by its own
    /// `segment_number`, growing the vector as needed.
    pub fn insert_segment(&mut self, segment: Segment) -> Result<SegmentHandle> {
        let handle = self
            .handle_for_segment_number(segment.segment_number)
            .ok_or(Error::Inconsistent("segment number precedes first mapped segment"))?;
        if handle.index() >= self.segments.len() {
            self.segments.resize_with(handle.index() + 1, || None);
        }
        self.segments[handle.index()] = Some(segment);
        Ok(handle)
    }

    /// Looks up a mapped segment by handle. Returns `None` both for an
    /// out-of-range handle and for an in-range slot that was never
    /// mapped (sparse mapping, spec §4.7 step 6: "each channel opens
    /// only segments in the slice").
    #[must_use]
    pub fn segment(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.segments.get(handle.index())?.as_ref()
    }

    /// Mutable variant of [`Self::segment`].
    pub fn segment_mut(&mut self, handle: SegmentHandle) -> Option<&mut Segment> {
        self.segments.get_mut(handle.index())?.as_mut()
    }

    /// Iterates over every mapped segment, in ascending segment-number
    /// order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter_map(Option::as_ref)
    }

    /// The instant this channel was last touched.
    #[must_use]
    pub const fn last_access_time(&self) -> Instant {
        self.last_access_time
    }

    /// Bumps `last_access_time` to now.
    pub fn touch(&mut self) {
        self.last_access_time = Instant::now();
    }
}
