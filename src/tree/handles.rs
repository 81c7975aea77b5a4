//! Arena-index handles into a [`super::session::Session`]'s channel and
//! segment vectors.
//!
//! The source links session → channel → segment (and segment → channel,
//! channel → session) with raw back-pointers, cyclic by construction.
//! Per Design Notes §9 ("cyclic back-references replaced with
//! arena-by-index handles"), this crate never stores a pointer or
//! reference to a sibling/parent tree node; every cross-reference is a
//! small `Copy` handle resolved back through the owning `Session` at the
//! point of use, the same way the teacher's segment IDs
//! (`GlobalSegmentId`) are plain integers resolved through a level
//! manifest rather than held as live references.

/// An index into a [`super::session::Session`]'s channel vector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelHandle(pub(crate) usize);

impl ChannelHandle {
    /// Wraps a raw channel-vector index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw channel-vector index this handle resolves to.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// An index into a [`super::channel::Channel`]'s sparse segment vector.
/// Unlike [`ChannelHandle`], this is *not* the segment's `segment_number`
/// — per the data model, the vector is indexed by
/// `segment_number - first_mapped_segment_number` (spec "Session /
/// Channel / Segment": "indices in the child vector correspond to
/// `segment_number - first_mapped_segment_number`").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SegmentHandle(pub(crate) usize);

impl SegmentHandle {
    /// Wraps a raw segment-vector index (already offset from
    /// `first_mapped_segment_number`).
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw segment-vector index this handle resolves to.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn handles_round_trip_their_index() {
        assert_eq!(ChannelHandle::new(3).index(), 3);
        assert_eq!(SegmentHandle::new(7).index(), 7);
    }

    #[test]
    fn handles_compare_by_index() {
        assert_eq!(ChannelHandle::new(1), ChannelHandle::new(1));
        assert_ne!(ChannelHandle::new(1), ChannelHandle::new(2));
    }
}
