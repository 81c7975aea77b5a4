//! A single segment: the leaf of the Session → Channel → Segment tree.
//!
//! A segment owns the FPSes for its own metadata, its data, and (for
//! time-series channels) its index; record-stream FPSes are optional
//! since not every segment carries records. Per the data model, a
//! segment's `last_access_time` is bumped on every touch so a future
//! eviction policy (not yet needed at this crate's scale) has something
//! to key on, mirroring the teacher's `descriptor_table` access-time
//! bookkeeping.

use std::path::PathBuf;
use std::time::Instant;

use crate::fps::Fps;
use crate::metadata::Metadata;
use crate::time_slice::TimeSlice;

/// One segment directory's worth of open file handles and decoded
/// metadata.
#[derive(Debug)]
pub struct Segment {
    /// The segment's ordinal within its channel, as stamped in its
    /// Universal Headers (not an index into any vector — see
    /// [`super::handles::SegmentHandle`] for the sparse vector index).
    pub segment_number: i32,
    /// Directory holding this segment's files.
    pub path: PathBuf,
    /// The segment's metadata file.
    pub metadata_fps: Fps,
    /// Time-series index file, absent for video segments without one.
    pub index_fps: Option<Fps>,
    /// Time-series or video sample data file.
    pub data_fps: Option<Fps>,
    /// Record data stream, if this segment carries segment-level records.
    pub record_data_fps: Option<Fps>,
    /// Record index stream, paired with `record_data_fps`.
    pub record_index_fps: Option<Fps>,
    /// Decoded metadata sections for this segment.
    pub metadata: Metadata,
    /// This segment's own time bounds, intersected with the session's
    /// requested slice at open time.
    pub slice: TimeSlice,
    last_access_time: Instant,
}

impl Segment {
    /// Builds a segment record from its already-opened FPSes and decoded
    /// metadata.
    #[must_use]
    pub fn new(
        segment_number: i32,
        path: PathBuf,
        metadata_fps: Fps,
        metadata: Metadata,
        slice: TimeSlice,
    ) -> Self {
        Self {
            segment_number,
            path,
            metadata_fps,
            index_fps: None,
            data_fps: None,
            record_data_fps: None,
            record_index_fps: None,
            metadata,
            slice,
            last_access_time: Instant::now(),
        }
    }

    /// Attaches the time-series index FPS opened for this segment.
    pub fn with_index_fps(mut self, fps: Fps) -> Self {
        self.index_fps = Some(fps);
        self
    }

    /// Attaches the sample/frame data FPS opened for this segment.
    pub fn with_data_fps(mut self, fps: Fps) -> Self {
        self.data_fps = Some(fps);
        self
    }

    /// Attaches the record data/index FPS pair opened for this segment.
    pub fn with_record_fps(mut self, data: Fps, index: Fps) -> Self {
        self.record_data_fps = Some(data);
        self.record_index_fps = Some(index);
        self
    }

    /// The instant this segment was last touched by a read or open call.
    #[must_use]
    pub const fn last_access_time(&self) -> Instant {
        self.last_access_time
    }

    /// Bumps `last_access_time` to now.
    pub fn touch(&mut self) {
        self.last_access_time = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_type::FileType;
    use crate::fps::{OpenMode, RawBytes};
    use crate::metadata::{Metadata, Section1, Section2, TimeSeriesSection2};
    use test_log::test;

    fn fps_for(dir: &std::path::Path, file_type: FileType) -> Fps {
        let path = dir.join(format!("seg{}", file_type.extension()));
        Fps::allocate(path, file_type, RawBytes::FullFile, None)
    }

    fn sample_metadata() -> Metadata {
        Metadata {
            section_1: Section1::default(),
            section_2: Some(Section2::TimeSeries(TimeSeriesSection2::default())),
            section_3: None,
        }
    }

    #[test]
    fn touch_advances_last_access_time() {
        let dir = tempfile::tempdir().unwrap();
        let fps = fps_for(dir.path(), FileType::TimeSeriesMetadata);
        let mut segment = Segment::new(
            1,
            dir.path().to_path_buf(),
            fps,
            sample_metadata(),
            TimeSlice::full(),
        );
        let before = segment.last_access_time();
        std::thread::sleep(std::time::Duration::from_millis(1));
        segment.touch();
        assert!(segment.last_access_time() > before);
    }

    #[test]
    fn builder_attaches_optional_fps_slots() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_fps = fps_for(dir.path(), FileType::TimeSeriesMetadata);
        let data_fps = fps_for(dir.path(), FileType::TimeSeriesData);
        let index_fps = fps_for(dir.path(), FileType::TimeSeriesIndex);
        let segment = Segment::new(
            2,
            dir.path().to_path_buf(),
            metadata_fps,
            sample_metadata(),
            TimeSlice::full(),
        )
        .with_data_fps(data_fps)
        .with_index_fps(index_fps);
        assert!(segment.data_fps.is_some());
        assert!(segment.index_fps.is_some());
        assert!(segment.record_data_fps.is_none());
        let _ = OpenMode::Read;
    }
}
