//! File-type dispatch: every MED path ends in a 4-byte ASCII extension that
//! equals (little-endian) the type code stored in that file's Universal
//! Header. This module maps between extensions, type codes, and the
//! directory hierarchy they imply.

use std::path::{Path, PathBuf};

/// One of the recognized MED on-disk member types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FileType {
    /// `.medd` — session directory
    Session,
    /// `.ticd` — time-series channel directory
    TimeSeriesChannel,
    /// `.vicd` — video channel directory
    VideoChannel,
    /// `.tisd` — time-series segment directory
    TimeSeriesSegment,
    /// `.visd` — video segment directory
    VideoSegment,
    /// `.tmet` — time-series metadata file
    TimeSeriesMetadata,
    /// `.vmet` — video metadata file
    VideoMetadata,
    /// `.tdat` — time-series compressed data file
    TimeSeriesData,
    /// `.tidx` — time-series index file
    TimeSeriesIndex,
    /// `.vidx` — video index file
    VideoIndex,
    /// `.rdat` — record data file
    RecordData,
    /// `.ridx` — record index file
    RecordIndex,
}

impl FileType {
    /// Returns the path extension (without dot) for this type.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Session => "medd",
            Self::TimeSeriesChannel => "ticd",
            Self::VideoChannel => "vicd",
            Self::TimeSeriesSegment => "tisd",
            Self::VideoSegment => "visd",
            Self::TimeSeriesMetadata => "tmet",
            Self::VideoMetadata => "vmet",
            Self::TimeSeriesData => "tdat",
            Self::TimeSeriesIndex => "tidx",
            Self::VideoIndex => "vidx",
            Self::RecordData => "rdat",
            Self::RecordIndex => "ridx",
        }
    }

    /// Returns the 4-byte little-endian type code stored in the Universal
    /// Header of files of this type (directories have no header but still
    /// carry a nominal code for dispatch purposes).
    #[must_use]
    pub const fn type_code(self) -> [u8; 4] {
        // The code is just the ASCII extension bytes, matching source order.
        let ext = self.extension().as_bytes();
        [ext[0], ext[1], ext[2], ext[3]]
    }

    /// Looks up a [`FileType`] from a 4-byte type code.
    #[must_use]
    pub fn from_type_code(code: [u8; 4]) -> Option<Self> {
        Self::all().into_iter().find(|t| t.type_code() == code)
    }

    /// Looks up a [`FileType`] from a path's extension, case-insensitively
    /// is an explicit choice this crate makes (see Design Notes on
    /// `find_metadata_file`'s case sensitivity ambiguity): extensions are
    /// matched exactly as written, lowercase, on all platforms.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.extension() == ext)
    }

    /// Returns whether this type denotes a directory member of the tree
    /// (session/channel/segment) rather than a regular file.
    #[must_use]
    pub const fn is_directory(self) -> bool {
        matches!(
            self,
            Self::Session
                | Self::TimeSeriesChannel
                | Self::VideoChannel
                | Self::TimeSeriesSegment
                | Self::VideoSegment
        )
    }

    /// Returns whether this type is part of the video hierarchy.
    #[must_use]
    pub const fn is_video(self) -> bool {
        matches!(
            self,
            Self::VideoChannel | Self::VideoSegment | Self::VideoMetadata | Self::VideoIndex
        )
    }

    /// Returns whether this type is part of the time-series hierarchy.
    #[must_use]
    pub const fn is_time_series(self) -> bool {
        matches!(
            self,
            Self::TimeSeriesChannel
                | Self::TimeSeriesSegment
                | Self::TimeSeriesMetadata
                | Self::TimeSeriesData
                | Self::TimeSeriesIndex
        )
    }

    fn all() -> [Self; 12] {
        [
            Self::Session,
            Self::TimeSeriesChannel,
            Self::VideoChannel,
            Self::TimeSeriesSegment,
            Self::VideoSegment,
            Self::TimeSeriesMetadata,
            Self::VideoMetadata,
            Self::TimeSeriesData,
            Self::TimeSeriesIndex,
            Self::VideoIndex,
            Self::RecordData,
            Self::RecordIndex,
        ]
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Classifies a path by its extension.
///
/// Returns `None` if the path has no extension recognized as a MED member.
#[must_use]
pub fn classify(path: &Path) -> Option<FileType> {
    let ext = path.extension()?.to_str()?;
    FileType::from_extension(ext)
}

/// Ascends from `path` until a session-level (`.medd`) directory is found,
/// returning its path. Mismatched/unrecognized extensions along the way are
/// an error, per the "Path parsing reconstructs hierarchy ... mismatched
/// codes trigger errors" rule.
pub fn find_session_root(path: &Path) -> crate::error::Result<PathBuf> {
    let mut current = if path.is_dir() || classify(path).map_or(true, FileType::is_directory) {
        path.to_path_buf()
    } else {
        path.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| crate::error::Error::NotMed(path.to_path_buf()))?
    };

    loop {
        match classify(&current) {
            Some(FileType::Session) => return Ok(current),
            Some(t) if t.is_directory() => {
                current = current
                    .parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| crate::error::Error::NotMed(path.to_path_buf()))?;
            }
            _ => return Err(crate::error::Error::NotMed(path.to_path_buf())),
        }
    }
}
