//! Caller-facing options: level header flags, CRC strictness, and the
//! per-call failure policy that replaces the source's global
//! `behavior_on_fail` stack (see Design Notes).

use bitflags::bitflags;

bitflags! {
    /// Bitfield selecting behavior for a single `open_session`/`open_channel`
    /// call. Mirrors the source's level-header flags field.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct LevelHeaderFlags: u32 {
        /// Opens the session/channel (vs. just inspecting it).
        const OPEN                              = 1 << 0;
        /// Include time-series channels when expanding a session path.
        const INCLUDE_TIME_SERIES_CHANNELS       = 1 << 1;
        /// Include video channels when expanding a session path.
        const INCLUDE_VIDEO_CHANNELS             = 1 << 2;
        /// Map every time-series channel in the session, not just requested ones.
        const MAP_ALL_TIME_SERIES_CHANNELS       = 1 << 3;
        /// Map every video channel in the session, not just requested ones.
        const MAP_ALL_VIDEO_CHANNELS             = 1 << 4;
        /// Map every segment of a channel, not just ones overlapping the slice.
        const MAP_ALL_SEGMENTS                   = 1 << 5;
        /// Build a session-level ephemeral metadata aggregate after opening.
        const GENERATE_EPHEMERAL_DATA            = 1 << 6;
        /// Refresh an already-built ephemeral metadata aggregate.
        const UPDATE_EPHEMERAL_DATA              = 1 << 7;
        /// Marks a channel as part of the caller's active subset.
        const CHANNEL_ACTIVE                     = 1 << 8;
        /// Read only the session records overlapping the requested slice.
        const READ_SLICE_SESSION_RECORDS         = 1 << 9;
        /// Read every session record regardless of slice.
        const READ_FULL_SESSION_RECORDS          = 1 << 10;
        /// Memory-map the session records file instead of reading it fully.
        const MEM_MAP_SESSION_RECORDS            = 1 << 11;
        /// Session records file is itself segmented.
        const SEGMENTED_SESS_RECS                = 1 << 12;
        /// Apply the slice/full/mmap record-read choice at channel level.
        const CHANNEL_RECORDS                    = 1 << 13;
        /// Apply the slice/full/mmap record-read choice at segment level.
        const SEGMENT_RECORDS                    = 1 << 14;
        /// Read only the segment data overlapping the requested slice.
        const READ_SLICE_SEGMENT_DATA            = 1 << 15;
        /// Read the full segment data file regardless of slice.
        const READ_FULL_SEGMENT_DATA             = 1 << 16;
        /// Memory-map the segment data file instead of reading it fully.
        const MEM_MAP_SEGMENT_DATA               = 1 << 17;
        /// Read the segment's metadata file.
        const READ_SEGMENT_METADATA              = 1 << 18;
        /// Recompute CPS overlay pointers after a reallocation.
        const RESET_CPS_POINTERS                 = 1 << 19;
    }
}

/// How strictly CRC mismatches are treated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum CrcMode {
    /// Validate every CRC encountered, on every read.
    #[default]
    Validate,
    /// Validate only CRCs on data freshly read from disk (not cached
    /// buffers revisited by a later call).
    ValidateOnInput,
    /// Never validate CRCs.
    Off,
}

/// What a failed fallible operation should do, in place of the source's
/// global `behavior_on_fail` stack (Design Notes: "replace with per-call
/// options structs... retain suppress-on-error as a field on the call
/// options").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum FailBehavior {
    /// Propagate the failure to the caller as an `Err`.
    #[default]
    PropagateError,
    /// Log the failure and continue with partial/default data.
    Suppress,
}

/// Options threaded explicitly through `open_session`/`open_channel`/
/// `read_time_series_data`, in place of the source's global flags bitmask
/// plus behavior-on-fail stack.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Level header flags controlling which channels/segments are mapped.
    pub flags: LevelHeaderFlags,
    /// CRC validation strictness.
    pub crc_mode: CrcMode,
    /// Failure policy for recoverable errors encountered during open/read.
    pub fail_behavior: FailBehavior,
    /// Password to attempt, if the session may be encrypted.
    pub password: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            flags: LevelHeaderFlags::OPEN
                | LevelHeaderFlags::INCLUDE_TIME_SERIES_CHANNELS
                | LevelHeaderFlags::INCLUDE_VIDEO_CHANNELS
                | LevelHeaderFlags::READ_SLICE_SEGMENT_DATA
                | LevelHeaderFlags::READ_SEGMENT_METADATA,
            crc_mode: CrcMode::default(),
            fail_behavior: FailBehavior::default(),
            password: None,
        }
    }
}

impl OpenOptions {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password to attempt against the session's validation fields.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the level header flags directly.
    #[must_use]
    pub fn flags(mut self, flags: LevelHeaderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the CRC validation mode.
    #[must_use]
    pub fn crc_mode(mut self, mode: CrcMode) -> Self {
        self.crc_mode = mode;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn fail_behavior(mut self, behavior: FailBehavior) -> Self {
        self.fail_behavior = behavior;
        self
    }
}
