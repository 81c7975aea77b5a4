//! Sentinel values used throughout the Universal Header, indices, and slices
//! to mark "no entry" / "not applicable" fields, mirroring the source
//! format's constants.

/// Marks an unset microsecond-UTC timestamp field.
pub const UUTC_NO_ENTRY: i64 = i64::MIN;

/// Marks an unset sample-number field.
pub const SAMPLE_NUMBER_NO_ENTRY: i64 = i64::MIN;

/// Marks an unset frame-number field.
pub const FRAME_NUMBER_NO_ENTRY: u32 = u32::MAX;

/// Marks an unset segment-number field.
pub const SEGMENT_NUMBER_NO_ENTRY: i32 = i32::MIN;

/// Marks an unset 64-bit UID field.
pub const UID_NO_ENTRY: u64 = 0;

/// Marks an unset CRC field (not computed / not checked).
pub const CRC_NO_ENTRY: u32 = 0;

/// Marks an unset sampling-frequency field.
pub const FREQUENCY_NO_ENTRY: f64 = -1.0;

/// Marks a session/channel whose segments do not share one sampling frequency.
pub const FREQUENCY_VARIABLE: f64 = -2.0;

/// Selects the earliest possible time, used to request "from the start".
pub const BEGINNING_OF_TIME: i64 = i64::MIN + 1;

/// Selects the latest possible time, used to request "to the end".
pub const END_OF_TIME: i64 = i64::MAX;

/// Selects the last sample number, used to request "to the end" in sample space.
pub const END_OF_SAMPLE_NUMBERS: i64 = i64::MAX;

/// Marks a [`crate::time_slice::TimeSlice`] that resolves to no data at all.
pub const EMPTY_SLICE_SEGMENT_COUNT: i64 = 0;

/// Sentinel segment number used for a session-level (rather than
/// channel- or segment-level) Universal Header.
pub const UH_SESSION_LEVEL_SEGMENT_NUMBER: i32 = -1;

/// Sentinel segment number used for a channel-level Universal Header.
pub const UH_CHANNEL_LEVEL_SEGMENT_NUMBER: i32 = -2;

/// Number of bytes of a SHA-256 digest compared against a password
/// validation field.
pub const PASSWORD_VALIDATION_FIELD_BYTES: usize = 16;

/// Width in bytes of the AES-128 terminal-byte seed derived from a password.
pub const TERMINAL_BYTES_LEN: usize = 16;
