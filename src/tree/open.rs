//! Session open pipeline (spec §4.7): normalizing the caller's input into
//! a set of channel directories, resolving global timing and password
//! access, and opening each channel's segments within the requested
//! slice.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::aes::Aes128Key;
use crate::coding::Decode;
use crate::error::{Error, Result};
use crate::file_type::{self, FileType};
use crate::fps::{Fps, OpenMode, RawBytes};
use crate::fs::{FileSystem, StdFileSystem};
use crate::metadata::{Metadata, Section1, Section2};
use crate::options::{FailBehavior, LevelHeaderFlags, OpenOptions};
use crate::password::{self, AccessLevel};
use crate::records::Sgmt;
use crate::segment_resolution::{self, SgmtArraySource};
use crate::sentinels::SEGMENT_NUMBER_NO_ENTRY;
use crate::time_slice::{condition_time_slice, TimeSlice};
use crate::universal_header::{UniversalHeader, HEADER_SIZE};

use super::channel::Channel;
use super::ephemeral;
use super::segment::Segment;
use super::session::Session;

/// Normalizes the caller's channel request (spec §4.7 step 1: "a
/// directory path, a regex, a channel list, or a segment path") into a
/// per-channel-name predicate.
pub enum ChannelSelector {
    /// Every channel the session/type filters allow.
    All,
    /// Only channels whose name exactly matches one in this list.
    Names(Vec<String>),
    /// Only channels whose name matches this pattern.
    Pattern(Regex),
}

impl ChannelSelector {
    fn matches(&self, channel_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.iter().any(|n| n == channel_name),
            Self::Pattern(re) => re.is_match(channel_name),
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

const fn metadata_file_type(channel_type: FileType) -> FileType {
    match channel_type {
        FileType::VideoChannel => FileType::VideoMetadata,
        _ => FileType::TimeSeriesMetadata,
    }
}

const fn segment_file_type(channel_type: FileType) -> FileType {
    match channel_type {
        FileType::VideoChannel => FileType::VideoSegment,
        _ => FileType::TimeSeriesSegment,
    }
}

const fn index_file_type(channel_type: FileType) -> FileType {
    match channel_type {
        FileType::VideoChannel => FileType::VideoIndex,
        _ => FileType::TimeSeriesIndex,
    }
}

/// Video channels have no dedicated sample-data file type; frames live
/// entirely behind the index.
const fn data_file_type(channel_type: FileType) -> Option<FileType> {
    match channel_type {
        FileType::VideoChannel => None,
        _ => Some(FileType::TimeSeriesData),
    }
}

fn list_dirs_of_type(parent: &Path, file_type: FileType) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = StdFileSystem::read_dir(parent)?
        .into_iter()
        .filter(|entry| entry.is_dir() && file_type::classify(entry.path()) == Some(file_type))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    paths.sort();
    Ok(paths)
}

fn find_file_of_type(dir: &Path, file_type: FileType) -> Result<PathBuf> {
    StdFileSystem::read_dir(dir)?
        .into_iter()
        .find(|entry| !entry.is_dir() && file_type::classify(entry.path()) == Some(file_type))
        .map(|entry| entry.path().to_path_buf())
        .ok_or(Error::NoEntry)
}

/// Opens `path` (or `RawBytes::FullFile` for a metadata read) and parses
/// its Universal Header, leaving the `Fps` for the caller to keep or drop.
fn open_header_only(path: PathBuf, file_type: FileType, options: &OpenOptions) -> Result<Fps> {
    let mut fps = Fps::allocate(path, file_type, RawBytes::UniversalHeaderOnly, None);
    fps.open(OpenMode::Read)?;
    fps.read(options.crc_mode)?;
    Ok(fps)
}

fn read_metadata_file(
    path: PathBuf,
    file_type: FileType,
    options: &OpenOptions,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<(UniversalHeader, Metadata, Fps)> {
    let mut fps = Fps::allocate(path, file_type, RawBytes::FullFile, None);
    fps.open(OpenMode::Read)?;
    fps.read(options.crc_mode)?;
    let header = fps
        .universal_header()
        .cloned()
        .ok_or(Error::InvalidHeader("metadata file missing universal header"))?;

    let body = &fps.buffer()[HEADER_SIZE..];
    let metadata = match Metadata::read_body(&mut Cursor::new(body), level_1_key, level_2_key) {
        Ok(metadata) => metadata,
        // Spec §7: a password failure "surfaces hints ... but does not
        // abort the open" — section 1 is always plaintext, so fall back
        // to it alone rather than propagating the section-2 decrypt
        // failure out of the whole open pipeline. Any other failure
        // (corrupt bytes, I/O error) still propagates.
        Err(Error::NoMetadata(_)) => Metadata {
            section_1: Section1::decode_from(&mut Cursor::new(body))?,
            section_2: None,
            section_3: None,
        },
        Err(err) => return Err(err),
    };
    Ok((header, metadata, fps))
}

/// Derives a channel's per-segment `Sgmt` entry from a segment's already
/// decoded header and metadata (the tier-3 fallback of spec §4.3's
/// three-way Sgmt-array build, used since no session/channel record
/// stream is modeled here).
fn fabricate_sgmt(header: &UniversalHeader, metadata: &Metadata) -> Sgmt {
    let (start, end, frequency) = match metadata.section_2.as_ref() {
        Some(Section2::TimeSeries(ts)) => {
            let start = ts.absolute_start_sample_number;
            let end = if ts.number_of_samples > 0 {
                start + ts.number_of_samples - 1
            } else {
                start
            };
            (start, end, ts.sampling_frequency)
        }
        Some(Section2::Video(v)) => {
            let end = if v.number_of_frames > 0 { v.number_of_frames - 1 } else { 0 };
            (0, end, v.frame_rate)
        }
        None => (
            crate::sentinels::SAMPLE_NUMBER_NO_ENTRY,
            crate::sentinels::SAMPLE_NUMBER_NO_ENTRY,
            crate::sentinels::FREQUENCY_NO_ENTRY,
        ),
    };

    Sgmt {
        start_time: header.segment_start_time,
        end_time: header.segment_end_time,
        start_sample_or_frame: start,
        end_sample_or_frame: end,
        sampling_frequency: frequency,
        uid: header.segment_uid,
        segment_number: header.segment_number,
    }
}

struct ScanOnlySource(Vec<Sgmt>);

impl SgmtArraySource for ScanOnlySource {
    fn from_record_index(&self) -> Option<Vec<Sgmt>> {
        None
    }

    fn from_channel_records(&self) -> Option<Vec<Sgmt>> {
        None
    }

    fn from_segment_metadata_scan(&self) -> Vec<Sgmt> {
        self.0.clone()
    }
}

struct ScannedSegment {
    dir: PathBuf,
    header: UniversalHeader,
    metadata: Metadata,
    metadata_fps: Fps,
}

/// Lists every mapped channel path for `session_root`, tagged with its
/// type and whether the caller's selector actively requested it (spec
/// §4.7 steps 1–3).
fn list_mapped_channels(
    session_root: &Path,
    selector: &ChannelSelector,
    flags: LevelHeaderFlags,
) -> Result<Vec<(PathBuf, FileType, bool)>> {
    let mut mapped = Vec::new();

    for entry in StdFileSystem::read_dir(session_root)? {
        if !entry.is_dir() {
            continue;
        }
        let Some(channel_type) = file_type::classify(entry.path()) else {
            continue;
        };
        let (included, map_all) = match channel_type {
            FileType::TimeSeriesChannel => (
                flags.contains(LevelHeaderFlags::INCLUDE_TIME_SERIES_CHANNELS),
                flags.contains(LevelHeaderFlags::MAP_ALL_TIME_SERIES_CHANNELS),
            ),
            FileType::VideoChannel => (
                flags.contains(LevelHeaderFlags::INCLUDE_VIDEO_CHANNELS),
                flags.contains(LevelHeaderFlags::MAP_ALL_VIDEO_CHANNELS),
            ),
            _ => continue,
        };
        if !included {
            continue;
        }

        let requested = selector.matches(&stem(entry.path()));
        if requested || map_all {
            mapped.push((entry.path().to_path_buf(), channel_type, requested));
        }
    }

    mapped.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(mapped)
}

/// Reads the first mapped channel's first segment's Universal Header
/// only, to derive session-wide identity and password access (spec §4.7
/// step 1's implicit prerequisite: these fields are identical across
/// every file in the session).
fn open_globals(
    mapped: &[(PathBuf, FileType, bool)],
    options: &OpenOptions,
) -> Result<(u64, i64, Option<Aes128Key>, Option<Aes128Key>, AccessLevel)> {
    let (channel_path, channel_type, _) = mapped.first().ok_or(Error::NoEntry)?;
    let segment_dirs = list_dirs_of_type(channel_path, segment_file_type(*channel_type))?;
    let first_segment = segment_dirs.first().ok_or(Error::NoEntry)?;
    let metadata_path = find_file_of_type(first_segment, metadata_file_type(*channel_type))?;
    let fps = open_header_only(metadata_path, metadata_file_type(*channel_type), options)?;
    let header = fps
        .universal_header()
        .ok_or(Error::InvalidHeader("missing universal header"))?;

    let (level_1_key, level_2_key, access_level) = match options.password.as_deref() {
        Some(p) => {
            let data = password::process_password(
                p,
                &header.level_1_password_validation_field,
                &header.level_2_password_validation_field,
            );
            (data.level_1_key(), data.level_2_key(), data.access_level)
        }
        None => (None, None, AccessLevel::None),
    };

    Ok((header.session_uid, header.session_start_time, level_1_key, level_2_key, access_level))
}

/// Reads just enough of the reference channel's first segment to learn
/// its `recording_time_offset` (spec §4.7 step 4).
fn reference_recording_offset(
    channel_path: &Path,
    channel_type: FileType,
    options: &OpenOptions,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<i64> {
    let segment_dirs = list_dirs_of_type(channel_path, segment_file_type(channel_type))?;
    let Some(first_segment) = segment_dirs.first() else {
        return Ok(0);
    };
    let metadata_path = find_file_of_type(first_segment, metadata_file_type(channel_type))?;
    let (_, metadata, _) = read_metadata_file(metadata_path, metadata_file_type(channel_type), options, level_1_key, level_2_key)?;
    Ok(metadata.section_3.map(|s| s.recording_time_offset).unwrap_or(0))
}

fn pick_reference(mapped: &[(PathBuf, FileType, bool)]) -> Option<&(PathBuf, FileType, bool)> {
    mapped
        .iter()
        .find(|(_, channel_type, active)| *active && *channel_type == FileType::TimeSeriesChannel)
        .or_else(|| mapped.iter().find(|(_, _, active)| *active))
}

/// Opens every segment directory under `channel_path` that falls inside
/// `session_slice`, or every segment if `MAP_ALL_SEGMENTS` is set (spec
/// §4.7 step 6).
fn open_channel(
    channel_path: &Path,
    channel_type: FileType,
    active: bool,
    session_slice: &TimeSlice,
    options: &OpenOptions,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<Channel> {
    let mut scanned = Vec::new();
    for dir in list_dirs_of_type(channel_path, segment_file_type(channel_type))? {
        let metadata_path = find_file_of_type(&dir, metadata_file_type(channel_type))?;
        let (header, metadata, metadata_fps) =
            read_metadata_file(metadata_path, metadata_file_type(channel_type), options, level_1_key, level_2_key)?;
        scanned.push(ScannedSegment { dir, header, metadata, metadata_fps });
    }
    scanned.sort_by_key(|s| s.header.segment_number);

    if scanned.is_empty() {
        return Err(Error::NoEntry);
    }

    let channel_metadata = {
        let refs: Vec<&Metadata> = scanned.iter().map(|s| &s.metadata).collect();
        ephemeral::merge_metadata(&refs)?
    };

    let fabricated: Vec<Sgmt> = scanned.iter().map(|s| fabricate_sgmt(&s.header, &s.metadata)).collect();
    let sgmt = segment_resolution::build_sgmt_array(&ScanOnlySource(fabricated));

    let mode = segment_resolution::get_search_mode(session_slice);
    let resolved = segment_resolution::resolve_segment_range(&sgmt, session_slice, mode);
    let map_all_segments = options.flags.contains(LevelHeaderFlags::MAP_ALL_SEGMENTS);

    let in_range = |segment_number: i32| {
        map_all_segments
            || (resolved.start_segment != SEGMENT_NUMBER_NO_ENTRY
                && segment_number >= resolved.start_segment
                && segment_number <= resolved.end_segment)
    };

    let opened_bounds = sgmt.iter().filter(|s| in_range(s.segment_number)).fold(
        None,
        |acc: Option<(i64, i64)>, s| match acc {
            Some((start, end)) => Some((start.min(s.start_time), end.max(s.end_time))),
            None => Some((s.start_time, s.end_time)),
        },
    );

    let mut channel_slice = *session_slice;
    if let Some((start, end)) = opened_bounds {
        channel_slice.start_time = start;
        channel_slice.end_time = end;
    }

    let first_mapped_segment_number = if map_all_segments {
        scanned.first().map_or(SEGMENT_NUMBER_NO_ENTRY, |s| s.header.segment_number)
    } else {
        resolved.start_segment
    };

    let mut channel = Channel::new(
        stem(channel_path),
        channel_path.to_path_buf(),
        channel_type,
        active,
        channel_metadata,
        sgmt,
        first_mapped_segment_number,
        channel_slice,
    );

    for segment in scanned {
        if !in_range(segment.header.segment_number) {
            continue;
        }

        let mut built = Segment::new(
            segment.header.segment_number,
            segment.dir.clone(),
            segment.metadata_fps,
            segment.metadata,
            channel_slice,
        );

        if let Ok(index_path) = find_file_of_type(&segment.dir, index_file_type(channel_type)) {
            built = built.with_index_fps(open_header_only(index_path, index_file_type(channel_type), options)?);
        }
        if let Some(data_type) = data_file_type(channel_type) {
            if let Ok(data_path) = find_file_of_type(&segment.dir, data_type) {
                built = built.with_data_fps(open_header_only(data_path, data_type, options)?);
            }
        }

        channel.insert_segment(built)?;
    }

    Ok(channel)
}

/// Opens a session rooted at `input` (a session directory, or any path
/// underneath one — resolved via [`file_type::find_session_root`]),
/// mapping the channels `selector` picks out over `requested_slice`
/// (spec §4.7, the full eight-step pipeline).
pub fn open_session(
    input: &Path,
    selector: &ChannelSelector,
    requested_slice: TimeSlice,
    options: &OpenOptions,
) -> Result<Session> {
    let session_root = file_type::find_session_root(input)?;

    let mapped = list_mapped_channels(&session_root, selector, options.flags)?;
    if mapped.is_empty() {
        return Err(Error::Inconsistent("no channels matched the requested selector"));
    }

    let (session_uid, session_start_time, level_1_key, level_2_key, access_level) = open_globals(&mapped, options)?;
    // Spec §7: a password failure "does not abort the open — decrypted
    // sections simply remain inaccessible". `access_level` travels on
    // `Session` so callers can tell E3 (both sections decrypt) from E4
    // (open succeeds, section 1 hints readable, decode fails fast)
    // without the open itself erroring out.

    let recording_time_offset = match pick_reference(&mapped) {
        Some((path, channel_type, _)) => {
            reference_recording_offset(path, *channel_type, options, level_1_key.as_ref(), level_2_key.as_ref())?
        }
        None => 0,
    };

    let mut session = Session::new(stem(&session_root), session_root.clone(), session_uid, session_start_time);
    session.recording_time_offset = recording_time_offset;
    session.slice = condition_time_slice(requested_slice, session_start_time, recording_time_offset);
    session.access_level = access_level;

    let mut reference_handle = None;
    for (path, channel_type, active) in &mapped {
        let channel = open_channel(
            path,
            *channel_type,
            *active,
            &session.slice,
            options,
            level_1_key.as_ref(),
            level_2_key.as_ref(),
        );
        let channel = match channel {
            Ok(c) => c,
            Err(e) if options.fail_behavior == FailBehavior::Suppress => {
                log::warn!("{}: failed to open channel: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e),
        };

        let is_ts = channel.file_type == FileType::TimeSeriesChannel;
        let channel_active = channel.active;
        let handle = session.push_channel(channel);

        if channel_active {
            let better = match reference_handle {
                None => true,
                Some(h) => is_ts && session.channel(h).file_type != FileType::TimeSeriesChannel,
            };
            if better {
                reference_handle = Some(handle);
            }
        }
    }

    session.reference_channel = reference_handle;
    session.intersect_active_channel_bounds()?;

    if options.flags.contains(LevelHeaderFlags::GENERATE_EPHEMERAL_DATA) {
        let active_metadata: Vec<&Metadata> = session.active_channels().map(|(_, c)| &c.metadata).collect();
        session.ephemeral_metadata = Some(ephemeral::merge_metadata(&active_metadata)?);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Encode;
    use crate::metadata::{EncryptionLevel, EncryptionState, Section1, Section3, TimeSeriesSection2};
    use crate::options::CrcMode;
    use crate::password::terminal_bytes;
    use crate::sentinels::PASSWORD_VALIDATION_FIELD_BYTES;
    use crate::sha256::hash;
    use tempfile::TempDir;
    use test_log::test;

    fn length_prefixed(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + bytes.len());
        out.extend_from_slice(&u32::try_from(bytes.len()).expect("fixture section fits u32").to_le_bytes());
        out.extend_from_slice(bytes);
        out
    }

    fn pad_to_block(mut bytes: Vec<u8>) -> Vec<u8> {
        let padded = bytes.len().div_ceil(16) * 16;
        bytes.resize(padded, 0);
        bytes
    }

    fn validation_field(terminal: [u8; 16]) -> [u8; PASSWORD_VALIDATION_FIELD_BYTES] {
        let digest = hash(&terminal);
        let mut out = [0u8; PASSWORD_VALIDATION_FIELD_BYTES];
        out.copy_from_slice(&digest[..PASSWORD_VALIDATION_FIELD_BYTES]);
        out
    }

    fn xor16(a: [u8; 16], b: &[u8; 16]) -> [u8; 16] {
        let mut out = a;
        for (o, bb) in out.iter_mut().zip(b.iter()) {
            *o ^= *bb;
        }
        out
    }

    /// Derives the Universal Header's `(level_1_field, level_2_field)` pair
    /// that [`crate::password::process_password`] expects for a session
    /// whose level-1 password is `l1_password` and, if present, whose
    /// level-2 password is `l2_password` — the same construction
    /// `password::tests::l2_password_round_trip_yields_both_keys` uses, run
    /// here to build on-disk fixtures instead of in-memory ones.
    fn password_fields(l1_password: &str, l2_password: Option<&str>) -> ([u8; 16], [u8; 16]) {
        let l1_term = terminal_bytes(l1_password);
        let l1_field = validation_field(l1_term);
        let l2_field = match l2_password {
            Some(l2_password) => {
                let l2_term = terminal_bytes(l2_password);
                let h2 = hash(&l2_term);
                let mut h2_16 = [0u8; 16];
                h2_16.copy_from_slice(&h2[..16]);
                xor16(l1_term, &h2_16)
            }
            None => [0u8; 16],
        };
        (l1_field, l2_field)
    }

    fn encrypt_with(level: EncryptionLevel, level_1_key: Option<&Aes128Key>, level_2_key: Option<&Aes128Key>, bytes: &mut [u8]) {
        let key = match level {
            EncryptionLevel::Level1 => level_1_key,
            EncryptionLevel::Level2 => level_2_key,
            EncryptionLevel::NoEncryption => None,
        }
        .expect("fixture asked to encrypt a section without supplying its key");
        key.encrypt_blocks_in_place(bytes);
    }

    struct FixtureSegment {
        segment_number: i32,
        start_time: i64,
        end_time: i64,
        metadata: Metadata,
    }

    fn time_series_metadata(sampling_frequency: f64, start_sample: i64, n_samples: i64) -> Metadata {
        Metadata {
            section_1: Section1::default(),
            section_2: Some(Section2::TimeSeries(TimeSeriesSection2 {
                sampling_frequency,
                absolute_start_sample_number: start_sample,
                number_of_samples: n_samples,
                ..TimeSeriesSection2::default()
            })),
            section_3: Some(Section3::default()),
        }
    }

    /// Writes one segment's metadata file under `channel_dir`, encrypting
    /// section 2/3 in place (per `segment.metadata.section_1`'s own stated
    /// levels) the same way [`crate::metadata::tests`] builds its encrypted
    /// fixtures — just spread across a real directory tree instead of a
    /// single in-memory buffer, since this is exercising the directory-walk
    /// half of the open pipeline, not just `Metadata::read_body`.
    fn write_segment(
        channel_dir: &Path,
        channel_name: &str,
        channel_type: FileType,
        session_uid: u64,
        session_start_time: i64,
        level_1_field: [u8; 16],
        level_2_field: [u8; 16],
        segment: &FixtureSegment,
        level_1_key: Option<&Aes128Key>,
        level_2_key: Option<&Aes128Key>,
    ) {
        let segment_dir = channel_dir.join(format!("{channel_name}_{}.tisd", segment.segment_number));
        std::fs::create_dir_all(&segment_dir).unwrap();

        let section_1 = segment.metadata.section_1.clone();

        let mut section_2_bytes = pad_to_block(
            segment
                .metadata
                .section_2
                .as_ref()
                .expect("fixture segments always carry section 2")
                .encode_into_vec(),
        );
        if section_1.section_2_encryption.requires_key() {
            encrypt_with(section_1.section_2_encryption.level, level_1_key, level_2_key, &mut section_2_bytes);
        }

        let mut section_3_bytes = pad_to_block(
            segment
                .metadata
                .section_3
                .as_ref()
                .map(Encode::encode_into_vec)
                .unwrap_or_default(),
        );
        if section_1.section_3_encryption.requires_key() {
            encrypt_with(section_1.section_3_encryption.level, level_1_key, level_2_key, &mut section_3_bytes);
        }

        let mut body = section_1.encode_into_vec();
        body.extend(length_prefixed(&section_2_bytes));
        body.extend(length_prefixed(&section_3_bytes));

        let mut header = UniversalHeader::new(metadata_file_type(channel_type));
        header.session_name = "session".to_string();
        header.channel_name = channel_name.to_string();
        header.session_uid = session_uid;
        header.channel_uid = session_uid.wrapping_add(1);
        header.segment_uid = header.channel_uid.wrapping_add(u64::try_from(segment.segment_number).unwrap_or(0));
        header.session_start_time = session_start_time;
        header.segment_start_time = segment.start_time;
        header.segment_end_time = segment.end_time;
        header.segment_number = segment.segment_number;
        header.level_1_password_validation_field = level_1_field;
        header.level_2_password_validation_field = level_2_field;
        header.compute_body_crc(&body);
        header.compute_header_crc();

        let mut file_bytes = header.encode_into_vec();
        file_bytes.extend(body);
        std::fs::write(segment_dir.join(format!("{channel_name}.tmet")), file_bytes).unwrap();
    }

    fn write_channel(
        session_root: &Path,
        channel_name: &str,
        session_uid: u64,
        session_start_time: i64,
        level_1_field: [u8; 16],
        level_2_field: [u8; 16],
        segments: &[FixtureSegment],
        level_1_key: Option<&Aes128Key>,
        level_2_key: Option<&Aes128Key>,
    ) {
        let channel_dir = session_root.join(format!("{channel_name}.ticd"));
        std::fs::create_dir_all(&channel_dir).unwrap();
        for segment in segments {
            write_segment(
                &channel_dir,
                channel_name,
                FileType::TimeSeriesChannel,
                session_uid,
                session_start_time,
                level_1_field,
                level_2_field,
                segment,
                level_1_key,
                level_2_key,
            );
        }
    }

    /// Writes a segment's `.tidx`/`.tdat` pair: a single MBE block of
    /// `samples`, encrypted at `level` with `key`, plus an index covering
    /// it start-to-end. Lets a test open a real session and then attempt
    /// a real block decode against it, instead of stopping at metadata.
    fn write_segment_data_files(
        channel_dir: &Path,
        channel_name: &str,
        segment_number: i32,
        start_time: i64,
        samples: &[u8],
        level: EncryptionLevel,
        key: &Aes128Key,
    ) {
        use crate::cmp::{BlockFixedHeader, BlockFlags, ParameterFlags, FIXED_HEADER_SIZE};
        use crate::index_entry::IndexEntry;
        use byteorder::{LittleEndian, WriteBytesExt};

        fn pack_bits(values: &[u8], bits: u32) -> Vec<u8> {
            let total_bits = values.len() * bits as usize;
            let mut bytes = vec![0u8; total_bits.div_ceil(8)];
            let mut bit_pos = 0usize;
            for &v in values {
                for i in 0..bits {
                    let pos = bit_pos + i as usize;
                    if (u64::from(v) >> i) & 1 == 1 {
                        bytes[pos / 8] |= 1 << (pos % 8);
                    }
                }
                bit_pos += bits as usize;
            }
            bytes
        }

        let mut model = Vec::new();
        model.write_u8(0).unwrap(); // flags
        model.write_u8(0).unwrap(); // derivative_level
        model.write_u8(8).unwrap(); // bits_per_sample
        model.write_u8(0).unwrap(); // reserved
        model.write_i64::<LittleEndian>(0).unwrap(); // baseline_offset
        model.extend(pack_bits(samples, 8));
        let padded_len = model.len().div_ceil(16) * 16;
        model.resize(padded_len, 0);

        let encryption_flag = match level {
            EncryptionLevel::Level1 => BlockFlags::ENCRYPTION_LEVEL_1,
            EncryptionLevel::Level2 => BlockFlags::ENCRYPTION_LEVEL_2,
            EncryptionLevel::NoEncryption => BlockFlags::empty(),
        };

        let header = BlockFixedHeader {
            block_start_uid: 1,
            block_crc: 0,
            block_flags: BlockFlags::ALGORITHM_MBE | encryption_flag,
            start_time,
            acquisition_channel_number: 0,
            total_block_bytes: (FIXED_HEADER_SIZE + model.len()) as u32,
            number_of_samples: samples.len() as u32,
            number_of_records: 0,
            record_region_bytes: 0,
            parameter_flags: ParameterFlags::empty(),
            parameter_region_bytes: 0,
            protected_region_bytes: 0,
            discretionary_region_bytes: 0,
            model_region_bytes: model.len() as u32,
            total_header_bytes: FIXED_HEADER_SIZE as u32,
        };

        key.encrypt_blocks_in_place(&mut model);

        let mut block = header.encode_into_vec();
        block.extend(model);

        let segment_dir = channel_dir.join(format!("{channel_name}_{segment_number}.tisd"));
        std::fs::create_dir_all(&segment_dir).unwrap();

        let mut data_bytes = UniversalHeader::new(FileType::TimeSeriesData).encode_into_vec();
        data_bytes.extend(block);
        std::fs::write(segment_dir.join(format!("{channel_name}.tdat")), data_bytes).unwrap();

        let entries = [
            IndexEntry { file_offset: 0, start_time, start_sample_or_frame: 0 },
            IndexEntry::terminal(start_time + samples.len() as i64, samples.len() as i64),
        ];
        let mut index_header = UniversalHeader::new(FileType::TimeSeriesIndex);
        index_header.number_of_entries = entries.len() as i64;
        let mut index_bytes = index_header.encode_into_vec();
        for entry in &entries {
            index_bytes.extend(entry.encode_into_vec());
        }
        std::fs::write(segment_dir.join(format!("{channel_name}.tidx")), index_bytes).unwrap();
    }

    fn new_session_root(tmp: &TempDir) -> PathBuf {
        let session_root = tmp.path().join("session.medd");
        std::fs::create_dir_all(&session_root).unwrap();
        session_root
    }

    fn open_options_mapping_everything() -> OpenOptions {
        OpenOptions::new().flags(
            LevelHeaderFlags::OPEN
                | LevelHeaderFlags::INCLUDE_TIME_SERIES_CHANNELS
                | LevelHeaderFlags::INCLUDE_VIDEO_CHANNELS
                | LevelHeaderFlags::MAP_ALL_TIME_SERIES_CHANNELS
                | LevelHeaderFlags::READ_SLICE_SEGMENT_DATA
                | LevelHeaderFlags::READ_SEGMENT_METADATA
                | LevelHeaderFlags::MAP_ALL_SEGMENTS,
        )
    }

    #[test]
    fn opens_unencrypted_multi_segment_channel_and_maps_every_segment() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let segments = vec![
            FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata: time_series_metadata(512.0, 0, 1000) },
            FixtureSegment { segment_number: 1, start_time: 2_000, end_time: 2_999, metadata: time_series_metadata(512.0, 1000, 1000) },
            FixtureSegment { segment_number: 2, start_time: 3_000, end_time: 3_999, metadata: time_series_metadata(512.0, 2000, 1000) },
        ];
        write_channel(&session_root, "eeg1", 42, 1_000, [0; 16], [0; 16], &segments, None, None);

        let session = open_session(&session_root, &ChannelSelector::All, TimeSlice::full(), &open_options_mapping_everything()).unwrap();

        assert_eq!(session.channels().len(), 1);
        let channel = &session.channels()[0];
        assert_eq!(channel.segments().count(), 3);
        assert!(channel.active);
    }

    #[test]
    fn missing_segment_number_leaves_a_gap_instead_of_erroring() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        // Segment 1 is never written: only 0 and 2 exist on disk.
        let segments = vec![
            FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata: time_series_metadata(512.0, 0, 1000) },
            FixtureSegment { segment_number: 2, start_time: 3_000, end_time: 3_999, metadata: time_series_metadata(512.0, 2000, 1000) },
        ];
        write_channel(&session_root, "eeg1", 7, 1_000, [0; 16], [0; 16], &segments, None, None);

        let session = open_session(&session_root, &ChannelSelector::All, TimeSlice::full(), &open_options_mapping_everything()).unwrap();

        let channel = &session.channels()[0];
        let numbers: Vec<i32> = channel.segments().map(|s| s.segment_number).collect();
        assert_eq!(numbers, vec![0, 2]);

        let gap = channel.handle_for_segment_number(1).unwrap();
        assert!(channel.segment(gap).is_none());
    }

    #[test]
    fn wrong_password_against_a_guarded_session_opens_but_fails_to_decode() {
        use crate::password::{process_password, AccessLevel};
        use crate::read::read_channel_samples;

        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let (l1_field, l2_field) = password_fields("correcthorse", None);
        let l1_key = Aes128Key::new(terminal_bytes("correcthorse"));

        let mut metadata = time_series_metadata(512.0, 0, 10);
        metadata.section_1.section_2_encryption = EncryptionState { level: EncryptionLevel::Level1, decrypted: false };

        let segments = vec![FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata }];
        write_channel(&session_root, "eeg1", 9, 1_000, l1_field, l2_field, &segments, Some(&l1_key), None);
        write_segment_data_files(
            &session_root.join("eeg1.ticd"),
            "eeg1",
            0,
            1_000,
            &[10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
            EncryptionLevel::Level1,
            &l1_key,
        );

        // Spec §7 (E4): a password that unlocks nothing "does not abort
        // the open" — section 1 stays readable and the open succeeds.
        // The failure only surfaces once something tries to actually use
        // the (missing) key, i.e. at block-decode time.
        let options = open_options_mapping_everything().password("totally wrong").crc_mode(CrcMode::Off);
        let mut session = open_session(&session_root, &ChannelSelector::All, TimeSlice::full(), &options).unwrap();
        assert_eq!(session.access_level, AccessLevel::None);

        let handle = session.reference_channel.expect("eeg1 is active and time-series");
        let channel = session.channel_mut(handle);
        assert!(!channel.metadata.has_section_2());

        // The test derives its own (non-)key the same way `open_session`
        // does internally, since a bad password's keys aren't carried on
        // `Session` — there is nothing to carry.
        let bad_password = process_password("totally wrong", &l1_field, &l2_field);
        assert_eq!(bad_password.access_level, AccessLevel::None);

        let err = read_channel_samples(
            channel,
            &TimeSlice::full(),
            options.crc_mode,
            bad_password.level_1_key().as_ref(),
            bad_password.level_2_key().as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadPassword));
    }

    #[test]
    fn correct_level_1_password_unlocks_section_2_but_not_section_3() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let (l1_field, l2_field) = password_fields("correcthorse", Some("batterystaple"));
        let l1_key = Aes128Key::new(terminal_bytes("correcthorse"));
        let l2_key = Aes128Key::new(terminal_bytes("batterystaple"));

        let mut metadata = time_series_metadata(512.0, 0, 1000);
        metadata.section_1.section_2_encryption = EncryptionState { level: EncryptionLevel::Level1, decrypted: false };
        metadata.section_1.section_3_encryption = EncryptionState { level: EncryptionLevel::Level2, decrypted: false };

        let segments = vec![FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata }];
        write_channel(&session_root, "eeg1", 11, 1_000, l1_field, l2_field, &segments, Some(&l1_key), Some(&l2_key));

        let options = open_options_mapping_everything().password("correcthorse");
        let session = open_session(&session_root, &ChannelSelector::All, TimeSlice::full(), &options).unwrap();

        let channel = &session.channels()[0];
        assert!(channel.metadata.has_section_2());
        assert!(channel.metadata.section_3.is_none());
    }

    #[test]
    fn correct_level_2_password_unlocks_both_sections() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let (l1_field, l2_field) = password_fields("correcthorse", Some("batterystaple"));
        let l1_key = Aes128Key::new(terminal_bytes("correcthorse"));
        let l2_key = Aes128Key::new(terminal_bytes("batterystaple"));

        let mut metadata = time_series_metadata(512.0, 0, 1000);
        metadata.section_1.section_2_encryption = EncryptionState { level: EncryptionLevel::Level1, decrypted: false };
        metadata.section_1.section_3_encryption = EncryptionState { level: EncryptionLevel::Level2, decrypted: false };
        metadata.section_3 = Some(Section3 { subject_id: "subject-001".to_string(), ..Section3::default() });

        let segments = vec![FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata }];
        write_channel(&session_root, "eeg1", 13, 1_000, l1_field, l2_field, &segments, Some(&l1_key), Some(&l2_key));

        let options = open_options_mapping_everything().password("batterystaple");
        let session = open_session(&session_root, &ChannelSelector::All, TimeSlice::full(), &options).unwrap();

        let channel = &session.channels()[0];
        assert_eq!(channel.metadata.section_3.as_ref().map(|s| s.subject_id.as_str()), Some("subject-001"));
    }

    #[test]
    fn channel_selector_pattern_narrows_the_active_set_but_not_the_mapped_set() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let segments = vec![FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata: time_series_metadata(512.0, 0, 1000) }];
        write_channel(&session_root, "eeg1", 21, 1_000, [0; 16], [0; 16], &segments, None, None);
        write_channel(&session_root, "emg1", 21, 1_000, [0; 16], [0; 16], &segments, None, None);

        let selector = ChannelSelector::Pattern(Regex::new("^eeg").unwrap());
        let session = open_session(&session_root, &selector, TimeSlice::full(), &open_options_mapping_everything()).unwrap();

        // MAP_ALL_TIME_SERIES_CHANNELS maps both, but only the regex match is active.
        assert_eq!(session.channels().len(), 2);
        let active_names: Vec<&str> = session.active_channels().map(|(_, c)| c.name.as_str()).collect();
        assert_eq!(active_names, vec!["eeg1"]);
    }

    #[test]
    fn selector_matching_no_channel_without_map_all_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        let session_root = new_session_root(&tmp);

        let segments = vec![FixtureSegment { segment_number: 0, start_time: 1_000, end_time: 1_999, metadata: time_series_metadata(512.0, 0, 1000) }];
        write_channel(&session_root, "eeg1", 5, 1_000, [0; 16], [0; 16], &segments, None, None);

        let selector = ChannelSelector::Names(vec!["nonexistent".to_string()]);
        let err = open_session(&session_root, &selector, TimeSlice::full(), &OpenOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }
}
