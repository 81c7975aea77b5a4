//! Read pipeline (spec §2 control flow, §4.6): given an open channel and
//! a slice, drive per-segment block decode and merge contributions into
//! gap-free runs.

use std::ops::Range;

use crate::aes::Aes128Key;
use crate::cmp::{self, BlockFixedHeader, FIXED_HEADER_SIZE};
use crate::coding::Decode;
use crate::contiguon::{build_contigua, Contiguon, SegmentIndexEntry};
use crate::error::{Error, Result};
use crate::fps::{Fps, ReadMode};
use crate::index_entry::IndexEntry;
use crate::index_lookup::{find_index, IndexSearchMode, OverflowPolicy};
use crate::metadata::EncryptionLevel;
use crate::options::CrcMode;
use crate::records::Sgmt;
use crate::segment_resolution::{get_search_mode, SearchMode};
use crate::sentinels::SAMPLE_NUMBER_NO_ENTRY;
use crate::time_slice::{SliceAnchor, TimeSlice};
use crate::universal_header::HEADER_SIZE;

use crate::tree::channel::Channel;

/// One gap-free run of decoded samples, paired with the [`Contiguon`]
/// describing its bounds.
#[derive(Debug)]
pub struct SampleRun {
    /// The run's time/sample/segment bounds.
    pub contiguon: Contiguon,
    /// Decoded samples for the run, already trimmed to `contiguon`'s
    /// bounds at both ends.
    pub samples: Vec<i32>,
}

/// Reads every index entry from an already header-opened index FPS.
fn read_index_table(fps: &mut Fps, crc_mode: CrcMode) -> Result<Vec<IndexEntry>> {
    let header = fps
        .universal_header()
        .ok_or(Error::InvalidHeader("index file missing universal header"))?;
    let count = header.number_of_entries.max(0) as usize;
    let body_bytes = count * 24;
    fps.read_range(HEADER_SIZE as u64, body_bytes as u64, ReadMode::Direct, crc_mode)?;

    let mut entries = Vec::with_capacity(count);
    let mut cursor = std::io::Cursor::new(&fps.buffer()[HEADER_SIZE..HEADER_SIZE + body_bytes]);
    for _ in 0..count {
        entries.push(IndexEntry::decode_from(&mut cursor)?);
    }
    Ok(entries)
}

/// Reads and decodes the block located by `entry`, decrypting first if
/// `entry` marks an encrypted block (spec §4.5 step 1).
fn decode_block(
    data_fps: &mut Fps,
    entry: &IndexEntry,
    crc_mode: CrcMode,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<(BlockFixedHeader, Vec<i32>)> {
    let abs_offset = HEADER_SIZE as u64 + entry.real_offset();

    data_fps.read_range(abs_offset, FIXED_HEADER_SIZE as u64, ReadMode::Direct, crc_mode)?;
    let header_bytes = &data_fps.buffer()[abs_offset as usize..abs_offset as usize + FIXED_HEADER_SIZE];
    let header = BlockFixedHeader::decode_from(&mut std::io::Cursor::new(header_bytes))?;

    data_fps.read_range(abs_offset, u64::from(header.total_block_bytes), ReadMode::Direct, crc_mode)?;
    let block_start = abs_offset as usize;
    let block_end = block_start + header.total_block_bytes as usize;
    let mut body = data_fps.buffer()[block_start + FIXED_HEADER_SIZE..block_end].to_vec();

    match header.block_flags.encryption_level() {
        Some(EncryptionLevel::Level1) => {
            let key = level_1_key.ok_or(Error::BadPassword)?;
            cmp::decrypt_region(&mut body, &header, key)?;
        }
        Some(EncryptionLevel::Level2) => {
            let key = level_2_key.ok_or(Error::BadPassword)?;
            cmp::decrypt_region(&mut body, &header, key)?;
        }
        Some(EncryptionLevel::NoEncryption) | None => {}
    }

    let samples = cmp::decode(&header, &body)?;
    Ok((header, samples))
}

/// Target bound in whichever space `mode` selects.
fn slice_bound(slice: &TimeSlice, mode: SearchMode) -> (i64, i64) {
    match mode {
        SearchMode::Time => (slice.start_time, slice.end_time),
        SearchMode::SampleOrFrame => match slice.anchor {
            SliceAnchor::Samples { start, end } => (start, end),
            SliceAnchor::Frames { start, end } => (i64::from(start), i64::from(end)),
        },
    }
}

/// Index-space target for `find_index`, always sample/time-number based
/// regardless of which space the caller's slice was expressed in (a
/// segment's own index table is keyed the same way whether the caller
/// searched by time or by sample).
fn index_target(value: i64, mode: SearchMode) -> (i64, IndexSearchMode) {
    match mode {
        SearchMode::Time => (value, IndexSearchMode::Time),
        SearchMode::SampleOrFrame => (value, IndexSearchMode::SampleOrFrame),
    }
}

/// One mapped segment's contribution: its index entries in range and the
/// FPS to decode blocks from, or a placeholder when the segment itself
/// is unmapped (a forced discontinuity, spec §4.6).
struct SegmentSpan<'a> {
    segment_number: i32,
    index: &'a [IndexEntry],
    start_idx: usize,
    end_idx: usize,
    data_fps: Option<&'a mut Fps>,
}

/// Splits `entries` into the same gap-free index ranges
/// [`build_contigua`] would group them into, so decoded sample data can
/// be assembled run-by-run alongside the authoritative [`Contiguon`]
/// list. The two must walk identical branching since both are pure
/// functions of the same discontinuity rule.
fn split_runs(entries: &[SegmentIndexEntry]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;

    for (i, seg_entry) in entries.iter().enumerate() {
        let discontinuity = seg_entry.segment_missing || seg_entry.entry.is_discontinuity();

        if discontinuity && i > 0 {
            if let Some(s) = start.take() {
                runs.push(s..i);
            }
        }

        if seg_entry.segment_missing {
            start = None;
            continue;
        }

        if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        runs.push(s..entries.len());
    }

    runs
}

/// Trims `samples` (the full decode of one block) to the portion inside
/// `[target_start, target_end]`, using the block's own starting
/// sample/frame number and sampling frequency to locate the cut points.
/// A no-op when `frequency` is unavailable (variable-frequency session)
/// or the block lies fully inside the bounds.
fn trim_block_samples(
    samples: Vec<i32>,
    block_start_sample: i64,
    frequency: f64,
    block_start_time: i64,
    target_start: i64,
    target_end: i64,
    mode: SearchMode,
) -> Vec<i32> {
    if samples.is_empty() || frequency <= 0.0 {
        return samples;
    }

    let sample_index_for = |target: i64| -> Option<i64> {
        match mode {
            SearchMode::SampleOrFrame => Some(target - block_start_sample),
            SearchMode::Time => {
                if target == crate::sentinels::UUTC_NO_ENTRY {
                    None
                } else {
                    let delta_us = target - block_start_time;
                    #[allow(clippy::cast_precision_loss)]
                    let offset = (delta_us as f64 * frequency / 1_000_000.0).round();
                    #[allow(clippy::cast_possible_truncation)]
                    Some(offset as i64)
                }
            }
        }
    };

    let mut start_cut = 0usize;
    let mut end_cut = samples.len();

    if target_start != SAMPLE_NUMBER_NO_ENTRY && target_start != crate::sentinels::UUTC_NO_ENTRY {
        if let Some(offset) = sample_index_for(target_start) {
            if offset > 0 {
                start_cut = (offset as usize).min(samples.len());
            }
        }
    }
    if target_end != SAMPLE_NUMBER_NO_ENTRY && target_end != crate::sentinels::UUTC_NO_ENTRY {
        if let Some(offset) = sample_index_for(target_end) {
            if offset >= 0 {
                end_cut = ((offset as usize) + 1).min(samples.len());
            }
        }
    }

    if start_cut >= end_cut {
        return Vec::new();
    }
    samples[start_cut..end_cut].to_vec()
}

/// Reads every mapped segment's contribution to `slice` and merges them
/// into gap-free [`SampleRun`]s (spec §2 control flow: "for each segment
/// `read_time_series_data` → for each block in `[start_idx, end_idx]`
/// decompress ... trimming the first/last block's samples").
pub fn read_channel_samples(
    channel: &mut Channel,
    slice: &TimeSlice,
    crc_mode: CrcMode,
    level_1_key: Option<&Aes128Key>,
    level_2_key: Option<&Aes128Key>,
) -> Result<Vec<SampleRun>> {
    let mode = get_search_mode(slice);
    let (target_start, target_end) = slice_bound(slice, mode);

    let sgmt_by_number: Vec<Sgmt> = channel.sgmt.clone();

    let mut seg_entries: Vec<SegmentIndexEntry> = Vec::new();
    let mut entry_sources: Vec<Option<(i32, usize)>> = Vec::new();

    for sgmt in &sgmt_by_number {
        let overlaps = match mode {
            SearchMode::Time => sgmt.end_time >= target_start && sgmt.start_time <= target_end,
            SearchMode::SampleOrFrame => {
                sgmt.end_sample_or_frame >= target_start && sgmt.start_sample_or_frame <= target_end
            }
        };
        if !overlaps {
            continue;
        }

        let handle = channel.handle_for_segment_number(sgmt.segment_number);
        let segment = handle.and_then(|h| channel.segment(h));

        let Some(segment) = segment else {
            seg_entries.push(SegmentIndexEntry {
                segment_number: sgmt.segment_number,
                segment_missing: true,
                entry: IndexEntry {
                    file_offset: 0,
                    start_time: sgmt.start_time,
                    start_sample_or_frame: sgmt.start_sample_or_frame,
                },
                entry_end_time: sgmt.end_time,
                entry_end_sample_or_frame: sgmt.end_sample_or_frame,
            });
            entry_sources.push(None);
            continue;
        };

        if segment.index_fps.is_none() {
            continue;
        }

        let entries = {
            let segment_mut = channel
                .segment_mut(handle.expect("segment present implies handle present"))
                .expect("looked up above");
            let index_fps = segment_mut
                .index_fps
                .as_mut()
                .expect("checked Some above");
            read_index_table(index_fps, crc_mode)?
        };

        if entries.len() < 2 {
            continue;
        }

        let (start_value, start_mode) = index_target(target_start, mode);
        let (end_value, _) = index_target(target_end, mode);
        let start_idx = find_index(&entries, start_value, start_mode, OverflowPolicy::Snap)
            .unwrap_or(0)
            .min(entries.len() - 2);
        let end_idx = find_index(&entries, end_value, start_mode, OverflowPolicy::Snap)
            .unwrap_or(entries.len() - 2)
            .min(entries.len() - 2);
        let (start_idx, end_idx) = (start_idx.min(end_idx), start_idx.max(end_idx));

        for idx in start_idx..=end_idx {
            seg_entries.push(SegmentIndexEntry {
                segment_number: sgmt.segment_number,
                segment_missing: false,
                entry: entries[idx],
                entry_end_time: entries[idx + 1].start_time,
                entry_end_sample_or_frame: entries[idx + 1].start_sample_or_frame,
            });
            entry_sources.push(Some((sgmt.segment_number, idx)));
        }
    }

    let contigua = build_contigua(&seg_entries, target_start, target_end);
    let runs = split_runs(&seg_entries);

    let mut sample_runs = Vec::with_capacity(contigua.len());
    for (contiguon, range) in contigua.into_iter().zip(runs.into_iter()) {
        let mut samples = Vec::new();
        for i in range.clone() {
            let Some((segment_number, _)) = entry_sources[i] else {
                continue;
            };
            let entry = seg_entries[i].entry;
            let handle = channel
                .handle_for_segment_number(segment_number)
                .expect("segment_number came from a mapped segment");
            let segment = channel.segment_mut(handle).expect("mapped segment present");
            let Some(data_fps) = segment.data_fps.as_mut() else {
                continue;
            };

            let (_, block_samples) = decode_block(data_fps, &entry, crc_mode, level_1_key, level_2_key)?;

            let is_first_in_run = i == range.start;
            let is_last_in_run = i == range.end - 1;
            let frequency = sgmt_by_number
                .iter()
                .find(|s| s.segment_number == segment_number)
                .map_or(0.0, |s| s.sampling_frequency);

            let trimmed = if is_first_in_run || is_last_in_run {
                trim_block_samples(
                    block_samples,
                    entry.start_sample_or_frame,
                    frequency,
                    entry.start_time,
                    if is_first_in_run { target_start } else { SAMPLE_NUMBER_NO_ENTRY },
                    if is_last_in_run { target_end } else { SAMPLE_NUMBER_NO_ENTRY },
                    mode,
                )
            } else {
                block_samples
            };

            samples.extend(trimmed);
        }
        sample_runs.push(SampleRun { contiguon, samples });
    }

    Ok(sample_runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn split_runs_matches_single_contiguous_block() {
        let entries = vec![SegmentIndexEntry {
            segment_number: 1,
            segment_missing: false,
            entry: IndexEntry {
                file_offset: 0,
                start_time: 0,
                start_sample_or_frame: 0,
            },
            entry_end_time: 1000,
            entry_end_sample_or_frame: 100,
        }];
        let runs = split_runs(&entries);
        assert_eq!(runs, vec![0..1]);
    }

    #[test]
    fn split_runs_separates_missing_segment() {
        let entries = vec![
            SegmentIndexEntry {
                segment_number: 1,
                segment_missing: false,
                entry: IndexEntry {
                    file_offset: 0,
                    start_time: 0,
                    start_sample_or_frame: 0,
                },
                entry_end_time: 1000,
                entry_end_sample_or_frame: 100,
            },
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
            SegmentIndexEntry {
                segment_number: 3,
                segment_missing: false,
                entry: IndexEntry {
                    file_offset: 0,
                    start_time: 2000,
                    start_sample_or_frame: 200,
                },
                entry_end_time: 3000,
                entry_end_sample_or_frame: 300,
            },
        ];
        let runs = split_runs(&entries);
        assert_eq!(runs, vec![0..1, 2..3]);
    }

    #[test]
    fn trim_block_samples_cuts_head_by_sample_offset() {
        let samples = vec![1, 2, 3, 4, 5];
        let trimmed = trim_block_samples(samples, 100, 1000.0, 0, 102, SAMPLE_NUMBER_NO_ENTRY, SearchMode::SampleOrFrame);
        assert_eq!(trimmed, vec![3, 4, 5]);
    }

    #[test]
    fn trim_block_samples_cuts_tail_by_sample_offset() {
        let samples = vec![1, 2, 3, 4, 5];
        let trimmed = trim_block_samples(samples, 100, 1000.0, 0, SAMPLE_NUMBER_NO_ENTRY, 102, SearchMode::SampleOrFrame);
        assert_eq!(trimmed, vec![1, 2, 3]);
    }

    /// Builds a minimal two-segment on-disk channel (one MBE-coded block
    /// per segment, no encryption) and exercises [`read_channel_samples`]
    /// end-to-end: segment-overlap filtering, index resolution, contiguon
    /// merging across the segment boundary, and head/tail block trim.
    #[test]
    fn read_channel_samples_trims_and_merges_across_a_segment_boundary() {
        use crate::cmp::{BlockFlags, ParameterFlags};
        use crate::coding::Encode;
        use crate::file_type::FileType;
        use crate::fps::{Fps, OpenMode, RawBytes};
        use crate::metadata::{Metadata, Section1, Section2, TimeSeriesSection2};
        use crate::tree::segment::Segment;
        use crate::universal_header::UniversalHeader;
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

        fn mbe_block(start_time: i64, samples: &[u8]) -> Vec<u8> {
            let mut model = Vec::new();
            model.write_u8(0).unwrap(); // flags
            model.write_u8(0).unwrap(); // derivative_level
            model.write_u8(8).unwrap(); // bits_per_sample
            model.write_u8(0).unwrap(); // reserved
            model.write_i64::<LittleEndian>(0).unwrap(); // baseline_offset
            model.extend(pack_bits(samples, 8));

            let header = BlockFixedHeader {
                block_start_uid: 1,
                block_crc: 0,
                block_flags: BlockFlags::ALGORITHM_MBE,
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

            let mut block = header.encode_into_vec();
            block.extend(model);
            block
        }

        fn write_data_file(path: &std::path::Path, block: &[u8]) {
            let header = UniversalHeader::new(FileType::TimeSeriesData);
            let mut bytes = header.encode_into_vec();
            bytes.extend(block);
            std::fs::write(path, bytes).unwrap();
        }

        fn write_index_file(path: &std::path::Path, entries: &[IndexEntry]) {
            let mut header = UniversalHeader::new(FileType::TimeSeriesIndex);
            header.number_of_entries = entries.len() as i64;
            let mut bytes = header.encode_into_vec();
            for e in entries {
                bytes.extend(e.encode_into_vec());
            }
            std::fs::write(path, bytes).unwrap();
        }

        fn opened_fps(path: std::path::PathBuf, file_type: FileType) -> Fps {
            let mut fps = Fps::allocate(path, file_type, RawBytes::UniversalHeaderOnly, None);
            fps.open(OpenMode::Read).unwrap();
            fps.read(CrcMode::Off).unwrap();
            fps
        }

        fn sample_metadata() -> Metadata {
            Metadata {
                section_1: Section1::default(),
                section_2: Some(Section2::TimeSeries(TimeSeriesSection2::default())),
                section_3: None,
            }
        }

        let dir = tempfile::tempdir().unwrap();

        let block1 = mbe_block(0, &[100, 101, 102, 103, 104, 105, 106, 107, 108, 109]);
        let block2 = mbe_block(10_000, &[200, 201, 202, 203, 204, 205, 206, 207, 208, 209]);

        let data1_path = dir.path().join("seg1.tdat");
        let data2_path = dir.path().join("seg2.tdat");
        write_data_file(&data1_path, &block1);
        write_data_file(&data2_path, &block2);

        let index1_path = dir.path().join("seg1.tidx");
        let index2_path = dir.path().join("seg2.tidx");
        write_index_file(
            &index1_path,
            &[
                IndexEntry { file_offset: 0, start_time: 0, start_sample_or_frame: 0 },
                IndexEntry::terminal(10_000, 10),
            ],
        );
        write_index_file(
            &index2_path,
            &[
                IndexEntry { file_offset: 0, start_time: 10_000, start_sample_or_frame: 10 },
                IndexEntry::terminal(20_000, 20),
            ],
        );

        let sgmt1 = Sgmt {
            start_time: 0,
            end_time: 10_000,
            start_sample_or_frame: 0,
            end_sample_or_frame: 9,
            sampling_frequency: 1000.0,
            uid: 1,
            segment_number: 1,
        };
        let sgmt2 = Sgmt {
            start_time: 10_000,
            end_time: 20_000,
            start_sample_or_frame: 10,
            end_sample_or_frame: 19,
            sampling_frequency: 1000.0,
            uid: 2,
            segment_number: 2,
        };

        let mut channel = Channel::new(
            "chan".to_string(),
            dir.path().to_path_buf(),
            FileType::TimeSeriesChannel,
            true,
            sample_metadata(),
            vec![sgmt1, sgmt2],
            1,
            TimeSlice::full(),
        );

        let metadata_fps1 =
            Fps::allocate(dir.path().join("seg1.tmet"), FileType::TimeSeriesMetadata, RawBytes::FullFile, None);
        let metadata_fps2 =
            Fps::allocate(dir.path().join("seg2.tmet"), FileType::TimeSeriesMetadata, RawBytes::FullFile, None);

        channel
            .insert_segment(
                Segment::new(1, dir.path().join("seg1"), metadata_fps1, sample_metadata(), TimeSlice::full())
                    .with_index_fps(opened_fps(index1_path, FileType::TimeSeriesIndex))
                    .with_data_fps(opened_fps(data1_path, FileType::TimeSeriesData)),
            )
            .unwrap();
        channel
            .insert_segment(
                Segment::new(2, dir.path().join("seg2"), metadata_fps2, sample_metadata(), TimeSlice::full())
                    .with_index_fps(opened_fps(index2_path, FileType::TimeSeriesIndex))
                    .with_data_fps(opened_fps(data2_path, FileType::TimeSeriesData)),
            )
            .unwrap();

        // [5_000, 15_000) straddles both segments' single block, forcing a
        // head trim on segment 1's block and a tail trim on segment 2's.
        let slice = TimeSlice::from_times(5_000, 15_000);
        let runs = read_channel_samples(&mut channel, &slice, CrcMode::Off, None, None).unwrap();

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].contiguon.start_time, 5_000);
        assert_eq!(runs[0].contiguon.end_time, 15_000);
        assert_eq!(runs[0].contiguon.start_segment, 1);
        assert_eq!(runs[0].contiguon.end_segment, 2);
        assert_eq!(
            runs[0].samples,
            vec![105, 106, 107, 108, 109, 200, 201, 202, 203, 204, 205]
        );
    }
}
