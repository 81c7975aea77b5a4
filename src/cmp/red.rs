//! RED: Range-Encoded Differences, the baseline lossless inner codec
//! (spec §4.5.1). A per-block adaptive symbol alphabet (the model
//! region's `counts`/`symbol_map` tables) drives a range decoder over a
//! byte stream of small signed differences, with an escape symbol for
//! differences too large to fit a byte.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::transforms;

/// Escape symbol introducing an explicit literal, used when
/// `POSITIVE_DERIVATIVES_ONLY` is unset. The extreme negative byte value
/// a plain signed-byte difference alphabet would otherwise never need.
const SI1_KEYSAMPLE_FLAG: u8 = 0x80;
/// Escape symbol used in place of [`SI1_KEYSAMPLE_FLAG`] when
/// `POSITIVE_DERIVATIVES_ONLY` is set (the alphabet only spends bytes on
/// non-negative differences, so the escape moves to the top of the
/// unsigned range instead).
const POS_DERIV_KEYSAMPLE_FLAG: u8 = 0xFF;

const FLAG_NO_ZERO_COUNTS: u8 = 1 << 0;
const FLAG_POSITIVE_DERIVATIVES_ONLY: u8 = 1 << 1;

/// Range coder normalization total; every symbol's `cumulative_count`
/// is scaled against this constant (spec: "`minimum_range[i] =
/// ceil(TOTAL_COUNTS / count[i])`").
const TOTAL_COUNTS: u64 = 1 << 16;

/// Byte width of this model region's explicit overflow literal: 2, 3, or
/// 4, packed into two flag bits.
fn overflow_bytes(raw_flags: u8) -> usize {
    match (raw_flags >> 2) & 0b11 {
        0 => 2,
        1 => 3,
        _ => 4,
    }
}

/// The per-block adaptive model: symbol alphabet, cumulative frequency
/// table, and the derivative-integration parameters carried alongside
/// it.
struct Model {
    symbol_map: Vec<u8>,
    cumulative: Vec<u64>,
    min_range: Vec<u64>,
    derivative_level: usize,
    initial_deriv_values: Vec<i64>,
    keysample_flag: u8,
    overflow_bytes: usize,
}

fn parse_model<R: Read>(reader: &mut R) -> Result<(Model, u32)> {
    let raw_flags = reader.read_u8()?;
    let derivative_level = reader.read_u8()? as usize;
    let n_keysample_bytes = reader.read_u32::<LittleEndian>()?;
    let k = reader.read_u32::<LittleEndian>()? as usize;

    let mut initial_deriv_values = Vec::with_capacity(derivative_level);
    for _ in 0..derivative_level {
        initial_deriv_values.push(reader.read_i64::<LittleEndian>()?);
    }

    let mut counts = Vec::with_capacity(k);
    for _ in 0..k {
        counts.push(u64::from(reader.read_u16::<LittleEndian>()?));
    }
    let mut symbol_map = vec![0u8; k];
    reader.read_exact(&mut symbol_map)?;

    if raw_flags & FLAG_NO_ZERO_COUNTS != 0 && counts.iter().any(|&c| c == 0) {
        return Err(Error::Inconsistent("RED: NO_ZERO_COUNTS flag set but a count is zero"));
    }

    let mut cumulative = vec![0u64; k + 1];
    for i in 0..k {
        cumulative[i + 1] = cumulative[i] + counts[i];
    }
    let min_range: Vec<u64> = counts
        .iter()
        .map(|&c| if c == 0 { u64::MAX } else { (TOTAL_COUNTS + c - 1) / c })
        .collect();

    let positive_only = raw_flags & FLAG_POSITIVE_DERIVATIVES_ONLY != 0;
    let keysample_flag = if positive_only {
        POS_DERIV_KEYSAMPLE_FLAG
    } else {
        SI1_KEYSAMPLE_FLAG
    };

    Ok((
        Model {
            symbol_map,
            cumulative,
            min_range,
            derivative_level,
            initial_deriv_values,
            keysample_flag,
            overflow_bytes: overflow_bytes(raw_flags),
        },
        n_keysample_bytes,
    ))
}

/// A 48-bit carryless range decoder (spec §4.5.1 "Decode procedure").
pub(super) struct RangeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    low: u64,
    range: u64,
    goal: u64,
}

const MASK48: u64 = (1 << 48) - 1;
const TOP_BYTE_MASK: u64 = 0xFF << 40;

impl<'a> RangeDecoder<'a> {
    pub(super) fn new(bytes: &'a [u8]) -> Self {
        let mut goal = 0u64;
        let mut pos = 0usize;
        for _ in 0..6 {
            goal = (goal << 8) | u64::from(bytes.get(pos).copied().unwrap_or(0));
            pos += 1;
        }
        Self {
            bytes,
            pos,
            low: 0,
            range: MASK48,
            goal,
        }
    }

    fn next_byte(&mut self) -> u8 {
        let b = self.bytes.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    /// Direct, non-entropy-coded byte read from the same stream cursor;
    /// used for overflow literals, which ride alongside the range-coded
    /// symbols rather than through them.
    pub(super) fn read_literal(&mut self, width: usize) -> i64 {
        let mut raw = 0u64;
        for _ in 0..width {
            raw = (raw << 8) | u64::from(self.next_byte());
        }
        let shift = 64 - (width * 8);
        ((raw << shift) as i64) >> shift
    }

    fn rescale(&mut self) {
        while (self.low ^ (self.low.wrapping_add(self.range))) & TOP_BYTE_MASK == 0 {
            self.low = (self.low << 8) & MASK48;
            self.range = (self.range << 8) & MASK48;
            self.goal = ((self.goal << 8) | u64::from(self.next_byte())) & MASK48;
        }
    }

    /// Decodes the next symbol index by narrowing `[low, low+range)` to
    /// whichever cumulative-frequency bucket contains `goal` (spec:
    /// "iterate j from 0 while range >= minimum_range[j]; ... if high >
    /// goal, emit symbol j").
    pub(super) fn decode_symbol(&mut self, cumulative: &[u64], min_range: &[u64]) -> usize {
        let k = min_range.len();
        let mut j = 0usize;
        let mut prev_high = self.low;
        while j < k && self.range >= min_range[j] {
            let high = self.low + ((self.range * cumulative[j + 1]) >> 16);
            if high > self.goal {
                self.range = high - prev_high;
                self.low = prev_high;
                self.rescale();
                return j;
            }
            prev_high = high;
            j += 1;
        }
        // Malformed input (or a degenerate single-symbol table): fall
        // back to the last candidate instead of panicking.
        let last = k.saturating_sub(1);
        self.range = self.range.saturating_sub(prev_high.saturating_sub(self.low));
        self.low = prev_high;
        self.rescale();
        last
    }
}

/// Decodes a RED model region into `number_of_samples` reconstructed
/// samples.
pub fn decode(model_region: &[u8], number_of_samples: usize) -> Result<Vec<i32>> {
    let mut cursor = Cursor::new(model_region);
    let (model, n_keysample_bytes) = parse_model(&mut cursor)?;

    let start = cursor.position() as usize;
    let end = start + n_keysample_bytes as usize;
    let keysample_bytes = model_region
        .get(start..end)
        .ok_or(Error::Inconsistent("RED: n_keysample_bytes exceeds model region"))?;

    let n_out = number_of_samples.saturating_sub(model.derivative_level);
    let mut decoder = RangeDecoder::new(keysample_bytes);
    let mut diffs = Vec::with_capacity(n_out);

    while diffs.len() < n_out {
        let j = decoder.decode_symbol(&model.cumulative, &model.min_range);
        let symbol = model.symbol_map.get(j).copied().unwrap_or(0);
        let value = if symbol == model.keysample_flag {
            decoder.read_literal(model.overflow_bytes) as i32
        } else {
            i32::from(symbol as i8)
        };
        diffs.push(value);
    }

    Ok(transforms::integrate_derivative(
        &diffs,
        &model.initial_deriv_values,
        model.derivative_level,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use test_log::test;

    /// Builds a RED model region with a trivial single-symbol alphabet
    /// that always decodes to difference `0`, so the range-coded payload
    /// can be all-zero bytes regardless of the coder's internal state
    /// machine.
    fn single_symbol_fixture(n_samples: usize, derivative_level: usize) -> (Vec<u8>, usize) {
        let mut region = Vec::new();
        region.write_u8(0).unwrap(); // flags
        region.write_u8(derivative_level as u8).unwrap();
        let keysample_bytes = 16usize;
        region.write_u32::<LittleEndian>(keysample_bytes as u32).unwrap();
        region.write_u32::<LittleEndian>(1).unwrap(); // k = 1 symbol
        for v in 0..derivative_level as i64 {
            region.write_i64::<LittleEndian>(v * 10).unwrap();
        }
        region.write_u16::<LittleEndian>(1).unwrap(); // counts[0] = 1 (full mass)
        region.write_u8(0).unwrap(); // symbol_map[0] = 0 (difference 0)
        region.extend(std::iter::repeat(0u8).take(keysample_bytes));
        (region, n_samples)
    }

    #[test]
    fn decoding_an_all_zero_single_symbol_model_holds_the_seed_flat() {
        let (region, n_samples) = single_symbol_fixture(5, 1);
        let samples = decode(&region, n_samples).unwrap();
        // derivative_level=1, seed=0, all differences decode to 0: flat at 0.
        assert_eq!(samples, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn decoding_with_no_derivative_integration() {
        let (region, n_samples) = single_symbol_fixture(4, 0);
        let samples = decode(&region, n_samples).unwrap();
        assert_eq!(samples, vec![0, 0, 0, 0]);
    }

    #[test]
    fn overflow_bytes_reads_two_bits_of_flags() {
        assert_eq!(overflow_bytes(0b0000), 2);
        assert_eq!(overflow_bytes(0b0100), 3);
        assert_eq!(overflow_bytes(0b1000), 4);
        assert_eq!(overflow_bytes(0b1100), 4);
    }

    #[test]
    fn literal_sign_extends_from_its_declared_width() {
        let bytes = [0xFFu8, 0xFE]; // -2 as a 2-byte big-endian literal
        let mut decoder = RangeDecoder::new(&[0u8; 6]);
        decoder.bytes = &bytes;
        decoder.pos = 0;
        assert_eq!(decoder.read_literal(2), -2);
    }
}
