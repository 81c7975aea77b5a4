//! PRED: predictive RED (spec §4.5.1 "PRED"). Identical framing and
//! range decoder to [`super::red`], but each symbol is drawn from one of
//! three category tables (`CMP_PRED_CAT`: NIL/POS/NEG) selected by the
//! sign of the previously decoded difference, giving the entropy coder a
//! one-step predictive context instead of a single flat alphabet.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::red::RangeDecoder;
use super::transforms;

const SI1_KEYSAMPLE_FLAG: u8 = 0x80;
const POS_DERIV_KEYSAMPLE_FLAG: u8 = 0xFF;
const FLAG_POSITIVE_DERIVATIVES_ONLY: u8 = 1 << 1;
const TOTAL_COUNTS: u64 = 1 << 16;

/// Which of the three predictive contexts governs the next symbol,
/// selected from the sign of the previously decoded difference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Category {
    /// Previous difference was exactly zero.
    Nil,
    /// Previous difference was positive.
    Pos,
    /// Previous difference was negative.
    Neg,
}

impl Category {
    fn of(previous: i32) -> Self {
        match previous.signum() {
            0 => Self::Nil,
            n if n > 0 => Self::Pos,
            _ => Self::Neg,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Nil => 0,
            Self::Pos => 1,
            Self::Neg => 2,
        }
    }
}

struct CategoryTable {
    symbol_map: Vec<u8>,
    cumulative: Vec<u64>,
    min_range: Vec<u64>,
}

fn read_category_table<R: Read>(reader: &mut R, k: usize) -> Result<CategoryTable> {
    let mut counts = Vec::with_capacity(k);
    for _ in 0..k {
        counts.push(u64::from(reader.read_u16::<LittleEndian>()?));
    }
    let mut symbol_map = vec![0u8; k];
    reader.read_exact(&mut symbol_map)?;

    let mut cumulative = vec![0u64; k + 1];
    for i in 0..k {
        cumulative[i + 1] = cumulative[i] + counts[i];
    }
    let min_range = counts
        .iter()
        .map(|&c| if c == 0 { u64::MAX } else { (TOTAL_COUNTS + c - 1) / c })
        .collect();

    Ok(CategoryTable {
        symbol_map,
        cumulative,
        min_range,
    })
}

struct Model {
    categories: [CategoryTable; 3],
    derivative_level: usize,
    initial_deriv_values: Vec<i64>,
    keysample_flag: u8,
    overflow_bytes: usize,
}

fn overflow_bytes(raw_flags: u8) -> usize {
    match (raw_flags >> 2) & 0b11 {
        0 => 2,
        1 => 3,
        _ => 4,
    }
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

    let nil = read_category_table(reader, k)?;
    let pos = read_category_table(reader, k)?;
    let neg = read_category_table(reader, k)?;

    let positive_only = raw_flags & FLAG_POSITIVE_DERIVATIVES_ONLY != 0;
    let keysample_flag = if positive_only {
        POS_DERIV_KEYSAMPLE_FLAG
    } else {
        SI1_KEYSAMPLE_FLAG
    };

    Ok((
        Model {
            categories: [nil, pos, neg],
            derivative_level,
            initial_deriv_values,
            keysample_flag,
            overflow_bytes: overflow_bytes(raw_flags),
        },
        n_keysample_bytes,
    ))
}

/// Decodes a PRED model region into `number_of_samples` reconstructed
/// samples.
pub fn decode(model_region: &[u8], number_of_samples: usize) -> Result<Vec<i32>> {
    let mut cursor = Cursor::new(model_region);
    let (model, n_keysample_bytes) = parse_model(&mut cursor)?;

    let start = cursor.position() as usize;
    let end = start + n_keysample_bytes as usize;
    let keysample_bytes = model_region
        .get(start..end)
        .ok_or(Error::Inconsistent("PRED: n_keysample_bytes exceeds model region"))?;

    let n_out = number_of_samples.saturating_sub(model.derivative_level);
    let mut decoder = RangeDecoder::new(keysample_bytes);
    let mut diffs = Vec::with_capacity(n_out);
    let mut previous = 0i32;

    while diffs.len() < n_out {
        let table = &model.categories[Category::of(previous).index()];
        let j = decoder.decode_symbol(&table.cumulative, &table.min_range);
        let symbol = table.symbol_map.get(j).copied().unwrap_or(0);
        let value = if symbol == model.keysample_flag {
            decoder.read_literal(model.overflow_bytes) as i32
        } else {
            i32::from(symbol as i8)
        };
        diffs.push(value);
        previous = value;
    }

    Ok(transforms::integrate_derivative(
        &diffs,
        &model.initial_deriv_values,
        model.derivative_level,
    ))
}
