//! MBE: Minimum Bit Encoding (spec §4.5.1 "MBE"). Every sample is packed
//! as an unsigned `bits_per_sample`-wide field, back to back with no
//! byte alignment between samples — fields routinely span 64-bit word
//! boundaries — then widened back to a signed sample by adding the
//! model region's `baseline_offset`.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::transforms;

struct Model {
    bits_per_sample: u32,
    baseline_offset: i64,
    derivative_level: usize,
    initial_deriv_values: Vec<i64>,
}

fn parse_model<R: Read>(reader: &mut R) -> Result<Model> {
    let _flags = reader.read_u8()?;
    let derivative_level = reader.read_u8()? as usize;
    let bits_per_sample = u32::from(reader.read_u8()?);
    let _reserved = reader.read_u8()?;
    let baseline_offset = reader.read_i64::<LittleEndian>()?;

    if bits_per_sample == 0 || bits_per_sample > 64 {
        return Err(Error::Inconsistent("MBE: bits_per_sample out of range"));
    }

    let mut initial_deriv_values = Vec::with_capacity(derivative_level);
    for _ in 0..derivative_level {
        initial_deriv_values.push(reader.read_i64::<LittleEndian>()?);
    }

    Ok(Model {
        bits_per_sample,
        baseline_offset,
        derivative_level,
        initial_deriv_values,
    })
}

/// Reads fixed-width unsigned fields packed LSB-first, back to back,
/// from a byte stream (equivalent to reading them out of a stream of
/// little-endian 64-bit words one bit-field at a time).
struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    fn read(&mut self, width: u32) -> u64 {
        let mut out = 0u64;
        for i in 0..width {
            let pos = self.bit_pos + i as usize;
            let byte = self.bytes.get(pos / 8).copied().unwrap_or(0);
            let bit = u64::from((byte >> (pos % 8)) & 1);
            out |= bit << i;
        }
        self.bit_pos += width as usize;
        out
    }
}

/// Decodes an MBE model region into `number_of_samples` reconstructed
/// samples.
pub fn decode(model_region: &[u8], number_of_samples: usize) -> Result<Vec<i32>> {
    let mut cursor = Cursor::new(model_region);
    let model = parse_model(&mut cursor)?;

    let packed = &model_region[cursor.position() as usize..];
    let n_out = number_of_samples.saturating_sub(model.derivative_level);

    let mut reader = BitReader::new(packed);
    let mut diffs = Vec::with_capacity(n_out);
    for _ in 0..n_out {
        let raw = reader.read(model.bits_per_sample);
        let value = raw as i64 + model.baseline_offset;
        diffs.push(value as i32);
    }

    Ok(transforms::integrate_derivative(
        &diffs,
        &model.initial_deriv_values,
        model.derivative_level,
    ))
}
