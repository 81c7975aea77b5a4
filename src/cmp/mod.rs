//! CMP: the compressed time-series block codec (spec §4.5).
//!
//! Every `.tdat` file is a concatenation of blocks, each led by a fixed
//! header ([`BlockFixedHeader`]) followed by four variable-length regions
//! (records, parameters, protected, discretionary) and a model region
//! consumed by whichever of the four inner codecs — [`red`], [`pred`],
//! [`mbe`], [`vds`] — `block_flags` selects.

pub mod mbe;
pub mod pred;
pub mod red;
pub mod transforms;
pub mod vds;

use crate::aes::Aes128Key;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::Error;
use crate::metadata::EncryptionLevel;
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

bitflags! {
    /// `block_flags`: encryption level (L1 xor L2, never both),
    /// discontinuity, and the inner-codec algorithm selector.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct BlockFlags: u32 {
        /// Block body is encrypted at level 1.
        const ENCRYPTION_LEVEL_1 = 1 << 0;
        /// Block body is encrypted at level 2.
        const ENCRYPTION_LEVEL_2 = 1 << 1;
        /// This block opens after a discontinuity (gap) in the stream.
        const DISCONTINUITY      = 1 << 2;
        /// Inner codec: Range-Encoded Differences.
        const ALGORITHM_RED      = 1 << 3;
        /// Inner codec: Predictive RED.
        const ALGORITHM_PRED     = 1 << 4;
        /// Inner codec: Minimum Bit Encoding.
        const ALGORITHM_MBE      = 1 << 5;
        /// Inner codec: Vectorized Data Stream.
        const ALGORITHM_VDS      = 1 << 6;
    }
}

const ALGORITHM_MASK: BlockFlags = BlockFlags::ALGORITHM_RED
    .union(BlockFlags::ALGORITHM_PRED)
    .union(BlockFlags::ALGORITHM_MBE)
    .union(BlockFlags::ALGORITHM_VDS);

/// The inner codec a block was encoded with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Algorithm {
    /// Range-Encoded Differences.
    Red,
    /// Predictive RED (three category contexts).
    Pred,
    /// Minimum Bit Encoding.
    Mbe,
    /// Vectorized Data Stream (lossy, Akima-interpolated).
    Vds,
}

impl BlockFlags {
    /// Extracts the selected [`Algorithm`] (spec §4.5 step 3: "Select by
    /// `block_flags & ALGORITHMS_MASK`").
    pub fn algorithm(self) -> crate::error::Result<Algorithm> {
        match self & ALGORITHM_MASK {
            f if f == BlockFlags::ALGORITHM_RED => Ok(Algorithm::Red),
            f if f == BlockFlags::ALGORITHM_PRED => Ok(Algorithm::Pred),
            f if f == BlockFlags::ALGORITHM_MBE => Ok(Algorithm::Mbe),
            f if f == BlockFlags::ALGORITHM_VDS => Ok(Algorithm::Vds),
            _ => Err(Error::Inconsistent("block_flags: no single algorithm bit set")),
        }
    }

    /// The encryption level the flags imply, or `None` for a plaintext
    /// block.
    #[must_use]
    pub fn encryption_level(self) -> Option<EncryptionLevel> {
        if self.contains(Self::ENCRYPTION_LEVEL_1) {
            Some(EncryptionLevel::Level1)
        } else if self.contains(Self::ENCRYPTION_LEVEL_2) {
            Some(EncryptionLevel::Level2)
        } else {
            None
        }
    }
}

bitflags! {
    /// `parameter_flags`: which optional transform parameters are
    /// serialized in the parameter region, in ascending-bit order.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct ParameterFlags: u32 {
        /// Reserved: derivative initial values duplicated into the
        /// parameter region. Not produced or consumed by this crate —
        /// each inner codec already carries its own `initial_deriv_values`
        /// in its model region (spec §4.5.1/§4.5.3); decoding a block
        /// that sets this bit is rejected rather than silently
        /// misaligning the fields that follow.
        const DERIVATIVE_INITIAL_VALUES = 1 << 0;
        /// `gradient`, an `f32`.
        const GRADIENT          = 1 << 1;
        /// `intercept`, an `f32`.
        const INTERCEPT         = 1 << 2;
        /// `amplitude_scale`, an `f32`.
        const AMPLITUDE_SCALE   = 1 << 3;
        /// `frequency_scale`, an `f32`.
        const FREQUENCY_SCALE   = 1 << 4;
    }
}

/// Decoded, defaulted-where-absent transform parameters (spec §4.5
/// "Inverse transforms").
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParameterValues {
    /// Linear trend slope; `0.0` (no-op) if [`ParameterFlags::GRADIENT`]
    /// is unset.
    pub gradient: f32,
    /// Linear trend intercept; `0.0` (no-op) if
    /// [`ParameterFlags::INTERCEPT`] is unset.
    pub intercept: f32,
    /// Amplitude unscaling factor; `1.0` (no-op) if
    /// [`ParameterFlags::AMPLITUDE_SCALE`] is unset.
    pub amplitude_scale: f32,
    /// Frequency unscaling factor; `1.0` (no-op, and currently always a
    /// no-op — see [`transforms::unscale_frequency`]) if
    /// [`ParameterFlags::FREQUENCY_SCALE`] is unset.
    pub frequency_scale: f32,
}

impl ParameterValues {
    /// Parses the fields `flags` marks present, in ascending-bit order,
    /// from `reader` (the block's parameter region).
    pub fn parse<R: Read>(reader: &mut R, flags: ParameterFlags) -> crate::error::Result<Self> {
        if flags.contains(ParameterFlags::DERIVATIVE_INITIAL_VALUES) {
            return Err(Error::Inconsistent(
                "parameter_flags: DERIVATIVE_INITIAL_VALUES is not supported",
            ));
        }
        let gradient = if flags.contains(ParameterFlags::GRADIENT) {
            reader.read_f32::<LittleEndian>()?
        } else {
            0.0
        };
        let intercept = if flags.contains(ParameterFlags::INTERCEPT) {
            reader.read_f32::<LittleEndian>()?
        } else {
            0.0
        };
        let amplitude_scale = if flags.contains(ParameterFlags::AMPLITUDE_SCALE) {
            reader.read_f32::<LittleEndian>()?
        } else {
            1.0
        };
        let frequency_scale = if flags.contains(ParameterFlags::FREQUENCY_SCALE) {
            reader.read_f32::<LittleEndian>()?
        } else {
            1.0
        };
        Ok(Self {
            gradient,
            intercept,
            amplitude_scale,
            frequency_scale,
        })
    }
}

/// Byte size of the fixed portion of [`BlockFixedHeader`].
pub const FIXED_HEADER_SIZE: usize = 68;

/// The fixed header every CMP block starts with (spec §3/§4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct BlockFixedHeader {
    /// UID identifying the start of this block (diagnostic/resync aid).
    pub block_start_uid: u64,
    /// CRC over the block body (everything after this field).
    pub block_crc: u32,
    /// Encryption/discontinuity/algorithm flags.
    pub block_flags: BlockFlags,
    /// This block's first sample's time, in µUTC.
    pub start_time: i64,
    /// Channel number this block belongs to.
    pub acquisition_channel_number: i32,
    /// Total size of the block (header + body), in bytes.
    pub total_block_bytes: u32,
    /// Number of samples this block decodes to.
    pub number_of_samples: u32,
    /// Number of opaque records in the record region.
    pub number_of_records: u32,
    /// Byte length of the record region.
    pub record_region_bytes: u32,
    /// Which optional transform parameters are serialized.
    pub parameter_flags: ParameterFlags,
    /// Byte length of the parameter region.
    pub parameter_region_bytes: u32,
    /// Byte length of the protected region.
    pub protected_region_bytes: u32,
    /// Byte length of the discretionary region.
    pub discretionary_region_bytes: u32,
    /// Byte length of the model region (codec-specific).
    pub model_region_bytes: u32,
    /// Total byte length of this fixed header.
    pub total_header_bytes: u32,
}

impl Encode for BlockFixedHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<LittleEndian>(self.block_start_uid)?;
        writer.write_u32::<LittleEndian>(self.block_crc)?;
        writer.write_u32::<LittleEndian>(self.block_flags.bits())?;
        writer.write_i64::<LittleEndian>(self.start_time)?;
        writer.write_i32::<LittleEndian>(self.acquisition_channel_number)?;
        writer.write_u32::<LittleEndian>(self.total_block_bytes)?;
        writer.write_u32::<LittleEndian>(self.number_of_samples)?;
        writer.write_u32::<LittleEndian>(self.number_of_records)?;
        writer.write_u32::<LittleEndian>(self.record_region_bytes)?;
        writer.write_u32::<LittleEndian>(self.parameter_flags.bits())?;
        writer.write_u32::<LittleEndian>(self.parameter_region_bytes)?;
        writer.write_u32::<LittleEndian>(self.protected_region_bytes)?;
        writer.write_u32::<LittleEndian>(self.discretionary_region_bytes)?;
        writer.write_u32::<LittleEndian>(self.model_region_bytes)?;
        writer.write_u32::<LittleEndian>(self.total_header_bytes)?;
        Ok(())
    }
}

impl Decode for BlockFixedHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            block_start_uid: reader.read_u64::<LittleEndian>()?,
            block_crc: reader.read_u32::<LittleEndian>()?,
            block_flags: BlockFlags::from_bits_truncate(reader.read_u32::<LittleEndian>()?),
            start_time: reader.read_i64::<LittleEndian>()?,
            acquisition_channel_number: reader.read_i32::<LittleEndian>()?,
            total_block_bytes: reader.read_u32::<LittleEndian>()?,
            number_of_samples: reader.read_u32::<LittleEndian>()?,
            number_of_records: reader.read_u32::<LittleEndian>()?,
            record_region_bytes: reader.read_u32::<LittleEndian>()?,
            parameter_flags: ParameterFlags::from_bits_truncate(reader.read_u32::<LittleEndian>()?),
            parameter_region_bytes: reader.read_u32::<LittleEndian>()?,
            protected_region_bytes: reader.read_u32::<LittleEndian>()?,
            discretionary_region_bytes: reader.read_u32::<LittleEndian>()?,
            model_region_bytes: reader.read_u32::<LittleEndian>()?,
            total_header_bytes: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Borrowed views into a block's four variable regions plus the model
/// region, sliced out of the block body in framing order (spec §4.5
/// step 2: "records, parameters, protected, discretionary, model").
#[derive(Copy, Clone, Debug)]
pub struct Regions<'a> {
    /// Opaque per-block record entries; not interpreted by this crate
    /// (spec §1 out-of-scope: "record type catalogs beyond Sgmt").
    pub record: &'a [u8],
    /// Serialized [`ParameterValues`], gated by `parameter_flags`.
    pub parameter: &'a [u8],
    /// Opaque; reserved for vendor-specific use.
    pub protected: &'a [u8],
    /// Opaque; caller-defined free-form annotations.
    pub discretionary: &'a [u8],
    /// The chosen codec's model region.
    pub model: &'a [u8],
}

impl BlockFixedHeader {
    /// Slices `body` (the block bytes immediately after this fixed
    /// header) into its five regions, in framing order.
    pub fn split_regions<'a>(&self, body: &'a [u8]) -> crate::error::Result<Regions<'a>> {
        let mut offset = 0usize;
        let mut take = |len: u32| -> crate::error::Result<&'a [u8]> {
            let len = len as usize;
            let end = offset + len;
            let slice = body
                .get(offset..end)
                .ok_or(Error::Inconsistent("block region bytes exceed body"))?;
            offset = end;
            Ok(slice)
        };

        let record = take(self.record_region_bytes)?;
        let parameter = take(self.parameter_region_bytes)?;
        let protected = take(self.protected_region_bytes)?;
        let discretionary = take(self.discretionary_region_bytes)?;
        let model = take(self.model_region_bytes)?;

        Ok(Regions {
            record,
            parameter,
            protected,
            discretionary,
            model,
        })
    }
}

/// Decrypts `body` in place if `block_flags` mark it encrypted (spec
/// §4.5 step 1). The encryptable span is capped at the smaller of the
/// whole-16-byte-block count `body` holds and the header-covering block
/// count, except for MBE where the full body is eligible (spec: "with a
/// cap at the smaller of 'encryptable blocks' and 'header-covering
/// blocks' when the encoding is not MBE").
pub fn decrypt_region(body: &mut [u8], header: &BlockFixedHeader, key: &Aes128Key) -> crate::error::Result<()> {
    if header.block_flags.encryption_level().is_none() {
        return Ok(());
    }

    let encryptable_blocks = (body.len() / 16) as u32;
    let header_covering_blocks = header
        .total_header_bytes
        .saturating_sub(FIXED_HEADER_SIZE as u32)
        / 16;

    let cap = if header.block_flags.algorithm()? == Algorithm::Mbe {
        encryptable_blocks
    } else {
        encryptable_blocks.min(header_covering_blocks)
    };

    let n = (cap as usize * 16).min(body.len());
    key.decrypt_blocks_in_place(&mut body[..n]);
    Ok(())
}

/// Decodes a full block: dispatches to the selected inner codec, then
/// (for every codec except VDS, which reconstructs final samples itself)
/// applies the shared inverse transforms in the order spec §4.5
/// prescribes: unscale frequency, unscale amplitude, retrend.
pub fn decode(header: &BlockFixedHeader, body: &[u8]) -> crate::error::Result<Vec<i32>> {
    let regions = header.split_regions(body)?;
    let algorithm = header.block_flags.algorithm()?;

    if algorithm == Algorithm::Vds {
        return vds::decode(regions.model, header.number_of_samples as usize);
    }

    let mut samples = match algorithm {
        Algorithm::Red => red::decode(regions.model, header.number_of_samples as usize)?,
        Algorithm::Pred => pred::decode(regions.model, header.number_of_samples as usize)?,
        Algorithm::Mbe => mbe::decode(regions.model, header.number_of_samples as usize)?,
        Algorithm::Vds => unreachable!("handled above"),
    };

    let mut cursor = Cursor::new(regions.parameter);
    let params = ParameterValues::parse(&mut cursor, header.parameter_flags)?;

    transforms::unscale_frequency(&mut samples, params.frequency_scale);
    transforms::unscale_amplitude(&mut samples, params.amplitude_scale);
    transforms::retrend(&mut samples, params.gradient, params.intercept);

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn header(flags: BlockFlags, n_samples: u32, region_bytes: [u32; 4]) -> BlockFixedHeader {
        BlockFixedHeader {
            block_start_uid: 1,
            block_crc: 0,
            block_flags: flags,
            start_time: 0,
            acquisition_channel_number: 0,
            total_block_bytes: 0,
            number_of_samples: n_samples,
            number_of_records: 0,
            record_region_bytes: region_bytes[0],
            parameter_flags: ParameterFlags::empty(),
            parameter_region_bytes: region_bytes[1],
            protected_region_bytes: region_bytes[2],
            discretionary_region_bytes: region_bytes[3],
            model_region_bytes: 4,
            total_header_bytes: FIXED_HEADER_SIZE as u32,
        }
    }

    #[test]
    fn round_trips_fixed_header() {
        let h = header(BlockFlags::ALGORITHM_MBE, 10, [0, 0, 0, 0]);
        let bytes = h.encode_into_vec();
        assert_eq!(bytes.len(), FIXED_HEADER_SIZE);
        let decoded = BlockFixedHeader::decode_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn algorithm_extracts_single_flag() {
        let h = header(BlockFlags::ALGORITHM_PRED, 1, [0, 0, 0, 0]);
        assert_eq!(h.block_flags.algorithm().unwrap(), Algorithm::Pred);
    }

    #[test]
    fn split_regions_slices_in_framing_order() {
        let h = header(BlockFlags::ALGORITHM_RED, 1, [2, 3, 1, 1]);
        let body = vec![0, 1, /* record */ 2, 3, 4, /* parameter */ 5, /* protected */ 6, /* discretionary */ 7, 8, 9, 10 /* model */];
        let regions = h.split_regions(&body).unwrap();
        assert_eq!(regions.record, &[0, 1]);
        assert_eq!(regions.parameter, &[2, 3, 4]);
        assert_eq!(regions.protected, &[5]);
        assert_eq!(regions.discretionary, &[6]);
        assert_eq!(regions.model, &[7, 8, 9, 10]);
    }

    #[test]
    fn rejects_region_bytes_exceeding_body() {
        let h = header(BlockFlags::ALGORITHM_RED, 1, [100, 0, 0, 0]);
        assert!(h.split_regions(&[0u8; 4]).is_err());
    }
}
