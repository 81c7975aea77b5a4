//! VDS: Vectorized Data Stream (spec §4.5.1 "VDS"), the lossy codec. A
//! handful of `(x, y)` control vertices — themselves entropy-coded via
//! one of [`super::red`], [`super::pred`], or [`super::mbe`] — are
//! reconstructed into a full sample run by modified Akima interpolation,
//! with phantom endpoint slopes extrapolated so the two boundary
//! segments don't need special-cased curvature. VDS applies its own
//! amplitude scaling and never runs the shared inverse transforms or
//! derivative integration (spec: "VDS handles its own").

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::{mbe, pred, red};

/// Which inner codec a VDS sub-block (the x or y vertex stream) was
/// entropy-coded with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SubblockAlgorithm {
    Red,
    Pred,
    Mbe,
}

impl SubblockAlgorithm {
    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Red),
            1 => Ok(Self::Pred),
            2 => Ok(Self::Mbe),
            _ => Err(Error::Inconsistent("VDS: unknown sub-block algorithm tag")),
        }
    }

    fn decode(self, region: &[u8], n: usize) -> Result<Vec<i32>> {
        match self {
            Self::Red => red::decode(region, n),
            Self::Pred => pred::decode(region, n),
            Self::Mbe => mbe::decode(region, n),
        }
    }
}

struct ModelHeader {
    x_algorithm: SubblockAlgorithm,
    y_algorithm: SubblockAlgorithm,
    n_vertices: usize,
    x_subblock_bytes: usize,
    y_subblock_bytes: usize,
    amplitude_scale: f32,
}

fn parse_header<R: Read>(reader: &mut R) -> Result<ModelHeader> {
    let _flags = reader.read_u8()?;
    let x_algorithm = SubblockAlgorithm::from_tag(reader.read_u8()?)?;
    let y_algorithm = SubblockAlgorithm::from_tag(reader.read_u8()?)?;
    let _reserved = reader.read_u8()?;
    let n_vertices = reader.read_u32::<LittleEndian>()? as usize;
    let x_subblock_bytes = reader.read_u32::<LittleEndian>()? as usize;
    let y_subblock_bytes = reader.read_u32::<LittleEndian>()? as usize;
    let amplitude_scale = reader.read_f32::<LittleEndian>()?;

    if n_vertices < 2 {
        return Err(Error::Inconsistent("VDS: fewer than 2 control vertices"));
    }

    Ok(ModelHeader {
        x_algorithm,
        y_algorithm,
        n_vertices,
        x_subblock_bytes,
        y_subblock_bytes,
        amplitude_scale,
    })
}

/// Tangent (derivative) estimate at every vertex, via the *modified*
/// Akima (makima) scheme: extend the `n-1` inter-vertex slopes with two
/// linearly extrapolated phantom slopes on each side, then combine the
/// four slopes around each vertex weighted by both how much consecutive
/// slopes disagree and their absolute mean. The absolute-mean term is
/// what distinguishes makima from classic Akima: it keeps a weight from
/// collapsing to zero across a sign change in the slopes, which is what
/// makes classic Akima overshoot near flat regions next to a spike.
fn akima_tangents(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut slopes = vec![0.0f64; n - 1];
    for i in 0..n - 1 {
        let dx = x[i + 1] - x[i];
        slopes[i] = if dx.abs() > f64::EPSILON { (y[i + 1] - y[i]) / dx } else { 0.0 };
    }

    // ext[k + 2] holds slope m_k for k in -2..=n-1 (phantom slopes at
    // the two negative and two overrun indices, real slopes in between).
    let mut ext = vec![0.0f64; n + 3];
    ext[2..2 + slopes.len()].copy_from_slice(&slopes);
    ext[1] = 2.0 * ext[2] - ext[3.min(ext.len() - 1)];
    ext[0] = 2.0 * ext[1] - ext[2];
    let last_real = 2 + slopes.len() - 1;
    ext[last_real + 1] = 2.0 * ext[last_real] - ext[last_real - 1];
    ext[last_real + 2] = 2.0 * ext[last_real + 1] - ext[last_real];

    let m = |k: isize| -> f64 { ext[(k + 2) as usize] };

    (0..n)
        .map(|i| {
            let i = i as isize;
            let a = (m(i + 1) - m(i)).abs() + (m(i + 1) + m(i)).abs() / 2.0;
            let b = (m(i - 1) - m(i - 2)).abs() + (m(i - 1) + m(i - 2)).abs() / 2.0;
            if a + b > f64::EPSILON {
                (a * m(i - 1) + b * m(i)) / (a + b)
            } else {
                (m(i - 1) + m(i)) / 2.0
            }
        })
        .collect()
}

/// Evaluates the piecewise Hermite cubic defined by vertices `(x, y)`
/// and tangents `t` at integer sample index `sample`, extrapolating
/// linearly from the nearest boundary tangent outside `[x[0], x[n-1]]`.
fn evaluate(x: &[f64], y: &[f64], t: &[f64], sample: f64) -> f64 {
    let n = x.len();
    if sample <= x[0] {
        return y[0] + t[0] * (sample - x[0]);
    }
    if sample >= x[n - 1] {
        return y[n - 1] + t[n - 1] * (sample - x[n - 1]);
    }

    let i = match x.partition_point(|&xi| xi <= sample) {
        0 => 0,
        found => found - 1,
    };
    let (x0, x1) = (x[i], x[i + 1]);
    let h = x1 - x0;
    let s = (sample - x0) / h;
    let s2 = s * s;
    let s3 = s2 * s;

    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    h00 * y[i] + h10 * h * t[i] + h01 * y[i + 1] + h11 * h * t[i + 1]
}

/// Decodes a VDS model region into `number_of_samples` reconstructed
/// samples, sampled at integer indices `0..number_of_samples`.
pub fn decode(model_region: &[u8], number_of_samples: usize) -> Result<Vec<i32>> {
    let mut cursor = Cursor::new(model_region);
    let header = parse_header(&mut cursor)?;

    let x_start = cursor.position() as usize;
    let x_end = x_start + header.x_subblock_bytes;
    let y_end = x_end + header.y_subblock_bytes;
    let x_region = model_region
        .get(x_start..x_end)
        .ok_or(Error::Inconsistent("VDS: x sub-block exceeds model region"))?;
    let y_region = model_region
        .get(x_end..y_end)
        .ok_or(Error::Inconsistent("VDS: y sub-block exceeds model region"))?;

    let raw_x = header.x_algorithm.decode(x_region, header.n_vertices)?;
    let raw_y = header.y_algorithm.decode(y_region, header.n_vertices)?;

    let x: Vec<f64> = raw_x.iter().map(|&v| f64::from(v)).collect();
    let y: Vec<f64> = raw_y
        .iter()
        .map(|&v| f64::from(v) * f64::from(header.amplitude_scale))
        .collect();

    if !x.windows(2).all(|w| w[1] > w[0]) {
        return Err(Error::Inconsistent("VDS: control vertices are not strictly increasing in x"));
    }

    let tangents = akima_tangents(&x, &y);
    let samples = (0..number_of_samples)
        .map(|i| evaluate(&x, &y, &tangents, i as f64).round() as i32)
        .collect();

    Ok(samples)
}
