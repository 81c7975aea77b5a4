//! Shared inverse transforms applied after an inner codec decodes a
//! block's raw integer stream (spec §4.5 "Inverse transforms"). VDS
//! reconstructs final samples itself and never runs these (spec: "VDS
//! handles its own").

/// Placeholder for a frequency-domain unscaling step. The source defines
/// the hook but never populates it for any known recording; kept as a
/// no-op so a future format revision that does use it only needs to fill
/// this function in, not re-plumb the call site.
pub fn unscale_frequency(_samples: &mut [i32], _frequency_scale: f32) {}

/// `out[i] = round(in[i] * amplitude_scale)`.
pub fn unscale_amplitude(samples: &mut [i32], amplitude_scale: f32) {
    if (amplitude_scale - 1.0).abs() <= f32::EPSILON {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = (f64::from(*sample) * f64::from(amplitude_scale)).round() as i32;
    }
}

/// Removes a linear trend: `out[i] = round(in[i] + gradient*(i+1) +
/// intercept)`, computed left to right with a running accumulator rather
/// than a fresh multiply per sample.
pub fn retrend(samples: &mut [i32], gradient: f32, intercept: f32) {
    if gradient == 0.0 && intercept == 0.0 {
        return;
    }
    let mut trend = f64::from(intercept);
    let gradient = f64::from(gradient);
    for sample in samples.iter_mut() {
        trend += gradient;
        *sample = (f64::from(*sample) + trend).round() as i32;
    }
}

/// Integrates an `level`-th forward-difference stream `diffs` back into
/// the full sample sequence, seeding each successive integration pass
/// with the matching entry of `initial_values` (the model region's
/// `initial_deriv_values[level]`, spec §4.5.1/§4.5.3).
///
/// Pass `p` (0-indexed) turns a length-`n` difference stream into a
/// length-`n+1` stream via a cumulative sum seeded by
/// `initial_values[p]`; running `level` passes recovers the original
/// sample sequence. Running the forward difference `level` times over
/// the result reproduces `diffs` again (the property this crate's tests
/// check), so a fresh decoder never needs to special-case `level == 0`.
pub fn integrate_derivative(diffs: &[i32], initial_values: &[i64], level: usize) -> Vec<i32> {
    if level == 0 {
        return diffs.to_vec();
    }

    let mut current: Vec<i64> = diffs.iter().map(|&v| i64::from(v)).collect();
    for pass in 0..level {
        let seed = initial_values.get(pass).copied().unwrap_or(0);
        let mut next = Vec::with_capacity(current.len() + 1);
        next.push(seed);
        let mut acc = seed;
        for &d in &current {
            acc = acc.wrapping_add(d);
            next.push(acc);
        }
        current = next;
    }
    current.into_iter().map(|v| v as i32).collect()
}

/// The forward difference of `samples`, `level` times: `diff^1(x)[i] =
/// x[i+1] - x[i]`; `diff^level` repeats that `level` times. Used only by
/// this module's round-trip tests (spec testable property 3).
#[cfg(test)]
fn forward_difference(samples: &[i32], level: usize) -> Vec<i32> {
    let mut current = samples.to_vec();
    for _ in 0..level {
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    current
}
