//! Row normalisation kernels.

use super::arith::exp_f32;
use super::reduce::{dot_f32, max_f32, sum_f32};

/// `out = x · 1/√(mean x²)`. An all-zero row stays zero.
pub(crate) fn rms_norm(out: &mut [f32], x: &[f32]) {
    debug_assert_eq!(out.len(), x.len());
    if x.is_empty() {
        return;
    }
    let mean_sq = dot_f32(x, x) / x.len() as f32;
    let scale = if mean_sq > 0.0 {
        1.0 / mean_sq.sqrt()
    } else {
        0.0
    };
    for (slot, &v) in out.iter_mut().zip(x) {
        *slot = v * scale;
    }
}

/// Numerically stable softmax: subtract the max, exponentiate, divide by
/// the sum.
pub(crate) fn softmax(out: &mut [f32], x: &[f32]) {
    debug_assert_eq!(out.len(), x.len());
    if x.is_empty() {
        return;
    }
    let peak = max_f32(x);
    for (slot, &v) in out.iter_mut().zip(x) {
        *slot = exp_f32(v - peak);
    }
    let total = sum_f32(out);
    let scale = 1.0 / total;
    for slot in out.iter_mut() {
        *slot *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let x = [1.0f32, 2.0, 3.0, 4.0];
        let mut out = [0.0f32; 4];
        softmax(&mut out, &x);
        let total: f32 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn softmax_survives_large_inputs() {
        let x = [100.0f32, 101.0, 102.0];
        let mut out = [0.0f32; 3];
        softmax(&mut out, &x);
        assert!(out.iter().all(|v| v.is_finite()));
        let total: f32 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rms_norm_yields_unit_power() {
        let x = [3.0f32, -4.0, 3.0, -4.0];
        let mut out = [0.0f32; 4];
        rms_norm(&mut out, &x);
        let mean_sq: f32 = out.iter().map(|v| v * v).sum::<f32>() / out.len() as f32;
        assert!((mean_sq - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rms_norm_of_zeros_is_zeros() {
        let x = [0.0f32; 5];
        let mut out = [1.0f32; 5];
        rms_norm(&mut out, &x);
        assert_eq!(out, [0.0; 5]);
    }
}
