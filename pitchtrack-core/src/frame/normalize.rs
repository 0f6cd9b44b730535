//! Per-frame standardisation applied before inference.
//!
//! The model was trained on zero-mean, unit-variance windows. Frames whose
//! standard deviation is at or below [`NORMALIZE_EPSILON`] (digital silence, DC)
//! only get the mean removed; scaling them would amplify rounding noise.

use crate::constants::NORMALIZE_EPSILON;

/// Remove the DC offset and scale to unit variance, in place.
///
/// Sums are accumulated in `f64` so a constant frame yields exact zeros rather
/// than a one-ulp residue that would then be blown up to ±1.
pub fn normalize_in_place(frame: &mut [f32]) {
    if frame.is_empty() {
        return;
    }
    let n = frame.len() as f64;

    let mean = (frame.iter().map(|&x| x as f64).sum::<f64>() / n) as f32;
    frame.iter_mut().for_each(|x| *x -= mean);

    let variance = frame.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / n;
    let std_dev = variance.sqrt() as f32;

    if std_dev > NORMALIZE_EPSILON {
        let inv_std_dev = 1.0 / std_dev;
        frame.iter_mut().for_each(|x| *x *= inv_std_dev);
    }
}

/// Copying variant of [`normalize_in_place`].
pub fn normalized(frame: &[f32]) -> Vec<f32> {
    let mut out = frame.to_vec();
    normalize_in_place(&mut out);
    out
}
