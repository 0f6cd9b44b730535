//! Activation vector → (pitch, confidence).
//!
//! The bin with the highest activation wins; its index is mapped to cents on
//! a fixed logarithmic grid and then to Hz. The arithmetic order is fixed
//! so results are reproducible bit-for-bit near bin edges.

use crate::constants::{
    BASE_FREQUENCY, MODEL_BASE_CENTS, MODEL_BINS, OCTAVE_BASE, OCTAVE_FACTOR,
    PITCH_CONVERSION_FACTOR,
};
use crate::error::{PitchError, Result};

/// Pitch and confidence for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded {
    pub pitch_hz: f32,
    pub confidence: f32,
    /// Winning bin.
    pub bin: usize,
}

/// Decode a model activation vector.
///
/// # Errors
/// `PitchError::InvalidActivationSize` when `activation.len() != MODEL_BINS`.
pub fn decode(activation: &[f32]) -> Result<Decoded> {
    if activation.len() != MODEL_BINS {
        return Err(PitchError::InvalidActivationSize {
            expected: MODEL_BINS,
            actual: activation.len(),
        });
    }

    let (bin, confidence) = argmax(activation);
    Ok(Decoded {
        pitch_hz: bin_frequency(bin),
        confidence,
        bin,
    })
}

/// Centre frequency of `bin` in Hz.
pub fn bin_frequency(bin: usize) -> f32 {
    let cents = MODEL_BASE_CENTS + (bin as f32 * PITCH_CONVERSION_FACTOR);
    BASE_FREQUENCY * OCTAVE_BASE.powf(cents * OCTAVE_FACTOR)
}

/// First index holding the maximum value (linear scan, ties keep the earliest).
fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best_index = 0;
    let mut best = values[0];
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best {
            best = v;
            best_index = i;
        }
    }
    (best_index, best)
}
