//! `StubModel`: weight-free backend built on the YIN period estimator.
//!
//! Produces activations shaped like a trained model's: a Gaussian bump
//! (25 cents wide) over the bins nearest the detected pitch, scaled by how
//! periodic the frame is. Frames without a clear period get a flat, low
//! activation. Lets the batch and streaming paths be exercised end to end
//! without model files.

use tracing::debug;

use crate::constants::{
    BASE_FREQUENCY, CENTS_CONVERSION, MODEL_BASE_CENTS, MODEL_BINS, PITCH_CONVERSION_FACTOR,
    SAMPLE_RATE,
};
use crate::error::Result;
use crate::inference::PitchModel;

/// Activation emitted on every bin for unvoiced frames.
const UNVOICED_LEVEL: f32 = 0.05;
/// YIN absolute threshold on the cumulative mean normalised difference.
const YIN_THRESHOLD: f32 = 0.15;

/// YIN-based stand-in for a trained pitch model.
#[derive(Debug, Clone)]
pub struct StubModel {
    sample_rate: f32,
    min_freq: f32,
    max_freq: f32,
    deviation_cents: f32,
}

impl StubModel {
    pub fn new() -> Self {
        Self {
            sample_rate: SAMPLE_RATE as f32,
            min_freq: 32.0,
            max_freq: 2000.0,
            deviation_cents: 25.0,
        }
    }

    /// Activation vector for a known frequency with the given peak height.
    fn activation_for(&self, freq: f32, peak: f32) -> Vec<f32> {
        let cents = CENTS_CONVERSION * (freq / BASE_FREQUENCY).log2();
        (0..MODEL_BINS)
            .map(|bin| {
                let bin_cents = MODEL_BASE_CENTS + bin as f32 * PITCH_CONVERSION_FACTOR;
                let d = (bin_cents - cents) / self.deviation_cents;
                peak * (-0.5 * d * d).exp()
            })
            .collect()
    }
}

impl Default for StubModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchModel for StubModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubModel::warm_up is a no-op");
        Ok(())
    }

    fn infer(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        match yin(frame, self.sample_rate, self.min_freq, self.max_freq) {
            Some((freq, aperiodicity)) => {
                let peak = (1.0 - aperiodicity).clamp(UNVOICED_LEVEL, 1.0);
                Ok(self.activation_for(freq, peak))
            }
            None => Ok(vec![UNVOICED_LEVEL; MODEL_BINS]),
        }
    }
}

/// YIN period estimate (de Cheveigné & Kawahara, 2002).
///
/// Returns the refined frequency and the normalised difference at the chosen
/// lag (0 = perfectly periodic).
fn yin(frame: &[f32], sample_rate: f32, min_freq: f32, max_freq: f32) -> Option<(f32, f32)> {
    let n = frame.len();
    let max_tau = ((sample_rate / min_freq) as usize).min(n / 2);
    let min_tau = ((sample_rate / max_freq) as usize).max(2);
    if min_tau + 1 >= max_tau {
        return None;
    }

    let mut diff = vec![0.0f32; max_tau + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = frame[..n - tau]
            .iter()
            .zip(&frame[tau..])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
    }

    let mut cmnd = vec![1.0f32; max_tau + 1];
    let mut running = 0.0f32;
    for tau in 1..=max_tau {
        running += diff[tau];
        // All-zero differences mean silence or DC: no period to find.
        cmnd[tau] = if running > 1e-8 {
            diff[tau] * tau as f32 / running
        } else {
            1.0
        };
    }

    let mut tau = min_tau;
    let found = loop {
        if tau >= max_tau {
            break None;
        }
        if cmnd[tau] < YIN_THRESHOLD {
            // Walk down to the bottom of this dip.
            while tau + 1 < max_tau && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            break Some(tau);
        }
        tau += 1;
    }?;

    let (a, b, c) = (cmnd[found - 1], cmnd[found], cmnd[found + 1]);
    let denom = a - 2.0 * b + c;
    let refined = if denom.abs() < 1e-8 {
        found as f32
    } else {
        found as f32 + (a - c) / (2.0 * denom)
    };

    Some((sample_rate / refined, b.clamp(0.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_LENGTH;
    use crate::frame::decode::decode;
    use crate::frame::normalize::normalized;
    use approx::assert_relative_eq;

    fn sine(freq: f32) -> Vec<f32> {
        (0..FRAME_LENGTH)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn detects_a440_within_one_bin() {
        let mut model = StubModel::new();
        let activation = model.infer(&normalized(&sine(440.0))).unwrap();
        let decoded = decode(&activation).unwrap();
        // Bins are 20 cents apart → within ±1.2 %.
        assert_relative_eq!(decoded.pitch_hz, 440.0, max_relative = 0.012);
        assert!(decoded.confidence > 0.8, "confidence={}", decoded.confidence);
    }

    #[test]
    fn tracks_low_and_high_notes() {
        let mut model = StubModel::new();
        for freq in [82.4f32, 196.0, 987.8] {
            let activation = model.infer(&normalized(&sine(freq))).unwrap();
            let decoded = decode(&activation).unwrap();
            assert_relative_eq!(decoded.pitch_hz, freq, max_relative = 0.012);
        }
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut model = StubModel::new();
        let activation = model.infer(&vec![0.0; FRAME_LENGTH]).unwrap();
        assert_eq!(activation.len(), MODEL_BINS);
        assert!(activation.iter().all(|&a| a == UNVOICED_LEVEL));
    }
}
