//! Summary statistics over a completed [`ResultSet`].
//!
//! Analytics are derived on demand and never stored inside the result set.

use serde::{Deserialize, Serialize};

use crate::error::{PitchError, Result};
use crate::frame::ResultSet;

/// Read-only summary of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub mean_confidence: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Pearson correlation between frame time and pitch, in [-1, 1].
    ///
    /// `0.0` when either sequence is constant (a single frame, a steady
    /// pitch): the coefficient is undefined there and no trend exists.
    /// Constancy is decided on the decoded values, not on rounded sums.
    pub time_pitch_correlation: f32,
}

/// Summarise a result set.
///
/// # Errors
/// `PitchError::EmptyResultSet` if `results` holds no frames.
pub fn summarize(results: &ResultSet) -> Result<Analytics> {
    if results.is_empty() {
        return Err(PitchError::EmptyResultSet);
    }

    let n = results.len() as f32;
    let mean_confidence = results.iter().map(|r| r.confidence).sum::<f32>() / n;
    let (min_frequency, max_frequency) = results.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY),
        |(lo, hi), r| (lo.min(r.pitch_hz), hi.max(r.pitch_hz)),
    );

    let time_pitch_correlation = if results.len() < 2 || min_frequency == max_frequency {
        0.0
    } else {
        correlation(&results.times(), &results.pitches()).unwrap_or(0.0)
    };

    Ok(Analytics {
        mean_confidence,
        min_frequency,
        max_frequency,
        time_pitch_correlation,
    })
}

/// Pearson correlation coefficient of two equal-length sequences.
///
/// Returns `None` when the lengths differ, the input is empty, or either
/// centred sequence has zero norm. Sums are accumulated in `f64` so a
/// constant sequence centres to exact zeros.
pub fn correlation(x: &[f32], y: &[f32]) -> Option<f32> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }

    let n = x.len() as f64;
    let x_mean = x.iter().map(|&v| v as f64).sum::<f64>() / n;
    let y_mean = y.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut numerator = 0.0f64;
    let mut x_norm_sq = 0.0f64;
    let mut y_norm_sq = 0.0f64;
    for (&xi, &yi) in x.iter().zip(y) {
        let x_diff = xi as f64 - x_mean;
        let y_diff = yi as f64 - y_mean;
        numerator += x_diff * y_diff;
        x_norm_sq += x_diff * x_diff;
        y_norm_sq += y_diff * y_diff;
    }

    let denominator = x_norm_sq.sqrt() * y_norm_sq.sqrt();
    if denominator <= 0.0 || !denominator.is_finite() {
        return None;
    }
    Some((numerator / denominator).clamp(-1.0, 1.0) as f32)
}
