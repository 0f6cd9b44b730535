//! Mono sample buffer with its sample rate, the input to offline analysis.

use crate::constants::SAMPLE_RATE;
use crate::error::Result;

use super::resample::resample_to;

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Average interleaved channels into one.
    ///
    /// A trailing partial frame is ignored. `channels == 0` is treated as mono.
    pub fn from_interleaved(interleaved: &[f32], channels: u16, sample_rate: u32) -> Self {
        let ch = channels.max(1) as usize;
        let samples = if ch == 1 {
            interleaved.to_vec()
        } else {
            interleaved
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect()
        };
        Self::new(samples, sample_rate)
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert to the model's sample rate. No-op when already there.
    pub fn to_model_rate(self) -> Result<Self> {
        if self.sample_rate == SAMPLE_RATE {
            return Ok(self);
        }
        let samples = resample_to(&self.samples, self.sample_rate, SAMPLE_RATE)?;
        Ok(Self::new(samples, SAMPLE_RATE))
    }
}
