//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! The model only understands `SAMPLE_RATE` audio. Files and devices at other
//! rates go through `RateConverter` first; when the rates already match it is
//! a passthrough and no rubato session is created.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 960)?;
//! let mut out = rc.process(&raw_samples)?;
//! out.extend(rc.flush()?);
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, info};

use crate::error::{PitchError, Result};

/// Input block size used by [`resample_to`].
const OFFLINE_CHUNK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input chunk carried between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter taking `chunk_size` input samples per rubato call.
    ///
    /// # Errors
    /// `PitchError::Resample` for a zero rate or if rubato fails to initialise.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(PitchError::Resample(format!(
                "invalid rates {from_rate} -> {to_rate}"
            )));
        }
        let chunk_size = chunk_size.max(1);
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| PitchError::Resample(format!("resampler init: {e}")))?;

        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
        info!(from_rate, to_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    /// Feed samples and return whatever output is ready (may be empty).
    ///
    /// Input is accumulated until a full chunk is available; the remainder is
    /// kept for the next call or for [`flush`](Self::flush).
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();
        let mut offset = 0;
        while self.input_buf.len() - offset >= self.chunk_size {
            let chunk = &self.input_buf[offset..offset + self.chunk_size];
            let (_, produced) = resampler
                .process_into_buffer(&[chunk], &mut self.output_buf, None)
                .map_err(|e| PitchError::Resample(e.to_string()))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            offset += self.chunk_size;
        }
        self.input_buf.drain(..offset);
        Ok(result)
    }

    /// Zero-pad and process any buffered partial chunk.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            self.input_buf.clear();
            return Ok(Vec::new());
        }
        let padding = self.chunk_size - self.input_buf.len();
        self.process(&vec![0.0; padding])
    }

    /// Output samples of latency the resampler adds at the start.
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Returns `true` when no resampling occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert a complete buffer between rates.
///
/// The output is aligned with the input (resampler latency removed) and holds
/// `round(len * to / from)` samples.
pub fn resample_to(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let mut rc = RateConverter::new(from_rate, to_rate, OFFLINE_CHUNK)?;
    if rc.is_passthrough() {
        return Ok(samples.to_vec());
    }

    let expected = ((samples.len() as u64 * to_rate as u64 + from_rate as u64 / 2)
        / from_rate as u64) as usize;
    let delay = rc.output_delay();

    let mut out = rc.process(samples)?;
    out.extend(rc.flush()?);
    let silence = vec![0.0; OFFLINE_CHUNK];
    while out.len() < delay + expected {
        let tail = rc.process(&silence)?;
        if tail.is_empty() {
            break;
        }
        out.extend(tail);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    debug!(
        from_rate,
        to_rate,
        input = samples.len(),
        output = out.len(),
        "buffer resampled"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples).unwrap(), samples);
        assert!(rc.flush().unwrap().is_empty());
    }

    #[test]
    fn one_chunk_48k_to_16k_is_about_a_third() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let out = rc.process(&vec![0.0f32; 960]).unwrap();
        assert!(
            (out.len() as isize - 320).unsigned_abs() <= 10,
            "output len={}",
            out.len()
        );
    }

    #[test]
    fn partial_chunk_is_held_until_flush() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.0f32; 500]).unwrap().is_empty());
        assert!(!rc.flush().unwrap().is_empty());
        assert!(rc.flush().unwrap().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 16_000, 960),
            Err(PitchError::Resample(_))
        ));
    }

    #[test]
    fn resample_to_hits_the_expected_length() {
        let input: Vec<f32> = (0..44_100)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44_100.0).sin())
            .collect();
        let out = resample_to(&input, 44_100, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.8 && peak < 1.2, "peak={peak}");
    }

    #[test]
    fn resample_to_same_rate_copies() {
        let input = vec![0.5f32; 100];
        assert_eq!(resample_to(&input, 16_000, 16_000).unwrap(), input);
    }
}
