//! Offline analysis of a complete buffer.
//!
//! ## Stages (per frame)
//!
//! ```text
//! samples[i*FFT_HOP .. i*FFT_HOP + FRAME_LENGTH]
//!     └─► normalize (own scratch buffer)
//!         └─► ModelHandle::infer
//!             └─► decode → FrameResult { pitch, confidence, i*FFT_HOP / sample_rate }
//! ```
//!
//! Frames are independent, so above `parallel_min_frames` the loop runs on
//! rayon. Results are collected by index, never appended on completion, so
//! output order is frame order regardless of scheduling. The first failing
//! frame aborts the whole batch.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    constants::{FFT_HOP, FRAME_LENGTH, PARALLEL_MIN_FRAMES, SAMPLE_RATE},
    error::{PitchError, Result},
    frame::{decode::decode, normalize::normalize_in_place, AnalysisWarning, FrameResult, ResultSet},
    inference::ModelHandle,
};

/// Configuration for [`BatchPipeline`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Rate the model was trained on. Other input rates are analysed anyway
    /// but flagged with `AnalysisWarning::SampleRateMismatch`. Default: 16000.
    pub expected_sample_rate: u32,
    /// Allow frame-parallel inference. Default: true.
    pub parallel: bool,
    /// Parallelism only kicks in above this many frames. Default: 16.
    pub parallel_min_frames: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            expected_sample_rate: SAMPLE_RATE,
            parallel: true,
            parallel_min_frames: PARALLEL_MIN_FRAMES,
        }
    }
}

/// Number of overlapping frames in `total_samples` (0 when shorter than one frame).
pub fn frame_count(total_samples: usize) -> usize {
    if total_samples < FRAME_LENGTH {
        0
    } else {
        (total_samples - FRAME_LENGTH) / FFT_HOP + 1
    }
}

/// Normalise, infer and decode one frame.
///
/// `scratch` is overwritten with the normalised frame; pass a reused buffer
/// to avoid a per-frame allocation.
pub fn analyze_frame_with(
    model: &ModelHandle,
    scratch: &mut Vec<f32>,
    samples: &[f32],
    start_sample: u64,
    sample_rate: u32,
) -> Result<FrameResult> {
    scratch.clear();
    scratch.extend_from_slice(samples);
    normalize_in_place(scratch);

    let activation = model.infer(scratch)?;
    let decoded = decode(&activation)?;

    Ok(FrameResult {
        pitch_hz: decoded.pitch_hz,
        confidence: decoded.confidence,
        time_sec: start_sample as f32 / sample_rate as f32,
    })
}

/// Allocating variant of [`analyze_frame_with`].
pub fn analyze_frame(
    model: &ModelHandle,
    samples: &[f32],
    start_sample: u64,
    sample_rate: u32,
) -> Result<FrameResult> {
    let mut scratch = Vec::with_capacity(samples.len());
    analyze_frame_with(model, &mut scratch, samples, start_sample, sample_rate)
}

/// Segments a buffer into overlapping frames and analyses each one.
#[derive(Debug, Clone)]
pub struct BatchPipeline {
    config: BatchConfig,
    model: ModelHandle,
}

impl BatchPipeline {
    pub fn new(config: BatchConfig, model: ModelHandle) -> Self {
        Self { config, model }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Analyse a mono buffer.
    ///
    /// Buffers shorter than one frame yield an empty `ResultSet`.
    ///
    /// # Errors
    /// - `PitchError::ModelInvocation` if any frame's inference fails.
    /// - `PitchError::InvalidActivationSize` if the model returns the wrong bin count.
    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> Result<ResultSet> {
        if sample_rate == 0 {
            return Err(PitchError::Other(anyhow::anyhow!(
                "sample rate must be non-zero"
            )));
        }

        let mut warnings = Vec::new();
        if sample_rate != self.config.expected_sample_rate {
            let warning = AnalysisWarning::SampleRateMismatch {
                expected: self.config.expected_sample_rate,
                actual: sample_rate,
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        let num_frames = frame_count(samples.len());
        if num_frames == 0 {
            debug!(
                samples = samples.len(),
                "input shorter than one frame; empty result set"
            );
            return Ok(ResultSet::empty(sample_rate).with_warnings(warnings));
        }

        let parallel = self.config.parallel && num_frames > self.config.parallel_min_frames;
        let started = Instant::now();

        let frame_at = |scratch: &mut Vec<f32>, i: usize| {
            let start = i * FFT_HOP;
            analyze_frame_with(
                &self.model,
                scratch,
                &samples[start..start + FRAME_LENGTH],
                start as u64,
                sample_rate,
            )
        };

        let results: Vec<FrameResult> = if parallel {
            (0..num_frames)
                .into_par_iter()
                .map_init(|| Vec::with_capacity(FRAME_LENGTH), frame_at)
                .collect::<Result<Vec<_>>>()?
        } else {
            let mut scratch = Vec::with_capacity(FRAME_LENGTH);
            (0..num_frames)
                .map(|i| frame_at(&mut scratch, i))
                .collect::<Result<Vec<_>>>()?
        };

        debug!(
            frames = num_frames,
            parallel,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "batch analysis complete"
        );

        Ok(ResultSet::new(results, sample_rate).with_warnings(warnings))
    }
}

/// Analyse `samples` with the default [`BatchConfig`].
pub fn analyze(model: &ModelHandle, samples: &[f32], sample_rate: u32) -> Result<ResultSet> {
    BatchPipeline::new(BatchConfig::default(), model.clone()).analyze(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MODEL_BINS;
    use crate::frame::decode::bin_frequency;
    use crate::inference::PitchModel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Always peaks at bin 7 with activation 0.75.
    struct FixedBinModel;

    impl PitchModel for FixedBinModel {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn infer(&mut self, _frame: &[f32]) -> Result<Vec<f32>> {
            let mut v = vec![0.0; MODEL_BINS];
            v[7] = 0.75;
            Ok(v)
        }
    }

    struct FailAfter {
        remaining: Arc<AtomicUsize>,
    }

    impl PitchModel for FailAfter {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn infer(&mut self, _frame: &[f32]) -> Result<Vec<f32>> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(PitchError::ModelInvocation("session lost".into()));
            }
            Ok(vec![0.0; MODEL_BINS])
        }
    }

    struct WrongSize;

    impl PitchModel for WrongSize {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn infer(&mut self, _frame: &[f32]) -> Result<Vec<f32>> {
            Ok(vec![0.0; 12])
        }
    }

    fn wave(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.01).sin()).collect()
    }

    #[test]
    fn frame_count_matches_hop_formula() {
        assert_eq!(frame_count(2000), 7);
        assert_eq!(frame_count(FRAME_LENGTH), 1);
        assert_eq!(frame_count(FRAME_LENGTH + FFT_HOP - 1), 1);
        assert_eq!(frame_count(FRAME_LENGTH + FFT_HOP), 2);
        assert_eq!(frame_count(FRAME_LENGTH - 1), 0);
        assert_eq!(frame_count(0), 0);
    }

    #[test]
    fn short_input_yields_empty_result_set() {
        let model = ModelHandle::new(FixedBinModel);
        let set = analyze(&model, &wave(FRAME_LENGTH - 1), SAMPLE_RATE).unwrap();
        assert!(set.is_empty());
        assert!(set.warnings().is_empty());
    }

    #[test]
    fn results_are_timestamped_by_hop() {
        let model = ModelHandle::new(FixedBinModel);
        let set = analyze(&model, &wave(2000), SAMPLE_RATE).unwrap();
        assert_eq!(set.len(), 7);
        for (i, r) in set.iter().enumerate() {
            let expected = (i * FFT_HOP) as f32 / SAMPLE_RATE as f32;
            assert_eq!(r.time_sec, expected);
            assert_eq!(r.pitch_hz, bin_frequency(7));
            assert_eq!(r.confidence, 0.75);
        }
    }

    #[test]
    fn parallel_and_serial_paths_agree() {
        let samples = wave(FRAME_LENGTH + FFT_HOP * 63);
        let serial = BatchPipeline::new(
            BatchConfig {
                parallel: false,
                ..BatchConfig::default()
            },
            ModelHandle::new(crate::inference::stub::StubModel::new()),
        )
        .analyze(&samples, SAMPLE_RATE)
        .unwrap();
        let pooled = ModelHandle::pool_with(4, || Ok(crate::inference::stub::StubModel::new()))
            .unwrap();
        let parallel = BatchPipeline::new(BatchConfig::default(), pooled)
            .analyze(&samples, SAMPLE_RATE)
            .unwrap();
        assert_eq!(serial.len(), 64);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn sample_rate_mismatch_is_a_warning_not_an_error() {
        let model = ModelHandle::new(FixedBinModel);
        let set = analyze(&model, &wave(2000), 44_100).unwrap();
        assert_eq!(set.len(), 7);
        assert_eq!(
            set.warnings(),
            &[AnalysisWarning::SampleRateMismatch {
                expected: SAMPLE_RATE,
                actual: 44_100
            }]
        );
        assert_eq!(set.get(1).unwrap().time_sec, FFT_HOP as f32 / 44_100.0);
    }

    #[test]
    fn model_failure_aborts_the_batch() {
        let model = ModelHandle::new(FailAfter {
            remaining: Arc::new(AtomicUsize::new(3)),
        });
        let err = analyze(&model, &wave(FRAME_LENGTH + FFT_HOP * 40), SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, PitchError::ModelInvocation(_)), "{err:?}");
    }

    #[test]
    fn wrong_activation_size_is_fatal() {
        let model = ModelHandle::new(WrongSize);
        let err = analyze(&model, &wave(2000), SAMPLE_RATE).unwrap_err();
        assert!(matches!(
            err,
            PitchError::InvalidActivationSize {
                expected: MODEL_BINS,
                actual: 12
            }
        ));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let model = ModelHandle::new(FixedBinModel);
        assert!(analyze(&model, &wave(2000), 0).is_err());
    }
}
