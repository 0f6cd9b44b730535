//! Frames and per-frame results.
//!
//! A [`Frame`] is the unit the model consumes; a [`FrameResult`] is what comes
//! back after normalisation, inference and decoding. A [`ResultSet`] is the
//! ordered, immutable output of one analysis run.

pub mod decode;
pub mod normalize;

use serde::{Deserialize, Serialize};

use crate::constants::CONFIDENCE_THRESHOLD;

/// One window of `FRAME_LENGTH` mono samples pulled from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Index of the first sample relative to the start of the stream.
    pub start_sample: u64,
    pub samples: Vec<f32>,
}

impl Frame {
    pub fn new(start_sample: u64, samples: Vec<f32>) -> Self {
        Self {
            start_sample,
            samples,
        }
    }

    /// Start time of this frame in seconds.
    pub fn start_secs(&self, sample_rate: u32) -> f32 {
        self.start_sample as f32 / sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Estimated pitch for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    /// Fundamental frequency in Hz.
    pub pitch_hz: f32,
    /// Peak activation in [0.0, 1.0] for sigmoid-output models.
    pub confidence: f32,
    /// Frame start time in seconds.
    pub time_sec: f32,
}

impl FrameResult {
    pub fn is_voiced(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// Non-fatal conditions detected while producing a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AnalysisWarning {
    /// Input was not at the model's sample rate; pitches are likely scaled
    /// by `actual / expected`.
    SampleRateMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisWarning::SampleRateMismatch { expected, actual } => {
                write!(f, "model expects {expected} Hz audio, got {actual} Hz")
            }
        }
    }
}

/// Ordered per-frame results of one analysis run.
///
/// Index `i` always corresponds to the `i`-th frame by start position. There
/// is no mutable access; analytics are computed on demand by
/// [`crate::analytics::summarize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    results: Vec<FrameResult>,
    sample_rate: u32,
    warnings: Vec<AnalysisWarning>,
}

impl ResultSet {
    pub fn new(results: Vec<FrameResult>, sample_rate: u32) -> Self {
        Self {
            results,
            sample_rate,
            warnings: Vec::new(),
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub(crate) fn with_warnings(mut self, warnings: Vec<AnalysisWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    pub fn as_slice(&self) -> &[FrameResult] {
        &self.results
    }

    pub fn get(&self, index: usize) -> Option<&FrameResult> {
        self.results.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameResult> {
        self.results.iter()
    }

    pub fn pitches(&self) -> Vec<f32> {
        self.results.iter().map(|r| r.pitch_hz).collect()
    }

    pub fn confidences(&self) -> Vec<f32> {
        self.results.iter().map(|r| r.confidence).collect()
    }

    pub fn times(&self) -> Vec<f32> {
        self.results.iter().map(|r| r.time_sec).collect()
    }

    /// Frames whose confidence reaches `threshold`.
    pub fn voiced(&self, threshold: f32) -> impl Iterator<Item = &FrameResult> + '_ {
        self.results.iter().filter(move |r| r.is_voiced(threshold))
    }

    /// Frames above the default voicing threshold.
    pub fn voiced_default(&self) -> impl Iterator<Item = &FrameResult> + '_ {
        self.voiced(CONFIDENCE_THRESHOLD)
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a FrameResult;
    type IntoIter = std::slice::Iter<'a, FrameResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
