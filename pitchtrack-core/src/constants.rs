//! Scheme constants shared with the trained pitch model.
//!
//! These values are part of the model's input/output contract. Changing any of
//! them without retraining produces silently wrong pitches.

/// Sample rate the model was trained on (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

/// Hop between consecutive batch frames: 10 ms at 16 kHz.
pub const FFT_HOP: usize = 160;

/// Samples per analysis frame.
pub const FRAME_LENGTH: usize = 1024;

/// Number of activation bins produced per frame.
pub const MODEL_BINS: usize = 360;

/// Cents of bin 0, relative to `BASE_FREQUENCY`.
#[allow(clippy::excessive_precision)]
pub const MODEL_BASE_CENTS: f32 = 1997.379_408_437_619_1;

/// Cents spanned from bin 0 to the last bin.
pub const MODEL_RANGE_CENTS: f32 = 7180.0;

pub const BASE_FREQUENCY: f32 = 10.0;

/// Cents per octave.
pub const CENTS_CONVERSION: f32 = 1200.0;

/// Cents between adjacent bins (20 cents).
pub const PITCH_CONVERSION_FACTOR: f32 = MODEL_RANGE_CENTS / (MODEL_BINS as f32 - 1.0);

/// Reciprocal of `CENTS_CONVERSION`, multiplied rather than divided when decoding.
pub const OCTAVE_FACTOR: f32 = 1.0 / CENTS_CONVERSION;

pub const OCTAVE_BASE: f32 = 2.0;

/// Standard deviation below which a frame is treated as silence/DC.
pub const NORMALIZE_EPSILON: f32 = 1e-10;

/// Confidence above which a frame is considered voiced.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Batch inputs with more frames than this are processed in parallel.
pub const PARALLEL_MIN_FRAMES: usize = 16;

/// Default streaming queue capacity, in frames.
pub const QUEUE_CAPACITY_FRAMES: usize = 10;
