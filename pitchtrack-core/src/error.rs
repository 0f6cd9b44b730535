use thiserror::Error;

/// All errors produced by pitchtrack-core.
#[derive(Debug, Error)]
pub enum PitchError {
    #[error("activation vector has {actual} bins, expected {expected}")]
    InvalidActivationSize { expected: usize, actual: usize },

    #[error("frame has {actual} samples, expected {expected}")]
    InvalidFrameLength { expected: usize, actual: usize },

    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("result set is empty; analytics are undefined")]
    EmptyResultSet,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("WAV error: {0}")]
    Wav(String),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("tracker is already running")]
    AlreadyRunning,

    #[error("tracker is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<hound::Error> for PitchError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => PitchError::Io(io),
            other => PitchError::Wav(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PitchError>;
