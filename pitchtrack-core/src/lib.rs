//! # pitchtrack-core
//!
//! Frame-based pitch estimation with a CREPE-style bin model.
//!
//! ## Architecture
//!
//! ```text
//! Offline:  WAV → AudioBuffer → BatchPipeline (rayon over hop-spaced frames)
//!                                     │
//!                        normalize → PitchModel::infer → decode
//!                                     │
//!                               ResultSet → analytics::summarize
//!
//! Live:     Microphone → AudioCapture → FrameProducer ─SPSC─► FrameAssembler
//!                                                                 │
//!                                                     tracker::run (own thread)
//!                                                                 │
//!                                               broadcast::Sender<PitchEvent>
//! ```
//!
//! The audio callback is zero-alloc and lock-free. All heap work happens on
//! the analysis side.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analytics;
pub mod audio;
pub mod batch;
pub mod buffering;
pub mod constants;
pub mod engine;
pub mod error;
pub mod frame;
pub mod inference;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use analytics::{summarize, Analytics};
pub use audio::AudioBuffer;
pub use batch::{BatchConfig, BatchPipeline};
pub use buffering::{frame_stream, AssemblerConfig, FrameAssembler, FrameProducer, StreamState};
pub use engine::{EngineConfig, PitchTracker};
pub use error::PitchError;
pub use frame::{AnalysisWarning, Frame, FrameResult, ResultSet};
pub use inference::{stub::StubModel, ModelHandle, PitchModel};
pub use ipc::events::{EngineStatus, EngineStatusEvent, PitchEvent};

#[cfg(feature = "onnx")]
pub use inference::{OnnxPitchModel, OnnxPitchModelConfig};
