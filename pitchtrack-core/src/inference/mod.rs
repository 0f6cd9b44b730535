//! Pitch model abstraction.
//!
//! The `PitchModel` trait decouples the pipelines from any specific backend
//! (stub YIN estimator, ONNX CREPE graph, ...). A backend maps one normalised
//! frame of `FRAME_LENGTH` samples to `MODEL_BINS` activations.
//!
//! `&mut self` on `infer` reflects that runtime sessions are generally not
//! safe to call concurrently. `ModelHandle` owns one or more sessions, each
//! behind its own `parking_lot::Mutex`:
//!
//! - one session: every inference call is serialised, while the surrounding
//!   normalisation and decoding still run in parallel;
//! - a pool: each rayon worker is routed to its own session, so parallel
//!   batch analysis rarely contends.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxPitchModel, OnnxPitchModelConfig};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::FRAME_LENGTH;
use crate::error::{PitchError, Result};

/// Contract for pitch classification backends.
pub trait PitchModel: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference to populate
    /// caches. Called once before the first `infer`.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Classify one normalised frame of `FRAME_LENGTH` samples.
    ///
    /// # Returns
    /// The activation vector, one score per frequency bin. Callers validate
    /// its length before decoding.
    fn infer(&mut self, frame: &[f32]) -> Result<Vec<f32>>;
}

impl<M: PitchModel + ?Sized> PitchModel for Box<M> {
    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }

    fn infer(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        (**self).infer(frame)
    }
}

type Session = Mutex<Box<dyn PitchModel>>;

/// Thread-safe, reference-counted handle to one or more model sessions.
///
/// Uses `parking_lot::Mutex` for:
/// - Non-poisoning on panic (unlike `std::sync::Mutex`)
/// - Cheap uncontended locking on the per-frame hot path
#[derive(Clone)]
pub struct ModelHandle {
    sessions: Arc<Vec<Session>>,
}

impl ModelHandle {
    /// Wrap a single model. All inference calls are serialised through it.
    pub fn new<M: PitchModel>(model: M) -> Self {
        Self {
            sessions: Arc::new(vec![Mutex::new(Box::new(model) as Box<dyn PitchModel>)]),
        }
    }

    /// Wrap independent sessions of the same model.
    ///
    /// # Errors
    /// Fails when `models` is empty.
    pub fn pool<M, I>(models: I) -> Result<Self>
    where
        M: PitchModel,
        I: IntoIterator<Item = M>,
    {
        let sessions: Vec<Session> = models
            .into_iter()
            .map(|m| Mutex::new(Box::new(m) as Box<dyn PitchModel>))
            .collect();
        if sessions.is_empty() {
            return Err(PitchError::Other(anyhow::anyhow!(
                "model pool needs at least one session"
            )));
        }
        Ok(Self {
            sessions: Arc::new(sessions),
        })
    }

    /// Build a pool of `count` sessions, one per rayon worker by default.
    pub fn pool_with<M, F>(count: usize, mut factory: F) -> Result<Self>
    where
        M: PitchModel,
        F: FnMut() -> Result<M>,
    {
        let models = (0..count.max(1))
            .map(|_| factory())
            .collect::<Result<Vec<M>>>()?;
        Self::pool(models)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Warm up every session.
    pub fn warm_up(&self) -> Result<()> {
        for session in self.sessions.iter() {
            session.lock().warm_up()?;
        }
        Ok(())
    }

    /// Run one frame through the model.
    ///
    /// Only the backend call is inside the lock. Backend failures surface as
    /// `PitchError::ModelInvocation`.
    ///
    /// # Errors
    /// - `PitchError::InvalidFrameLength` if `frame.len() != FRAME_LENGTH`.
    /// - `PitchError::ModelInvocation` if the backend fails.
    pub fn infer(&self, frame: &[f32]) -> Result<Vec<f32>> {
        if frame.len() != FRAME_LENGTH {
            return Err(PitchError::InvalidFrameLength {
                expected: FRAME_LENGTH,
                actual: frame.len(),
            });
        }

        let slot = rayon::current_thread_index().unwrap_or(0) % self.sessions.len();
        let result = self.sessions[slot].lock().infer(frame);
        result.map_err(|e| match e {
            PitchError::ModelInvocation(_) => e,
            other => PitchError::ModelInvocation(other.to_string()),
        })
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
