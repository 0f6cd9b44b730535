//! CREPE-style ONNX backend via the `ort` crate.
//!
//! ## Model I/O
//!
//! | Name     | Shape                 | DType | Direction |
//! |----------|-----------------------|-------|-----------|
//! | input    | `[1, FRAME_LENGTH]`   | f32   | in        |
//! | output   | `[1, MODEL_BINS]`     | f32   | out       |
//!
//! Tensor names are resolved from the session, so both `input`/`frames` and
//! `output`/`activation` style exports load.
//!
//! ## Environment
//!
//! | Variable                        | Meaning                           |
//! |---------------------------------|-----------------------------------|
//! | `PITCHTRACK_MODEL_PATH`         | model file (overrides default)    |
//! | `PITCHTRACK_ORT_INTRA_THREADS`  | intra-op threads, default 1       |

use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::{debug, info};

use crate::{
    constants::{FRAME_LENGTH, MODEL_BINS},
    error::{PitchError, Result},
    inference::PitchModel,
};

const DEFAULT_MODEL_FILE: &str = "crepe.onnx";

// ── Model config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OnnxPitchModelConfig {
    pub model_path: PathBuf,
    pub intra_threads: usize,
}

impl Default for OnnxPitchModelConfig {
    fn default() -> Self {
        let model_path = std::env::var("PITCHTRACK_MODEL_PATH")
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_models_dir().join(DEFAULT_MODEL_FILE));
        let intra_threads = std::env::var("PITCHTRACK_ORT_INTRA_THREADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, 32);
        Self {
            model_path,
            intra_threads,
        }
    }
}

pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("pitchtrack").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("pitchtrack")
            .join("models")
    }
}

fn create_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    let builder = SessionBuilder::new()
        .map_err(|e| PitchError::OnnxSession(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| PitchError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| PitchError::OnnxSession(e.to_string()))?;
    info!(intra_threads, "ONNX session threading configured");

    builder
        .commit_from_file(model_path)
        .map_err(|e| PitchError::OnnxSession(e.to_string()))
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

/// The output resolved at warm-up must be present on every run.
fn require_output<'a, T>(found: Option<&'a T>, name: &str) -> Result<&'a T> {
    found.ok_or_else(|| {
        PitchError::ModelInvocation(format!("model produced no '{name}' output"))
    })
}

// ── OnnxPitchModel ───────────────────────────────────────────────────────────

/// One ONNX runtime session. Build several and pool them with
/// [`crate::ModelHandle::pool`] for parallel batch analysis.
pub struct OnnxPitchModel {
    config: OnnxPitchModelConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxPitchModel {
    pub fn new(config: OnnxPitchModelConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }
}

impl PitchModel for OnnxPitchModel {
    fn warm_up(&mut self) -> Result<()> {
        let path = self.config.model_path.clone();
        if !path.exists() {
            info!("  {:?}: NOT FOUND", path);
            return Err(PitchError::ModelNotFound { path });
        }
        let size_mb = std::fs::metadata(&path)
            .map(|m| m.len() as f64 / 1_048_576.0)
            .unwrap_or(0.0);
        info!("loading pitch model from {:?} ({:.2} MB)", path, size_mb);

        let session = create_session(&path, self.config.intra_threads)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        info!("  inputs: {:?}", input_names);
        info!("  outputs: {:?}", output_names);

        self.input_name = resolve_name(&input_names, &["input", "frames", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| PitchError::OnnxSession("pitch model has no inputs".into()))?;
        self.output_name = resolve_name(&output_names, &["output", "activation", "probs"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| PitchError::OnnxSession("pitch model has no outputs".into()))?;
        self.session = Some(session);

        // Dummy forward pass to populate caches and validate the output shape.
        let activation = self.infer(&[0.0; FRAME_LENGTH])?;
        if activation.len() != MODEL_BINS {
            return Err(PitchError::InvalidActivationSize {
                expected: MODEL_BINS,
                actual: activation.len(),
            });
        }

        info!("pitch model warm-up complete");
        Ok(())
    }

    fn infer(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        let Some(session) = self.session.as_mut() else {
            return Err(PitchError::OnnxSession(
                "model not loaded, call warm_up() first".into(),
            ));
        };

        let input_arr = Array2::<f32>::from_shape_vec((1, frame.len()), frame.to_vec())
            .map_err(|e| PitchError::OnnxSession(e.to_string()))?;
        let input_val = Value::from_array(input_arr)
            .map_err(|e: ort::Error| PitchError::OnnxSession(e.to_string()))?;
        let inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        let outputs = session
            .run(inputs)
            .map_err(|e| PitchError::ModelInvocation(e.to_string()))?;

        let output =
            require_output(outputs.get(self.output_name.as_str()), &self.output_name)?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PitchError::ModelInvocation(e.to_string()))?;

        debug!(bins = data.len(), "pitch model inference");
        Ok(data.to_vec())
    }
}
