//! Blocking analysis loop for live tracking.
//!
//! ## Stages (per frame)
//!
//! ```text
//! 1. FrameAssembler::pull_frame  (disjoint FRAME_LENGTH frames, FIFO)
//! 2. normalize → ModelHandle::infer → decode
//! 3. Broadcast PitchEvent { seq, result }
//! ```
//!
//! The loop ends when the assembler reports `Drained`, i.e. after the
//! producer signalled finished and every whole buffered frame was analysed.
//! A failing frame is counted and logged; the stream keeps going. The first
//! failure of a run is also published as an `EngineStatusEvent` so
//! subscribers see why frames are missing.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    batch::analyze_frame_with,
    buffering::FrameAssembler,
    constants::FRAME_LENGTH,
    frame::AnalysisWarning,
    inference::ModelHandle,
    ipc::events::{EngineStatus, EngineStatusEvent, PitchEvent},
};

#[derive(Debug, Default)]
pub struct TrackerDiagnostics {
    pub frames_analysed: AtomicU64,
    pub inference_errors: AtomicU64,
    pub samples_dropped: AtomicU64,
}

impl TrackerDiagnostics {
    pub fn reset(&self) {
        self.frames_analysed.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_analysed: self.frames_analysed.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_analysed: u64,
    pub inference_errors: u64,
    pub samples_dropped: u64,
}

/// Everything the loop needs, passed as one struct so the spawn closure stays tidy.
pub struct TrackerContext {
    pub assembler: FrameAssembler,
    pub model: ModelHandle,
    /// Rate the producer delivers samples at (Hz).
    pub sample_rate: u32,
    /// Rate the model was trained on; a different `sample_rate` is warned about.
    pub expected_sample_rate: u32,
    pub pitch_tx: broadcast::Sender<PitchEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<TrackerDiagnostics>,
}

/// Run until the stream is drained. Returns the number of frames analysed.
pub fn run(mut ctx: TrackerContext) -> u64 {
    if ctx.sample_rate != ctx.expected_sample_rate {
        let warning = AnalysisWarning::SampleRateMismatch {
            expected: ctx.expected_sample_rate,
            actual: ctx.sample_rate,
        };
        warn!("{warning}");
    }
    info!(sample_rate = ctx.sample_rate, "tracker started");

    let started = Instant::now();
    let mut scratch = Vec::with_capacity(FRAME_LENGTH);
    let mut analysed = 0u64;
    let mut failure_reported = false;

    while let Some(frame) = ctx.assembler.pull_frame() {
        ctx.diagnostics
            .samples_dropped
            .store(ctx.assembler.dropped_samples(), Ordering::Relaxed);

        let result = match analyze_frame_with(
            &ctx.model,
            &mut scratch,
            &frame.samples,
            frame.start_sample,
            ctx.sample_rate,
        ) {
            Ok(result) => result,
            Err(e) => {
                ctx.diagnostics
                    .inference_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!(start_sample = frame.start_sample, "frame analysis failed: {e}");
                if !failure_reported {
                    failure_reported = true;
                    let _ = ctx.status_tx.send(EngineStatusEvent {
                        status: EngineStatus::Listening,
                        detail: Some(format!(
                            "frame analysis failed at sample {}: {e}",
                            frame.start_sample
                        )),
                    });
                }
                continue;
            }
        };

        analysed += 1;
        ctx.diagnostics
            .frames_analysed
            .fetch_add(1, Ordering::Relaxed);

        let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error: events are simply not observed.
        let _ = ctx.pitch_tx.send(PitchEvent { seq, result });
    }

    ctx.diagnostics
        .samples_dropped
        .store(ctx.assembler.dropped_samples(), Ordering::Relaxed);
    debug!(
        frames = analysed,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "tracker loop finished"
    );
    info!(frames = analysed, "tracker drained");
    analysed
}
