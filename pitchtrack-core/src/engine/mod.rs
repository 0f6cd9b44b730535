//! `PitchTracker`: live pitch tracking lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! PitchTracker::new()
//!     └─► warm_up()        → model loaded, status = WarmingUp → Idle
//!         └─► start()      → capture open, analysis thread spawned, status = Listening
//!             └─► stop()   → capture muted, stream finished, buffered frames
//!                            drained, thread joined, status = Stopped
//! ```
//!
//! Calling `start()`/`stop()` in the wrong state returns an error rather than
//! panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS. `AudioCapture` is therefore
//! opened *inside* the analysis thread so it never crosses a thread boundary.
//! A sync oneshot channel propagates open-device errors back to `start()`.

pub mod tracker;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::AudioCapture,
    batch::BatchConfig,
    buffering::{frame_stream, AssemblerConfig, FinishHandle},
    error::{PitchError, Result},
    inference::ModelHandle,
    ipc::events::{EngineStatus, EngineStatusEvent, PitchEvent},
};

pub use tracker::{DiagnosticsSnapshot, TrackerDiagnostics};

/// Broadcast channel capacity: about 16 s of frames at 16 kHz for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for [`PitchTracker`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Only `expected_sample_rate` applies live: frames are disjoint and
    /// analysed one at a time.
    pub batch: BatchConfig,
    pub assembler: AssemblerConfig,
    /// Input device name; `None` selects the system default.
    pub preferred_input_device: Option<String>,
}

struct ActiveStream {
    finish: FinishHandle,
    worker: JoinHandle<()>,
}

/// Top-level live tracking handle.
///
/// `Send + Sync`: all fields use interior mutability, so it can be wrapped in
/// an `Arc` and shared with event-forwarding tasks.
pub struct PitchTracker {
    config: EngineConfig,
    model: ModelHandle,
    /// `true` while capture and analysis are active. Also gates the capture callback.
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    pitch_tx: broadcast::Sender<PitchEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<TrackerDiagnostics>,
    active: Mutex<Option<ActiveStream>>,
}

impl PitchTracker {
    /// Create a tracker. Does not start capturing: call `warm_up()` then `start()`.
    pub fn new(config: EngineConfig, model: ModelHandle) -> Self {
        let (pitch_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            model,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            pitch_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(TrackerDiagnostics::default()),
            active: Mutex::new(None),
        }
    }

    /// Load the model and run a dummy inference on every session.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up pitch model");
        if let Err(e) = self.model.warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("pitch model ready");
        Ok(())
    }

    /// Start capture on the configured (or default) input device.
    ///
    /// Blocks until the device is confirmed open (or fails).
    ///
    /// # Errors
    /// - `PitchError::AlreadyRunning` if already started.
    /// - `PitchError::NoDefaultInputDevice` / `PitchError::AudioStream` on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(self.config.preferred_input_device.clone())
    }

    /// Start capture on a named input device, falling back to the default.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() || self.running.load(Ordering::SeqCst) {
            return Err(PitchError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.seq.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::SeqCst);

        let (producer, assembler) = frame_stream(self.config.assembler.clone());
        let finish = producer.finish_handle();

        let model = self.model.clone();
        let running = Arc::clone(&self.running);
        let pitch_tx = self.pitch_tx.clone();
        let status_tx = self.status_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);
        let expected_sample_rate = self.config.batch.expected_sample_rate;

        // Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let spawned = std::thread::Builder::new()
            .name("pitchtrack-analysis".into())
            .spawn(move || {
                // Must open on THIS thread: cpal::Stream is !Send.
                let capture = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&running),
                    preferred_input_device.as_deref(),
                ) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(c.sample_rate));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                tracker::run(tracker::TrackerContext {
                    assembler,
                    model,
                    sample_rate: capture.sample_rate,
                    expected_sample_rate,
                    pitch_tx,
                    status_tx,
                    seq,
                    diagnostics,
                });

                // Releases the device on the thread that opened it.
                drop(capture);
            });

        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                return Err(PitchError::Io(e));
            }
        };

        match open_rx.recv() {
            Ok(Ok(sample_rate)) => {
                *active = Some(ActiveStream { finish, worker });
                self.set_status(EngineStatus::Listening, None);
                info!(sample_rate, "tracker started, listening");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(
                    EngineStatus::Error,
                    Some("analysis thread failed to start".into()),
                );
                Err(PitchError::Other(anyhow::anyhow!(
                    "analysis thread died unexpectedly"
                )))
            }
        }
    }

    /// Stop capture, analyse every whole frame still buffered, and join the
    /// analysis thread.
    ///
    /// # Errors
    /// `PitchError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let Some(stream) = self.active.lock().take() else {
            return Err(PitchError::NotRunning);
        };

        self.running.store(false, Ordering::SeqCst);
        stream.finish.signal_finished();
        self.set_status(EngineStatus::Draining, None);
        info!("tracker stop requested, draining");

        if stream.worker.join().is_err() {
            warn!("analysis thread panicked");
            self.set_status(EngineStatus::Error, Some("analysis thread panicked".into()));
            return Err(PitchError::Other(anyhow::anyhow!("analysis thread panicked")));
        }

        let snap = self.diagnostics.snapshot();
        info!(
            frames = snap.frames_analysed,
            errors = snap.inference_errors,
            dropped = snap.samples_dropped,
            "tracker stopped"
        );
        self.set_status(EngineStatus::Stopped, None);
        Ok(())
    }

    /// Current status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to per-frame pitch events.
    pub fn subscribe_pitches(&self) -> broadcast::Receiver<PitchEvent> {
        self.pitch_tx.subscribe()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of tracker counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for PitchTracker {
    fn drop(&mut self) {
        if self.active.lock().is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::StubModel;

    fn tracker() -> PitchTracker {
        PitchTracker::new(EngineConfig::default(), ModelHandle::new(StubModel::new()))
    }

    #[test]
    fn new_tracker_is_idle() {
        let t = tracker();
        assert_eq!(t.status(), EngineStatus::Idle);
        assert!(!t.is_running());
        assert_eq!(t.diagnostics_snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn warm_up_reports_status_transitions() {
        let t = tracker();
        let mut rx = t.subscribe_status();
        t.warm_up().unwrap();
        assert_eq!(rx.try_recv().unwrap().status, EngineStatus::WarmingUp);
        assert_eq!(rx.try_recv().unwrap().status, EngineStatus::Idle);
        assert_eq!(t.status(), EngineStatus::Idle);
    }

    #[test]
    fn stop_without_start_is_an_error() {
        assert!(matches!(tracker().stop(), Err(PitchError::NotRunning)));
    }
}
