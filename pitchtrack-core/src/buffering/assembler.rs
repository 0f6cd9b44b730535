//! Streaming frame assembler.
//!
//! Bridges a real-time producer (audio callback) to an analysis consumer that
//! works in whole frames of `FRAME_LENGTH` samples.
//!
//! ```text
//! audio callback ──push──► HeapRb<f32> ──pop──► staging[FRAME_LENGTH] ──► Frame
//!        │                                                    ▲
//!        └── signal_finished ──► AtomicBool ─────────────────┘ (drain check)
//! ```
//!
//! ## State machine
//!
//! ```text
//! Open ──signal_finished──► Finishing ──short of a frame──► Drained
//! ```
//!
//! - `Open`: pushes accepted, pulls wait for a full frame.
//! - `Finishing`: no more data will come; pulls keep returning buffered frames.
//! - `Drained`: fewer than `FRAME_LENGTH` samples were left; the remainder is
//!   discarded and every later pull returns `None`.
//!
//! ## Real-time contract
//!
//! `FrameProducer::push` never blocks, allocates or locks: one `push_slice`
//! into the ring and, on overflow, one relaxed atomic add. When the ring is
//! full the newest samples are dropped and counted; the consumer logs the
//! count. Frames are disjoint and strictly FIFO.
//!
//! `Frame::start_sample` counts accepted samples only. After an overflow it
//! runs behind wall-clock time by `dropped_samples()`: the ring cannot tell
//! where in the stream the gap fell, so frame positions are not adjusted.
//!
//! Split ownership enforces the single-producer/single-consumer rule: both
//! halves need `&mut self` to move samples and neither is `Clone`.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{debug, warn};

use super::{create_sample_ring, Consumer, Observer, Producer, SampleConsumer, SampleProducer};
use crate::constants::{FRAME_LENGTH, QUEUE_CAPACITY_FRAMES};
use crate::frame::Frame;

/// Configuration for [`frame_stream`].
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Queue capacity in samples. Default: 10 frames.
    pub capacity: usize,
    /// Sleep between polls once spinning is exhausted. Default: 1 ms.
    pub poll_interval: Duration,
    /// Polls that only yield the thread before sleeping. Default: 16.
    pub spin_polls: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            capacity: FRAME_LENGTH * QUEUE_CAPACITY_FRAMES,
            poll_interval: Duration::from_millis(1),
            spin_polls: 16,
        }
    }
}

/// Observable state of a stream, from the consumer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Finishing,
    Drained,
}

/// Result of a non-blocking pull.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    Frame(Frame),
    /// Not enough samples yet and the producer has not finished.
    Pending,
    Drained,
}

#[derive(Debug, Default)]
struct StreamShared {
    finished: AtomicBool,
    dropped: AtomicU64,
}

impl StreamShared {
    fn signal_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Create a connected producer/assembler pair.
pub fn frame_stream(config: AssemblerConfig) -> (FrameProducer, FrameAssembler) {
    let (ring_prod, ring_cons) = create_sample_ring(config.capacity.max(FRAME_LENGTH));
    let shared = Arc::new(StreamShared::default());

    let producer = FrameProducer {
        ring: ring_prod,
        shared: Arc::clone(&shared),
    };
    let assembler = FrameAssembler {
        ring: ring_cons,
        shared,
        staging: vec![0.0; FRAME_LENGTH],
        filled: 0,
        frames_pulled: 0,
        drained: false,
        reported_dropped: 0,
        config,
    };
    (producer, assembler)
}

/// Producer half. Lives on the audio callback thread.
///
/// Dropping the producer signals `finished`, so a torn-down capture stream
/// always lets the consumer drain.
pub struct FrameProducer {
    ring: SampleProducer,
    shared: Arc<StreamShared>,
}

impl FrameProducer {
    /// Append samples without blocking.
    ///
    /// Returns how many were accepted; the rest (the newest) were dropped
    /// because the queue was full.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let written = self.ring.push_slice(samples);
        if written < samples.len() {
            self.shared
                .dropped
                .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }

    /// No more samples will be pushed. Idempotent.
    pub fn signal_finished(&self) {
        self.shared.signal_finished();
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Handle that can signal `finished` from a control thread after the
    /// producer itself has moved into an audio callback.
    pub fn finish_handle(&self) -> FinishHandle {
        FinishHandle(Arc::clone(&self.shared))
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.shared.signal_finished();
    }
}

/// Cloneable `signal_finished` for the producer side.
#[derive(Clone)]
pub struct FinishHandle(Arc<StreamShared>);

impl FinishHandle {
    pub fn signal_finished(&self) {
        self.0.signal_finished();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl std::fmt::Debug for FinishHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Consumer half. Lives on the analysis thread and hands out whole frames.
pub struct FrameAssembler {
    ring: SampleConsumer,
    shared: Arc<StreamShared>,
    /// Partially assembled next frame.
    staging: Vec<f32>,
    filled: usize,
    frames_pulled: u64,
    drained: bool,
    reported_dropped: u64,
    config: AssemblerConfig,
}

impl FrameAssembler {
    pub fn state(&self) -> StreamState {
        if self.drained {
            StreamState::Drained
        } else if self.shared.is_finished() {
            StreamState::Finishing
        } else {
            StreamState::Open
        }
    }

    /// Samples waiting to be assembled (approximate while the producer runs).
    pub fn buffered(&self) -> usize {
        self.ring.occupied_len() + self.filled
    }

    pub fn frames_pulled(&self) -> u64 {
        self.frames_pulled
    }

    /// Total samples the producer had to drop because the queue was full.
    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Non-blocking pull.
    pub fn poll_frame(&mut self) -> PullOutcome {
        if self.drained {
            return PullOutcome::Drained;
        }
        self.report_drops();

        if self.fill() {
            return PullOutcome::Frame(self.take_frame());
        }

        if self.shared.is_finished() {
            // Everything pushed before the flag is visible after the acquire load.
            if self.fill() {
                return PullOutcome::Frame(self.take_frame());
            }
            debug!(
                discarded = self.filled + self.ring.occupied_len(),
                frames = self.frames_pulled,
                "stream drained"
            );
            self.filled = 0;
            self.drained = true;
            return PullOutcome::Drained;
        }

        PullOutcome::Pending
    }

    /// Wait for the next full frame.
    ///
    /// Polls with `yield_now` for the first `spin_polls` attempts, then sleeps
    /// `poll_interval` between attempts. Returns `None` once the stream is
    /// finished and less than a frame remains; from then on the assembler is
    /// `Drained`.
    pub fn pull_frame(&mut self) -> Option<Frame> {
        let mut polls = 0u32;
        loop {
            match self.poll_frame() {
                PullOutcome::Frame(frame) => return Some(frame),
                PullOutcome::Drained => return None,
                PullOutcome::Pending => {}
            }
            if polls < self.config.spin_polls {
                polls += 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(self.config.poll_interval);
            }
        }
    }

    /// Top up the staging buffer; `true` when it holds a full frame.
    fn fill(&mut self) -> bool {
        if self.filled < FRAME_LENGTH {
            self.filled += self.ring.pop_slice(&mut self.staging[self.filled..]);
        }
        self.filled == FRAME_LENGTH
    }

    fn take_frame(&mut self) -> Frame {
        let start_sample = self.frames_pulled * FRAME_LENGTH as u64;
        self.frames_pulled += 1;
        self.filled = 0;
        Frame::new(start_sample, self.staging.clone())
    }

    fn report_drops(&mut self) {
        let dropped = self.dropped_samples();
        if dropped > self.reported_dropped {
            warn!(
                dropped = dropped - self.reported_dropped,
                total = dropped,
                "sample queue full: producer dropped samples"
            );
            self.reported_dropped = dropped;
        }
    }
}

impl Iterator for FrameAssembler {
    type Item = Frame;

    /// Blocking; ends when the stream is drained.
    fn next(&mut self) -> Option<Frame> {
        self.pull_frame()
    }
}
