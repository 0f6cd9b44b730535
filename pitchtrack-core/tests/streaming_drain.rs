use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use pitchtrack_core::constants::{FRAME_LENGTH, MODEL_BINS, SAMPLE_RATE};
use pitchtrack_core::engine::tracker::{self, TrackerContext, TrackerDiagnostics};
use pitchtrack_core::error::Result;
use pitchtrack_core::{
    frame_stream, AssemblerConfig, ModelHandle, PitchEvent, PitchModel, StreamState, StubModel,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

struct DelayModel {
    delay: Duration,
}

impl PitchModel for DelayModel {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn infer(&mut self, _frame: &[f32]) -> Result<Vec<f32>> {
        thread::sleep(self.delay);
        let mut activation = vec![0.0; MODEL_BINS];
        activation[100] = 0.8;
        Ok(activation)
    }
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<PitchEvent>,
    timeout: Duration,
) -> PitchEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for pitch event");
                }
                thread::sleep(Duration::from_millis(2));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("pitch channel closed unexpectedly"),
        }
    }
}

fn context(
    model: ModelHandle,
    assembler: pitchtrack_core::FrameAssembler,
) -> (TrackerContext, broadcast::Receiver<PitchEvent>) {
    let (pitch_tx, pitch_rx) = broadcast::channel(256);
    let (status_tx, _) = broadcast::channel(8);
    (
        TrackerContext {
            assembler,
            model,
            sample_rate: SAMPLE_RATE,
            expected_sample_rate: SAMPLE_RATE,
            pitch_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(TrackerDiagnostics::default()),
        },
        pitch_rx,
    )
}

#[test]
fn frames_cross_threads_in_order_and_remainder_is_discarded() {
    let (mut producer, mut assembler) = frame_stream(AssemblerConfig::default());
    let total = FRAME_LENGTH * 5 + FRAME_LENGTH / 2;

    let writer = thread::spawn(move || {
        let ramp: Vec<f32> = (0..total).map(|i| i as f32).collect();
        let mut offset = 0;
        for chunk in ramp.chunks(333) {
            // Retry until the consumer makes room; the queue drops overflow.
            let mut pending = chunk;
            while !pending.is_empty() {
                let n = producer.push(pending);
                pending = &pending[n..];
                offset += n;
                if !pending.is_empty() {
                    thread::yield_now();
                }
            }
        }
        assert_eq!(offset, total);
        producer.signal_finished();
    });

    let mut frames = Vec::new();
    while let Some(frame) = assembler.pull_frame() {
        frames.push(frame);
    }
    writer.join().expect("writer thread panicked");

    assert_eq!(frames.len(), 5);
    for (i, frame) in frames.iter().enumerate() {
        let start = i * FRAME_LENGTH;
        assert_eq!(frame.start_sample, start as u64);
        assert_eq!(frame.samples.len(), FRAME_LENGTH);
        assert_eq!(frame.samples[0], start as f32);
        assert_eq!(frame.samples[FRAME_LENGTH - 1], (start + FRAME_LENGTH - 1) as f32);
    }
    assert_eq!(assembler.state(), StreamState::Drained);
    assert!(assembler.pull_frame().is_none());
    assert_eq!(assembler.dropped_samples(), 0);
}

#[test]
fn first_pitch_event_latency_under_500ms() {
    let (mut producer, assembler) = frame_stream(AssemblerConfig::default());
    let finish = producer.finish_handle();
    producer.push(&vec![0.2; FRAME_LENGTH]);

    let model = ModelHandle::new(DelayModel {
        delay: Duration::from_millis(20),
    });
    let (ctx, mut rx) = context(model, assembler);

    let start = Instant::now();
    let handle = thread::spawn(move || tracker::run(ctx));

    let first = recv_event_with_timeout(&mut rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    finish.signal_finished();
    let analysed = handle.join().expect("tracker thread panicked");

    assert_eq!(first.seq, 0);
    assert_eq!(first.result.time_sec, 0.0);
    assert_eq!(analysed, 1);
    assert!(
        elapsed < Duration::from_millis(500),
        "first event too slow: {:?} (target < 500ms)",
        elapsed
    );
    drop(producer);
}

#[test]
fn live_sine_is_tracked_by_the_stub_model() {
    let (mut producer, assembler) = frame_stream(AssemblerConfig::default());
    let (ctx, mut rx) = context(ModelHandle::new(StubModel::new()), assembler);
    let diagnostics = Arc::clone(&ctx.diagnostics);
    let handle = thread::spawn(move || tracker::run(ctx));

    let sine: Vec<f32> = (0..FRAME_LENGTH * 4)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    for chunk in sine.chunks(256) {
        assert_eq!(producer.push(chunk), chunk.len());
    }
    drop(producer);

    assert_eq!(handle.join().expect("tracker thread panicked"), 4);
    for i in 0..4u64 {
        let event = recv_event_with_timeout(&mut rx, Duration::from_secs(1));
        assert_eq!(event.seq, i);
        assert!(
            (event.result.pitch_hz - 440.0).abs() / 440.0 < 0.012,
            "frame {i}: {} Hz",
            event.result.pitch_hz
        );
        assert!(event.result.confidence > 0.5);
    }
    let snap = diagnostics.snapshot();
    assert_eq!(snap.frames_analysed, 4);
    assert_eq!(snap.inference_errors, 0);
    assert_eq!(snap.samples_dropped, 0);
}

#[test]
fn finishing_before_any_frame_emits_nothing() {
    let (mut producer, assembler) = frame_stream(AssemblerConfig::default());
    producer.push(&vec![0.1; FRAME_LENGTH - 1]);
    producer.signal_finished();

    let (ctx, mut rx) = context(ModelHandle::new(StubModel::new()), assembler);
    let seq = Arc::clone(&ctx.seq);
    assert_eq!(tracker::run(ctx), 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed) | Err(TryRecvError::Empty)));
    assert_eq!(seq.load(Ordering::Relaxed), 0);
}
