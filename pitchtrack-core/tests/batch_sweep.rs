use pitchtrack_core::batch::frame_count;
use pitchtrack_core::constants::{FFT_HOP, SAMPLE_RATE};
use pitchtrack_core::{summarize, BatchConfig, BatchPipeline, ModelHandle, StubModel};

/// Linear sweep from `f0` to `f1` Hz, phase-accumulated so it stays continuous.
fn sweep(f0: f32, f1: f32, seconds: f32) -> Vec<f32> {
    let n = (seconds * SAMPLE_RATE as f32) as usize;
    let mut phase = 0.0f64;
    (0..n)
        .map(|i| {
            let freq = f0 + (f1 - f0) * i as f32 / n as f32;
            phase += 2.0 * std::f64::consts::PI * freq as f64 / SAMPLE_RATE as f64;
            0.6 * phase.sin() as f32
        })
        .collect()
}

fn pipeline(parallel: bool) -> BatchPipeline {
    let model = ModelHandle::pool_with(4, || Ok(StubModel::new())).expect("model pool");
    BatchPipeline::new(
        BatchConfig {
            parallel,
            ..BatchConfig::default()
        },
        model,
    )
}

#[test]
fn rising_sweep_correlates_with_time() {
    let samples = sweep(200.0, 800.0, 2.0);
    let results = pipeline(true)
        .analyze(&samples, SAMPLE_RATE)
        .expect("batch analysis");

    assert_eq!(results.len(), frame_count(samples.len()));
    assert!(results.warnings().is_empty());
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.time_sec, (i * FFT_HOP) as f32 / SAMPLE_RATE as f32);
    }

    let analytics = summarize(&results).expect("analytics");
    assert!(
        analytics.time_pitch_correlation > 0.9,
        "correlation={}",
        analytics.time_pitch_correlation
    );
    assert!(analytics.min_frequency < analytics.max_frequency);
    assert!(analytics.min_frequency < 300.0, "min={}", analytics.min_frequency);
    assert!(analytics.max_frequency > 700.0, "max={}", analytics.max_frequency);
    assert!(analytics.mean_confidence > 0.5);
}

#[test]
fn falling_sweep_correlates_negatively() {
    let samples = sweep(900.0, 150.0, 1.0);
    let results = pipeline(true)
        .analyze(&samples, SAMPLE_RATE)
        .expect("batch analysis");
    let analytics = summarize(&results).expect("analytics");
    assert!(
        analytics.time_pitch_correlation < -0.9,
        "correlation={}",
        analytics.time_pitch_correlation
    );
}

#[test]
fn serial_and_parallel_sweeps_match() {
    let samples = sweep(300.0, 600.0, 0.5);
    let serial = pipeline(false).analyze(&samples, SAMPLE_RATE).expect("serial");
    let parallel = pipeline(true).analyze(&samples, SAMPLE_RATE).expect("parallel");
    assert_eq!(serial, parallel);
    assert_eq!(
        summarize(&serial).expect("analytics"),
        summarize(&parallel).expect("analytics")
    );
}

#[test]
fn voiced_filter_keeps_the_sweep_and_drops_silence() {
    let mut samples = vec![0.0f32; SAMPLE_RATE as usize / 2];
    samples.extend(sweep(250.0, 350.0, 0.5));
    let results = pipeline(true)
        .analyze(&samples, SAMPLE_RATE)
        .expect("batch analysis");

    let voiced: Vec<_> = results.voiced_default().collect();
    assert!(!voiced.is_empty());
    assert!(voiced.len() < results.len());
    assert!(voiced.iter().all(|r| r.time_sec > 0.4));
}
