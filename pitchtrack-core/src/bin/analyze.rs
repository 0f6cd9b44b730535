//! Offline pitch analysis: WAV → batch pipeline → analytics → JSON report.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use pitchtrack_core::{
    audio::wav::load_wav, constants::SAMPLE_RATE, summarize, AnalysisWarning, Analytics,
    BatchConfig, BatchPipeline, FrameResult, ModelHandle, StubModel,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug)]
struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    model: Option<PathBuf>,
    stub: bool,
    serial: bool,
    keep_rate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    input: String,
    sample_rate: u32,
    duration_secs: f64,
    frames: usize,
    elapsed_ms: f64,
    warnings: &'a [AnalysisWarning],
    analytics: Option<Analytics>,
    results: &'a [FrameResult],
}

const USAGE: &str = "Usage: analyze --input <file.wav> [--output <report.json>] \
[--model <model.onnx>] [--stub] [--serial] [--keep-rate]";

fn parse_args() -> anyhow::Result<Args> {
    let mut input = None;
    let mut output = None;
    let mut model = None;
    let mut stub = false;
    let mut serial = false;
    let mut keep_rate = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" | "-i" => {
                input = Some(PathBuf::from(it.next().context("missing value for --input")?));
            }
            "--output" | "-o" => {
                output = Some(PathBuf::from(it.next().context("missing value for --output")?));
            }
            "--model" => {
                model = Some(PathBuf::from(it.next().context("missing value for --model")?));
            }
            "--stub" => stub = true,
            "--serial" => serial = true,
            "--keep-rate" => keep_rate = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }

    Ok(Args {
        input: input.with_context(|| format!("--input is required\n{USAGE}"))?,
        output,
        model,
        stub,
        serial,
        keep_rate,
    })
}

fn sessions() -> usize {
    rayon::current_num_threads().clamp(1, 4)
}

fn build_model(args: &Args) -> anyhow::Result<ModelHandle> {
    if args.stub {
        info!("using YIN stub model");
        return Ok(ModelHandle::pool_with(sessions(), || Ok(StubModel::new()))?);
    }

    #[cfg(feature = "onnx")]
    {
        use pitchtrack_core::{OnnxPitchModel, OnnxPitchModelConfig};

        let mut config = OnnxPitchModelConfig::default();
        if let Some(path) = &args.model {
            config.model_path = path.clone();
        }
        let handle =
            ModelHandle::pool_with(sessions(), || Ok(OnnxPitchModel::new(config.clone())))?;
        handle.warm_up()?;
        Ok(handle)
    }

    #[cfg(not(feature = "onnx"))]
    {
        if args.model.is_some() {
            bail!("--model requires a build with the `onnx` feature");
        }
        bail!("built without the `onnx` feature; pass --stub to use the YIN stub model")
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut audio = load_wav(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    if audio.is_empty() {
        bail!("{} contains no samples", args.input.display());
    }
    info!(
        samples = audio.samples.len(),
        sample_rate = audio.sample_rate,
        "input loaded"
    );
    if !args.keep_rate && audio.sample_rate != SAMPLE_RATE {
        info!(from = audio.sample_rate, to = SAMPLE_RATE, "resampling input");
        audio = audio.to_model_rate()?;
    }

    let model = build_model(&args)?;
    let pipeline = BatchPipeline::new(
        BatchConfig {
            parallel: !args.serial,
            ..BatchConfig::default()
        },
        model,
    );

    let started = Instant::now();
    let results = pipeline.analyze(&audio.samples, audio.sample_rate)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    println!("Analysed {} frames in {:.1} ms", results.len(), elapsed_ms);
    for (i, r) in results.iter().take(5).enumerate() {
        println!(
            "  frame {i}: t={:.3}s  pitch={:.2} Hz  confidence={:.3}",
            r.time_sec, r.pitch_hz, r.confidence
        );
    }
    for warning in results.warnings() {
        println!("warning: {warning}");
    }

    let analytics = summarize(&results).ok();
    match &analytics {
        Some(a) => {
            println!("Mean confidence:        {:.3}", a.mean_confidence);
            println!(
                "Frequency range:        {:.2} - {:.2} Hz",
                a.min_frequency, a.max_frequency
            );
            println!("Time/pitch correlation: {:.3}", a.time_pitch_correlation);
        }
        None => println!("Input shorter than one frame; no analytics"),
    }

    let report = Report {
        input: args.input.display().to_string(),
        sample_rate: results.sample_rate(),
        duration_secs: audio.duration_secs(),
        frames: results.len(),
        elapsed_ms,
        warnings: results.warnings(),
        analytics,
        results: results.as_slice(),
    };
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("pitchtrack_core=info,analyze=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("analyze failed: {e:#}");
        std::process::exit(1);
    }
}
