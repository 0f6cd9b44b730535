//! Audio input: live capture via cpal, WAV loading and rate conversion.
//!
//! # Real-time constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate, block or log. The callback below downmixes into a
//! buffer allocated when the stream is built and hands the result to
//! [`FrameProducer::push`], which is a single lock-free `push_slice`.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread; the
//! tracker opens it on its own analysis thread.

pub mod buffer;
pub mod resample;
pub mod wav;

pub use buffer::AudioBuffer;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::buffering::FrameProducer;
#[cfg(feature = "audio-cpal")]
use crate::constants::SAMPLE_RATE;
use crate::error::{PitchError, Result};

/// Mono samples the callback can stage per `push`. Larger device buffers are
/// handled in several passes.
#[cfg(feature = "audio-cpal")]
const MIX_CAPACITY: usize = 4096;

/// Average interleaved frames of `data` into `out`, converting each sample.
///
/// Returns how many mono samples were written; stops when either `out` or
/// `data` runs out of whole frames.
pub fn downmix_into<T: Copy>(
    data: &[T],
    channels: usize,
    out: &mut [f32],
    convert: impl Fn(T) -> f32,
) -> usize {
    let ch = channels.max(1);
    let mut written = 0;
    for (slot, frame) in out.iter_mut().zip(data.chunks_exact(ch)) {
        *slot = if ch == 1 {
            convert(frame[0])
        } else {
            frame.iter().map(|&s| convert(s)).sum::<f32>() / ch as f32
        };
        written += 1;
    }
    written
}

/// Handle to an active capture stream.
///
/// **Not `Send`**: create and drop it on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Rate the device actually delivers (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open an input device by preferred name, otherwise the default input
    /// device, otherwise the first available one.
    ///
    /// A `SAMPLE_RATE` configuration is used when the device offers one.
    /// Otherwise the device default is used and the caller sees the real rate
    /// in [`sample_rate`](Self::sample_rate).
    ///
    /// # Errors
    /// `PitchError::NoDefaultInputDevice` when no microphone is available,
    /// `PitchError::AudioDevice`/`AudioStream` if cpal fails.
    pub fn open_with_preference(
        producer: FrameProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{}' not found, falling back", preferred);
                    }
                }
                Err(e) => warn!("failed to list input devices: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| PitchError::AudioDevice(e.to_string()))?;
                let fallback = devices.next().ok_or(PitchError::NoDefaultInputDevice)?;
                warn!("no default input device, falling back to first available input");
                fallback
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = preferred_config(&device)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        if sample_rate != SAMPLE_RATE {
            warn!(
                sample_rate,
                expected = SAMPLE_RATE,
                "device does not offer the model rate; pitch estimates may be off"
            );
        }
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, producer, Arc::clone(&running), |s| s)
            }
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                producer,
                Arc::clone(&running),
                |s| s as f32 / 32_768.0,
            ),
            SampleFormat::U8 => build_stream::<u8>(
                &device,
                &config,
                producer,
                Arc::clone(&running),
                |s| (s as f32 - 128.0) / 128.0,
            ),
            fmt => {
                return Err(PitchError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| PitchError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    pub fn open_default(producer: FrameProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}

/// Pick a `SAMPLE_RATE` config if the device has one, else its default.
#[cfg(feature = "audio-cpal")]
fn preferred_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig> {
    let target = SampleRate(SAMPLE_RATE);
    if let Ok(ranges) = device.supported_input_configs() {
        let matching = ranges
            .filter(|r| r.min_sample_rate() <= target && target <= r.max_sample_rate())
            .filter(|r| {
                matches!(
                    r.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U8
                )
            })
            .min_by_key(|r| (r.channels(), r.sample_format() != SampleFormat::F32));
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(target));
        }
    }
    device
        .default_input_config()
        .map_err(|e| PitchError::AudioDevice(e.to_string()))
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: FrameProducer,
    running: Arc<AtomicBool>,
    convert: fn(T) -> f32,
) -> Result<Stream>
where
    T: SizedSample,
{
    let ch = config.channels.max(1) as usize;
    let mut mix = vec![0.0f32; MIX_CAPACITY];
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                for block in data.chunks(MIX_CAPACITY * ch) {
                    let n = downmix_into(block, ch, &mut mix, convert);
                    producer.push(&mix[..n]);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| PitchError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: FrameProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(PitchError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: FrameProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}

impl AudioCapture {
    /// Make the callback a no-op from its next invocation on.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_and_converts() {
        let data: [i16; 6] = [16_384, 16_384, -32_768, 0, 0, 0];
        let mut out = [9.0f32; 4];
        let n = downmix_into(&data, 2, &mut out, |s| s as f32 / 32_768.0);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[0.5, -0.5, 0.0]);
        assert_eq!(out[3], 9.0);
    }

    #[test]
    fn downmix_stops_at_output_capacity() {
        let data = [0.1f32; 10];
        let mut out = [0.0f32; 4];
        assert_eq!(downmix_into(&data, 1, &mut out, |s| s), 4);
    }

    #[test]
    fn downmix_ignores_trailing_partial_frame() {
        let data = [1.0f32, 1.0, 1.0];
        let mut out = [0.0f32; 4];
        assert_eq!(downmix_into(&data, 2, &mut out, |s| s), 1);
    }
}
