//! WAV decoding for offline analysis.
//!
//! Integer and float PCM are both accepted; multi-channel files are averaged
//! down to mono. The file's own sample rate is preserved; convert with
//! [`AudioBuffer::to_model_rate`] if needed.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::buffer::AudioBuffer;
use crate::error::{PitchError, Result};

/// Decode a WAV file from disk.
pub fn load_wav(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)?;
    let buffer = decode(reader)?;
    debug!(
        path = %path.display(),
        samples = buffer.samples.len(),
        sample_rate = buffer.sample_rate,
        "loaded WAV"
    );
    Ok(buffer)
}

/// Decode WAV data from any reader.
pub fn read_wav<R: Read>(reader: R) -> Result<AudioBuffer> {
    decode(hound::WavReader::new(reader)?)
}

fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(PitchError::Wav("WAV header declares zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &interleaved,
        spec.channels,
        spec.sample_rate,
    ))
}
