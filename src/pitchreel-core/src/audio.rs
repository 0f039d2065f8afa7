//! WAV helpers built on hound.
//!
//! Durations are always measured here, from the audio itself.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::Result;

/// Header facts about a WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub spec: WavSpec,
    /// Sample frames per channel.
    pub frames: u32,
}

impl WavInfo {
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.spec.sample_rate as f64
    }
}

/// Read the header of a WAV file and measure its length.
pub fn measure_wav<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path.as_ref())?;
    Ok(WavInfo {
        spec: reader.spec(),
        frames: reader.duration(),
    })
}

/// Spec for mono 16-bit PCM, the format scene clips are written in.
pub fn mono_pcm16(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write mono float samples as 16-bit PCM.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<WavInfo> {
    let spec = mono_pcm16(sample_rate);
    let mut writer = WavWriter::create(path.as_ref(), spec)?;

    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }

    writer.finalize()?;
    Ok(WavInfo {
        spec,
        frames: samples.len() as u32,
    })
}

/// Write `frames` frames of digital silence in the given layout.
pub fn write_silence<P: AsRef<Path>>(path: P, spec: WavSpec, frames: u32) -> Result<WavInfo> {
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    let total = frames as u64 * spec.channels as u64;

    match spec.sample_format {
        SampleFormat::Float => {
            for _ in 0..total {
                writer.write_sample(0.0f32)?;
            }
        }
        SampleFormat::Int => {
            for _ in 0..total {
                writer.write_sample(0i32)?;
            }
        }
    }

    writer.finalize()?;
    Ok(WavInfo { spec, frames })
}

/// Number of whole sample frames closest to `seconds` at `sample_rate`.
pub fn frames_for(seconds: f64, sample_rate: u32) -> u32 {
    (seconds * sample_rate as f64).round().max(0.0) as u32
}
