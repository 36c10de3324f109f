use anyhow::{Context, Result};
use hound::WavReader;
use log::debug;
use std::path::Path;

/// Load a WAV file as mono `f32` samples, returning them with the sample rate.
pub fn load_wav_mono<P: AsRef<Path>>(file_path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(file_path.as_ref())
        .with_context(|| format!("Failed to open WAV file {:?}", file_path.as_ref()))?;
    let spec = reader.spec();

    debug!("Loading WAV file: {:?}, spec: {:?}", file_path.as_ref(), spec);

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| sample as f32 / i16::MAX as f32))
                .collect(),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / 8_388_607.0))
                .collect(),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / i32::MAX as f32))
                .collect(),
            _ => {
                return Err(anyhow::anyhow!(
                    "Unsupported bit depth: {}",
                    spec.bits_per_sample
                ))
            }
        },
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };

    let interleaved = samples?;
    let mono = super::dsp::downmix(&interleaved, spec.channels as usize);
    debug!(
        "Loaded {} samples ({} channels) from WAV file",
        mono.len(),
        spec.channels
    );
    Ok((mono, spec.sample_rate))
}
