use std::path::Path;

use crate::error::{Result, ScoringError};
use crate::types::AudioData;

/// Write mono audio as 16-bit PCM WAV.
pub fn write_wav<P: AsRef<Path>>(audio: &AudioData, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|err| ScoringError::resource(path, format!("failed to create WAV: {err}")))?;
    for &sample in &audio.samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|err| ScoringError::resource(path, format!("failed to write sample: {err}")))?;
    }
    writer
        .finalize()
        .map_err(|err| ScoringError::resource(path, format!("failed to finalize WAV: {err}")))?;
    Ok(())
}
