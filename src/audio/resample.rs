use crate::error::{Result, ScoringError};
use crate::types::AudioData;

/// Linearly resample `samples` from `source_rate` to `target_rate`.
pub fn linear_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ScoringError::configuration(format!(
            "cannot resample between {source_rate} Hz and {target_rate} Hz"
        )));
    }
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let last_index = samples.len() - 1;
    let output = (0..output_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let left = (position.floor() as usize).min(last_index);
            let right = (left + 1).min(last_index);
            let t = (position - left as f64) as f32;
            samples[left] * (1.0 - t) + samples[right] * t
        })
        .collect();
    Ok(output)
}

/// Bring a clip to `target_rate`, borrowing nothing from the source.
pub fn to_rate(audio: &AudioData, target_rate: u32) -> Result<AudioData> {
    let samples = linear_resample(&audio.samples, audio.sample_rate, target_rate)?;
    Ok(AudioData::new(samples, target_rate))
}
