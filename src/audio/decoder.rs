use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Result, ScoringError};
use crate::types::AudioData;

/// Decode an audio file to mono f32 PCM at its native sample rate.
///
/// Any failure to open, probe or decode the file is reported as a
/// [`ScoringError::Resource`] naming the path.
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|err| ScoringError::resource(path, format!("failed to open: {err}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| ScoringError::resource(path, format!("unrecognised format: {err}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ScoringError::resource(path, "no audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ScoringError::resource(path, "sample rate not specified"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| ScoringError::resource(path, format!("unsupported codec: {err}")))?;

    let mut samples = Vec::new();
    let mut interleaved: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(ScoringError::resource(
                    path,
                    format!("failed to read packet: {err}"),
                ))
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(path = %path.display(), error = err, "skipping corrupt packet");
                continue;
            }
            Err(err) => {
                return Err(ScoringError::resource(
                    path,
                    format!("failed to decode packet: {err}"),
                ))
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let frames = decoded.capacity() as u64;
        let buffer = interleaved.get_or_insert_with(|| SampleBuffer::new(frames, spec));
        if buffer.capacity() < decoded.capacity() * channels {
            *buffer = SampleBuffer::new(frames, spec);
        }
        buffer.copy_interleaved_ref(decoded);
        downmix_into(buffer.samples(), channels, &mut samples);
    }

    debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "decoded audio"
    );
    Ok(AudioData {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels into a mono stream.
fn downmix_into(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    if channels == 1 {
        output.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    output.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_stereo_frames() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = decode_audio("does/not/exist.wav").unwrap_err();
        assert!(matches!(err, ScoringError::Resource { .. }));
    }
}
