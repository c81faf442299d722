//! Acoustic feature extraction: raw waveform to a fixed-length vector.

mod articulation;
mod cepstral;
mod config;
mod fluency;
mod prosody;
mod spectral;
mod vector;

use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::decoder::decode_audio;
use crate::audio::resample::to_rate;
use crate::audio::voice_activity::{split_voiced, SegmentationParams, VoicedSegment, VoicedSpan};
use crate::error::Result;
use crate::types::AudioData;

pub use config::{ExtractorConfig, CHROMA_DIM, FLUENCY_DIM, PROSODY_DIM};
pub use vector::{AudioFeatureVector, FeatureLayout};

/// Human-readable account of the speech found in one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechDiagnostics {
    pub duration_secs: f64,
    pub voiced_segments: Vec<VoicedSegment>,
    pub num_pauses: usize,
    pub pause_total_secs: f64,
    pub speech_rate: f64,
    pub articulation_rate: f64,
    pub pitched_frames: usize,
}

/// Output of one extraction: the model input plus its diagnostics.
#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
    pub vector: AudioFeatureVector,
    pub diagnostics: SpeechDiagnostics,
}

/// Deterministic waveform-to-vector transform for one [`ExtractorConfig`].
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension()
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout::new(&self.config)
    }

    /// Extract the feature vector of an in-memory clip.
    ///
    /// Empty, silent and very short clips still produce a full-length,
    /// finite vector.
    pub fn extract(&self, audio: &AudioData) -> Result<ExtractedFeatures> {
        let config = &self.config;
        let audio = to_rate(audio, config.sample_rate)?;
        let duration_secs = audio.duration_secs();

        let spans = split_voiced(&audio.samples, &self.segmentation());
        let padded = spectral::pad_to_window(&audio.samples, config.fft_size);
        let unpadded = &padded[..audio.samples.len()];
        let pitch = prosody::track_pitch(unpadded, &spans, config);

        let spectrograms = spectral::compute_spectrograms(&padded, config);
        let mfcc = spectral::compute_mfcc(&spectrograms.mel, config.n_mfcc);

        let cepstral = cepstral::summarize_mfcc(&mfcc, config.n_mfcc);
        let prosody =
            prosody::summarize_prosody(&padded, &spectrograms, &pitch, duration_secs, config);
        let pronunciation = articulation::summarize_pronunciation(&spectrograms, config);
        let fluency = fluency::summarize_fluency(&spans, config.sample_rate, duration_secs);

        let mut values = Vec::with_capacity(config.dimension());
        cepstral.append_to(&mut values);
        prosody.append_to(&mut values);
        pronunciation.append_to(&mut values);
        fluency.append_to(&mut values);
        debug_assert_eq!(values.len(), config.dimension());

        let non_finite = values.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            warn!(non_finite, "replacing non-finite feature values with zero");
            values
                .iter_mut()
                .filter(|v| !v.is_finite())
                .for_each(|v| *v = 0.0);
        }

        let diagnostics = SpeechDiagnostics {
            duration_secs,
            voiced_segments: spans
                .iter()
                .map(|span| to_segment(span, config.sample_rate))
                .collect(),
            num_pauses: fluency.num_pauses as usize,
            pause_total_secs: fluency.pause_total as f64,
            speech_rate: fluency.speech_rate as f64,
            articulation_rate: fluency.articulation_rate as f64,
            pitched_frames: pitch.frequencies.len(),
        };
        debug!(
            duration_secs,
            segments = spans.len(),
            frames = spectrograms.frame_count(),
            pitched = diagnostics.pitched_frames,
            "extracted features"
        );

        Ok(ExtractedFeatures {
            vector: AudioFeatureVector::from_vec(values),
            diagnostics,
        })
    }

    /// Decode an audio file and extract its features.
    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> Result<ExtractedFeatures> {
        let audio = decode_audio(path.as_ref())?;
        self.extract(&audio)
    }

    /// Extract many files on one worker thread per CPU.
    ///
    /// Results come back in input order, one per path.
    pub fn extract_batch(&self, paths: &[PathBuf]) -> Vec<Result<ExtractedFeatures>> {
        let workers = num_cpus::get().clamp(1, paths.len().max(1));
        let mut slots: Vec<Option<Result<ExtractedFeatures>>> =
            (0..paths.len()).map(|_| None).collect();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    scope.spawn(move || {
                        paths
                            .iter()
                            .enumerate()
                            .skip(worker)
                            .step_by(workers)
                            .map(|(index, path)| (index, self.extract_file(path)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(results) => {
                        for (index, result) in results {
                            slots[index] = Some(result);
                        }
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        slots.into_iter().flatten().collect()
    }

    fn segmentation(&self) -> SegmentationParams {
        SegmentationParams {
            frame_len: self.config.fft_size,
            hop_len: self.config.hop_size,
            top_db: self.config.top_db,
            floor_db: self.config.silence_floor_db,
        }
    }
}

fn to_segment(span: &VoicedSpan, sample_rate: u32) -> VoicedSegment {
    let rate = sample_rate as f64;
    VoicedSegment {
        start_secs: span.start as f64 / rate,
        end_secs: span.end as f64 / rate,
    }
}
