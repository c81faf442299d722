//! Descriptive statistics over a loaded corpus.

use serde::Serialize;

use crate::features::{ExtractorConfig, FeatureLayout};
use crate::training::Corpus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreStats {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

impl ScoreStats {
    fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        Self {
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().fold(f32::INFINITY, f32::min),
            max: values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusSummary {
    pub examples: usize,
    pub skipped: usize,
    pub pronunciation: ScoreStats,
    pub fluency: ScoreStats,
    pub mean_duration_secs: f32,
    pub mean_tempo_bpm: f32,
}

impl CorpusSummary {
    pub fn from_corpus(corpus: &Corpus, config: &ExtractorConfig) -> Self {
        let layout = FeatureLayout::new(config);
        let examples = corpus.examples();
        let pronunciation: Vec<f32> = examples.iter().map(|e| e.scores.pronunciation).collect();
        let fluency: Vec<f32> = examples.iter().map(|e| e.scores.fluency).collect();
        let mean_of = |name: &str| {
            let values: Vec<f32> = examples
                .iter()
                .filter_map(|e| layout.value(&e.vector, name))
                .collect();
            ScoreStats::from_values(&values).mean
        };

        Self {
            examples: examples.len(),
            skipped: corpus.skipped().total(),
            pronunciation: ScoreStats::from_values(&pronunciation),
            fluency: ScoreStats::from_values(&fluency),
            mean_duration_secs: mean_of("duration"),
            mean_tempo_bpm: mean_of("tempo"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::AudioFeatureVector;
    use crate::training::LabeledExample;
    use crate::types::SubScores;
    use approx::assert_abs_diff_eq;

    #[test]
    fn summarises_scores_and_named_features() {
        let config = ExtractorConfig::default();
        let layout = FeatureLayout::new(&config);
        let duration = layout.index_of("duration").unwrap();
        let tempo = layout.index_of("tempo").unwrap();
        let examples = [(1.0, 3.0, 2.0, 100.0), (3.0, 1.0, 4.0, 140.0)]
            .into_iter()
            .enumerate()
            .map(|(i, (p, f, secs, bpm))| {
                let mut values = vec![0.0; config.dimension()];
                values[duration] = secs;
                values[tempo] = bpm;
                LabeledExample {
                    id: i.to_string(),
                    vector: AudioFeatureVector::from_vec(values),
                    scores: SubScores::new(p, f),
                }
            })
            .collect();
        let corpus = Corpus::from_examples(examples, config.clone()).unwrap();

        let summary = CorpusSummary::from_corpus(&corpus, &config);
        assert_eq!(summary.examples, 2);
        assert_abs_diff_eq!(summary.pronunciation.mean, 2.0);
        assert_abs_diff_eq!(summary.pronunciation.std, 1.0);
        assert_eq!((summary.fluency.min, summary.fluency.max), (1.0, 3.0));
        assert_abs_diff_eq!(summary.mean_duration_secs, 3.0);
        assert_abs_diff_eq!(summary.mean_tempo_bpm, 120.0);
    }

    #[test]
    fn empty_corpus_summarises_to_zero() {
        let config = ExtractorConfig::default();
        let corpus = Corpus::from_examples(Vec::new(), config.clone()).unwrap();
        let summary = CorpusSummary::from_corpus(&corpus, &config);
        assert_eq!(summary.examples, 0);
        assert_eq!(summary.pronunciation, ScoreStats::default());
    }
}
