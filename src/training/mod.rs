//! Supervised training of the score regressor.

pub mod corpus;
pub mod schedule;
pub mod split;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScoringError};
use crate::features::{AudioFeatureVector, ExtractorConfig};
use crate::model::regressor::{batch_tensor, target_tensor};
use crate::model::{
    write_bundle, BundleMetadata, NormalizationState, RegressorShape, ScoreRegressor,
    FORMAT_VERSION,
};
use crate::types::SubScores;

pub use corpus::{
    read_audio_entries, AudioEntry, Corpus, LabeledExample, ManifestOptions, SkipLog, SkipReason,
    SkippedRow,
};
pub use schedule::PlateauScheduler;
pub use split::{split_indices, DataSplit};

/// Training hyperparameters; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub output_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub validation_fraction: f64,
    pub seed: u64,
    pub plateau_patience: usize,
    pub plateau_factor: f64,
    pub min_learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./audio_model"),
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            hidden_dim: 128,
            num_layers: 2,
            validation_fraction: 0.2,
            seed: 42,
            plateau_patience: 10,
            plateau_factor: 0.5,
            min_learning_rate: 1e-6,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(ScoringError::configuration(
                "epochs and batch_size must be positive",
            ));
        }
        if self.hidden_dim == 0 || self.num_layers == 0 {
            return Err(ScoringError::configuration(
                "hidden_dim and num_layers must be positive",
            ));
        }
        if !(self.learning_rate > 0.0) || !(self.min_learning_rate >= 0.0) {
            return Err(ScoringError::configuration(format!(
                "invalid learning rates: {} (min {})",
                self.learning_rate, self.min_learning_rate
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(ScoringError::configuration(format!(
                "validation_fraction must lie in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return Err(ScoringError::configuration(format!(
                "plateau_factor must lie in (0, 1), got {}",
                self.plateau_factor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Idle,
    DataLoaded,
    Split,
    Fitting,
    EpochLoop,
    Done,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DataLoaded => "data-loaded",
            Self::Split => "split",
            Self::Fitting => "fitting",
            Self::EpochLoop => "epoch-loop",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub bundle_dir: PathBuf,
    pub used: usize,
    pub skipped_counts: BTreeMap<SkipReason, usize>,
    pub skipped: Vec<SkippedRow>,
    pub best_validation_loss: f32,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub final_learning_rate: f64,
    pub split: DataSplit,
}

struct Prepared {
    xs: Tensor,
    ys: Tensor,
    len: usize,
}

/// Drives one training run through its phases.
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    extractor: ExtractorConfig,
    phase: TrainingPhase,
}

impl Trainer {
    pub fn new(config: TrainingConfig, extractor: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        extractor.validate()?;
        Ok(Self {
            config,
            extractor,
            phase: TrainingPhase::Idle,
        })
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn advance(&mut self, next: TrainingPhase) {
        info!(from = %self.phase, to = %next, "training phase");
        self.phase = next;
    }

    /// Train on `corpus` and persist the best bundle to `output_dir`.
    pub fn run(&mut self, corpus: &Corpus) -> Result<TrainingReport> {
        let input_dim = self.extractor.dimension();
        if corpus.dimension() != input_dim {
            return Err(ScoringError::DimensionMismatch {
                context: "training corpus",
                expected: input_dim,
                actual: corpus.dimension(),
            });
        }
        if corpus.extractor() != &self.extractor {
            return Err(ScoringError::configuration(format!(
                "corpus was extracted with {:?}, training uses {:?}",
                corpus.extractor(),
                self.extractor
            )));
        }
        if corpus.len() < 2 {
            return Err(ScoringError::data(format!(
                "need at least 2 usable examples, found {} ({} skipped)",
                corpus.len(),
                corpus.skipped().total()
            )));
        }
        self.advance(TrainingPhase::DataLoaded);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let split = split_indices(corpus.len(), self.config.validation_fraction, &mut rng)?;
        info!(
            train = split.train.len(),
            validation = split.validation.len(),
            seed = self.config.seed,
            "split corpus"
        );
        self.advance(TrainingPhase::Split);

        let examples = corpus.examples();
        let gather = |indices: &[usize]| -> (Vec<AudioFeatureVector>, Vec<SubScores>) {
            indices
                .iter()
                .map(|&i| (examples[i].vector.clone(), examples[i].scores))
                .unzip()
        };
        let (train_vectors, train_scores) = gather(&split.train);
        let (validation_vectors, validation_scores) = gather(&split.validation);
        let normalizer = NormalizationState::fit(&train_vectors)?;
        self.advance(TrainingPhase::Fitting);

        let shape = RegressorShape {
            input_dim,
            hidden_dim: self.config.hidden_dim,
            num_layers: self.config.num_layers,
        };
        let regressor = ScoreRegressor::new(shape)?;
        let device = regressor.device().clone();
        let train = prepare(&normalizer, &train_vectors, &train_scores, input_dim, &device)?;
        let validation = prepare(
            &normalizer,
            &validation_vectors,
            &validation_scores,
            input_dim,
            &device,
        )?;

        let mut optimizer = AdamW::new(
            regressor.trainable_vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let mut scheduler = PlateauScheduler::new(
            self.config.plateau_factor,
            self.config.plateau_patience,
            self.config.min_learning_rate,
        );
        self.advance(TrainingPhase::EpochLoop);

        let mut best: Option<(f32, usize)> = None;
        let mut order: Vec<usize> = (0..train.len).collect();
        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0_f64;
            for chunk in order.chunks(self.config.batch_size) {
                let rows: Vec<u32> = chunk.iter().map(|&i| i as u32).collect();
                let rows = Tensor::from_vec(rows, chunk.len(), &device)?;
                let xs = train.xs.index_select(&rows, 0)?;
                let ys = train.ys.index_select(&rows, 0)?;
                let predictions = regressor.forward_batch(&xs, true)?;
                let loss = candle_nn::loss::mse(&predictions, &ys)?;
                optimizer.backward_step(&loss)?;
                total += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            }
            let train_loss = total / train.len as f64;

            let predictions = regressor.forward_batch(&validation.xs, false)?;
            let validation_loss = candle_nn::loss::mse(&predictions, &validation.ys)?
                .to_scalar::<f32>()?;
            debug!(
                epoch,
                train_loss,
                validation_loss,
                lr = optimizer.learning_rate(),
                "epoch finished"
            );

            let improved = validation_loss.is_finite()
                && best.map_or(true, |(loss, _)| validation_loss < loss);
            if improved {
                best = Some((validation_loss, epoch));
                let metadata = BundleMetadata {
                    format_version: FORMAT_VERSION,
                    input_dim,
                    hidden_dim: shape.hidden_dim,
                    num_layers: shape.num_layers,
                    best_loss: validation_loss,
                    best_epoch: epoch,
                    extractor: self.extractor.clone(),
                };
                write_bundle(&self.config.output_dir, &regressor, &normalizer, &metadata)?;
                info!(epoch, validation_loss, "new best model saved");
            }

            let current = optimizer.learning_rate();
            let next = scheduler.step(validation_loss as f64, current);
            if next < current {
                info!(epoch, from = current, to = next, "reducing learning rate");
                optimizer.set_learning_rate(next);
            }
        }

        let (best_validation_loss, best_epoch) = best.ok_or_else(|| {
            ScoringError::data("training never produced a finite validation loss")
        })?;
        self.advance(TrainingPhase::Done);
        info!(
            best_epoch,
            best_validation_loss,
            dir = %self.config.output_dir.display(),
            "training complete"
        );

        Ok(TrainingReport {
            bundle_dir: self.config.output_dir.clone(),
            used: corpus.len(),
            skipped_counts: corpus.skipped().counts(),
            skipped: corpus.skipped().records.clone(),
            best_validation_loss,
            best_epoch,
            epochs_run: self.config.epochs,
            final_learning_rate: optimizer.learning_rate(),
            split,
        })
    }
}

/// Convenience wrapper: build a [`Trainer`] and run it once.
pub fn train(
    corpus: &Corpus,
    config: TrainingConfig,
    extractor: ExtractorConfig,
) -> Result<TrainingReport> {
    Trainer::new(config, extractor)?.run(corpus)
}

fn prepare(
    normalizer: &NormalizationState,
    vectors: &[AudioFeatureVector],
    scores: &[SubScores],
    dim: usize,
    device: &Device,
) -> Result<Prepared> {
    let normalized = vectors
        .iter()
        .map(|vector| normalizer.transform(vector))
        .collect::<Result<Vec<_>>>()?;
    Ok(Prepared {
        xs: batch_tensor(&normalized, dim, device)?,
        ys: target_tensor(scores, device)?,
        len: vectors.len(),
    })
}
