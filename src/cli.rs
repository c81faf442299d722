use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::BUNDLE_ENV;
use crate::training::TrainingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "speechgrade",
    version,
    about = "Acoustic pronunciation and fluency scoring for spoken responses"
)]
pub struct Cli {
    /// JSON file with optional `extractor` and `training` sections.
    #[arg(long, global = true, value_name = "JSON")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract the feature vector of one audio file.
    Extract(ExtractArgs),
    /// Extract features for a manifest and write a prepared corpus.
    Prepare(PrepareArgs),
    /// Train a model bundle from a manifest or prepared corpus.
    Train(TrainArgs),
    /// Score audio files with a trained bundle.
    Predict(PredictArgs),
    /// Print descriptive statistics of a manifest or prepared corpus.
    Summary(SummaryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(value_name = "AUDIO")]
    pub audio: PathBuf,
    /// Emit named features and diagnostics as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    #[arg(long, value_name = "JSONL")]
    pub manifest: PathBuf,
    #[arg(long, value_name = "JSONL")]
    pub output: PathBuf,
    /// Directory holding `<id>.wav` for rows without `audio_path`.
    #[arg(long = "audio-dir")]
    pub audio_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    #[arg(long, value_name = "JSONL")]
    pub corpus: PathBuf,
    /// Bundle output directory.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long = "audio-dir")]
    pub audio_dir: Option<PathBuf>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    #[arg(long = "learning-rate")]
    pub learning_rate: Option<f64>,
    #[arg(long = "hidden-dim")]
    pub hidden_dim: Option<usize>,
    #[arg(long = "num-layers")]
    pub num_layers: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut TrainingConfig) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(hidden_dim) = self.hidden_dim {
            config.hidden_dim = hidden_dim;
        }
        if let Some(num_layers) = self.num_layers {
            config.num_layers = num_layers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// One file prints a single JSON document; more print one JSON line each.
    #[arg(value_name = "AUDIO", required_unless_present = "manifest")]
    pub audio: Vec<PathBuf>,
    /// JSONL manifest naming clips by `audio_path` or id; labels are ignored.
    #[arg(long, value_name = "JSONL")]
    pub manifest: Option<PathBuf>,
    #[arg(long = "audio-dir")]
    pub audio_dir: Option<PathBuf>,
    /// Bundle directory; defaults to the training output directory.
    #[arg(long, env = BUNDLE_ENV)]
    pub bundle: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[arg(value_name = "JSONL")]
    pub file: PathBuf,
    #[arg(long = "audio-dir")]
    pub audio_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use crate::training::TrainingConfig;
    use clap::Parser;

    #[test]
    fn train_flags_override_config() {
        let cli = Cli::try_parse_from([
            "speechgrade",
            "train",
            "--corpus",
            "prepared.jsonl",
            "--epochs",
            "7",
            "--hidden-dim",
            "32",
            "--config",
            "settings.json",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("settings.json")));
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let mut config = TrainingConfig::default();
        args.apply(&mut config);
        assert_eq!(config.epochs, 7);
        assert_eq!(config.hidden_dim, 32);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn predict_takes_files_or_a_manifest() {
        let cli = Cli::try_parse_from(["speechgrade", "predict", "a.wav", "b.wav"]).unwrap();
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(args.audio.len(), 2);
        assert!(args.manifest.is_none());

        let cli = Cli::try_parse_from(["speechgrade", "predict", "--manifest", "clips.jsonl"])
            .unwrap();
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert!(args.audio.is_empty());
        assert_eq!(args.manifest.as_deref(), Some(std::path::Path::new("clips.jsonl")));
    }

    #[test]
    fn predict_requires_audio() {
        assert!(Cli::try_parse_from(["speechgrade", "predict"]).is_err());
        let cli = Cli::try_parse_from(["speechgrade", "extract", "clip.wav", "--json"]).unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert!(args.json);
    }
}
