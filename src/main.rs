use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use speechgrade::cli::{
    Cli, Command, ExtractArgs, PredictArgs, PrepareArgs, SummaryArgs, TrainArgs,
};
use speechgrade::config::ScorerConfig;
use speechgrade::summary::CorpusSummary;
use speechgrade::training::{self, read_audio_entries, Corpus, ManifestOptions};
use speechgrade::{FeatureExtractor, ScoringService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ScorerConfig::from_override(cli.config.as_deref())
        .context("failed to load configuration")?;
    match cli.command {
        Command::Extract(args) => handle_extract(&config, &args),
        Command::Prepare(args) => handle_prepare(&config, &args),
        Command::Train(args) => handle_train(config, &args),
        Command::Predict(args) => handle_predict(&config, &args),
        Command::Summary(args) => handle_summary(&config, &args),
    }
}

/// Logs go to stderr so JSON on stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_extract(config: &ScorerConfig, args: &ExtractArgs) -> Result<()> {
    let extractor = FeatureExtractor::new(config.extractor.clone())?;
    let extracted = extractor
        .extract_file(&args.audio)
        .with_context(|| format!("failed to extract features from {:?}", args.audio))?;
    let layout = extractor.layout();

    if args.json {
        let features: BTreeMap<&str, f32> = layout
            .names()
            .iter()
            .map(String::as_str)
            .zip(extracted.vector.as_slice().iter().copied())
            .collect();
        let output = json!({
            "dimension": extracted.vector.len(),
            "features": features,
            "diagnostics": extracted.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (name, value) in layout.names().iter().zip(extracted.vector.as_slice()) {
            println!("{name:<24} {value:.6}");
        }
        let diagnostics = &extracted.diagnostics;
        println!(
            "duration {:.2}s, {} voiced segments, {} pauses ({:.2}s), speech rate {:.2}/s",
            diagnostics.duration_secs,
            diagnostics.voiced_segments.len(),
            diagnostics.num_pauses,
            diagnostics.pause_total_secs,
            diagnostics.speech_rate
        );
    }
    Ok(())
}

fn load_corpus(
    config: &ScorerConfig,
    path: &Path,
    audio_dir: Option<&Path>,
) -> Result<Corpus> {
    let extractor = FeatureExtractor::new(config.extractor.clone())?;
    let options = ManifestOptions {
        audio_dir: audio_dir.map(Path::to_path_buf),
    };
    let corpus = Corpus::load_manifest(path, &extractor, &options)
        .with_context(|| format!("failed to load corpus {path:?}"))?;
    for (reason, count) in corpus.skipped().counts() {
        info!(%reason, count, "rows skipped");
    }
    Ok(corpus)
}

fn handle_prepare(config: &ScorerConfig, args: &PrepareArgs) -> Result<()> {
    let corpus = load_corpus(config, &args.manifest, args.audio_dir.as_deref())?;
    corpus
        .write_prepared(&args.output)
        .with_context(|| format!("failed to write {:?}", args.output))?;
    let output = json!({
        "output": args.output,
        "used": corpus.len(),
        "skipped": corpus.skipped().counts(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_train(mut config: ScorerConfig, args: &TrainArgs) -> Result<()> {
    args.apply(&mut config.training);
    let corpus = load_corpus(&config, &args.corpus, args.audio_dir.as_deref())?;
    let report = training::train(&corpus, config.training, config.extractor)
        .context("training failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_predict(config: &ScorerConfig, args: &PredictArgs) -> Result<()> {
    let bundle_dir = config.bundle_dir(args.bundle.as_deref());
    let service = ScoringService::load(&bundle_dir, config.extractor.clone())
        .with_context(|| format!("failed to load model bundle {bundle_dir:?}"))?;

    if let ([audio], None) = (args.audio.as_slice(), &args.manifest) {
        let assessment = service
            .assess_file(audio)
            .with_context(|| format!("failed to score {audio:?}"))?;
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    let mut clips: Vec<(Option<String>, PathBuf)> =
        args.audio.iter().map(|path| (None, path.clone())).collect();
    if let Some(manifest) = &args.manifest {
        let options = ManifestOptions {
            audio_dir: args.audio_dir.clone(),
        };
        let (entries, skipped) = read_audio_entries(manifest, &options)
            .with_context(|| format!("failed to read manifest {manifest:?}"))?;
        for row in &skipped.records {
            let line = json!({
                "line": row.line,
                "id": row.id,
                "error": format!("{}: {}", row.reason, row.detail),
            });
            println!("{}", serde_json::to_string(&line)?);
        }
        clips.extend(entries.into_iter().map(|entry| (Some(entry.id), entry.path)));
    }

    let paths: Vec<PathBuf> = clips.iter().map(|(_, path)| path.clone()).collect();
    let mut failed = 0;
    for ((id, path), result) in clips.iter().zip(service.assess_batch(&paths)) {
        let line = match result {
            Ok(assessment) => json!({
                "id": id,
                "path": path,
                "scores": assessment.scores,
                "diagnostics": assessment.diagnostics,
            }),
            Err(err) => {
                failed += 1;
                warn!(path = %path.display(), error = %err, "clip not scored");
                json!({ "id": id, "path": path, "error": err.to_string() })
            }
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    info!(clips = paths.len(), failed, "batch scored");
    Ok(())
}

fn handle_summary(config: &ScorerConfig, args: &SummaryArgs) -> Result<()> {
    let corpus = load_corpus(config, &args.file, args.audio_dir.as_deref())?;
    let summary = CorpusSummary::from_corpus(&corpus, &config.extractor);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
