//! Labeled example manifests in JSON-lines form.
//!
//! One object per line: `{"id": ..., "audio_path": ..., "pronunciation": ..,
//! "fluency": ..}`, or `"features": [..]` in place of `audio_path` for a
//! prepared corpus. Prepared rows also carry the `"extractor"` settings
//! their vectors were computed with. Rows that cannot be used are skipped
//! and counted.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, ScoringError};
use crate::features::{AudioFeatureVector, ExtractorConfig, FeatureExtractor};
use crate::types::{SubScores, SCORE_MAX, SCORE_MIN};

/// One usable training example.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub id: String,
    pub vector: AudioFeatureVector,
    pub scores: SubScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MalformedJson,
    MissingId,
    MissingLabel,
    NonNumericLabel,
    LabelOutOfRange,
    UnreadableAudio,
    DimensionMismatch,
    ExtractorMismatch,
    DuplicateId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedJson => "malformed json",
            Self::MissingId => "missing id",
            Self::MissingLabel => "missing label",
            Self::NonNumericLabel => "non-numeric label",
            Self::LabelOutOfRange => "label out of range",
            Self::UnreadableAudio => "unreadable audio",
            Self::DimensionMismatch => "dimension mismatch",
            Self::ExtractorMismatch => "extractor mismatch",
            Self::DuplicateId => "duplicate id",
        };
        f.write_str(name)
    }
}

/// A manifest row that was left out, with the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub line: usize,
    pub id: Option<String>,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipLog {
    pub records: Vec<SkippedRow>,
}

impl SkipLog {
    fn record(&mut self, line: usize, id: Option<String>, reason: SkipReason, detail: String) {
        debug!(line, ?id, %reason, %detail, "skipping manifest row");
        self.records.push(SkippedRow {
            line,
            id,
            reason,
            detail,
        });
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn count(&self, reason: SkipReason) -> usize {
        self.records.iter().filter(|row| row.reason == reason).count()
    }

    pub fn counts(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.records {
            *counts.entry(row.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Where the audio of manifest rows without `audio_path` lives.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// Rows without `audio_path` use `<audio_dir>/<id>.wav`.
    pub audio_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    examples: Vec<LabeledExample>,
    skipped: SkipLog,
    extractor: ExtractorConfig,
}

enum RowInput {
    Audio(PathBuf),
    Features(Vec<f32>),
}

struct PendingRow {
    line: usize,
    id: String,
    scores: SubScores,
    input: RowInput,
}

impl Corpus {
    /// Build a corpus from examples already in memory, computed under `extractor`.
    pub fn from_examples(examples: Vec<LabeledExample>, extractor: ExtractorConfig) -> Result<Self> {
        let dimension = extractor.dimension();
        let mut seen = HashSet::new();
        for example in &examples {
            example.vector.ensure_dimension(dimension, "corpus example")?;
            if !seen.insert(example.id.as_str()) {
                return Err(ScoringError::data(format!("duplicate example id {}", example.id)));
            }
        }
        Ok(Self {
            examples,
            skipped: SkipLog::default(),
            extractor,
        })
    }

    /// Load a manifest, extracting features for rows that reference audio.
    ///
    /// Only an unreadable manifest fails; bad rows are skipped and counted.
    pub fn load_manifest<P: AsRef<Path>>(
        path: P,
        extractor: &FeatureExtractor,
        options: &ManifestOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| ScoringError::resource(path, err))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let dimension = extractor.dimension();

        let mut skipped = SkipLog::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            match parse_row(raw, &base, options, extractor.config()) {
                Ok(row) => {
                    if seen.insert(row.id.clone()) {
                        pending.push(PendingRow { line, ..row });
                    } else {
                        skipped.record(
                            line,
                            Some(row.id),
                            SkipReason::DuplicateId,
                            "id already seen earlier in the manifest".into(),
                        );
                    }
                }
                Err((id, reason, detail)) => skipped.record(line, id, reason, detail),
            }
        }

        let audio_paths: Vec<PathBuf> = pending
            .iter()
            .filter_map(|row| match &row.input {
                RowInput::Audio(path) => Some(path.clone()),
                RowInput::Features(_) => None,
            })
            .collect();
        if !audio_paths.is_empty() {
            info!(files = audio_paths.len(), "extracting features for manifest rows");
        }
        let mut extracted = extractor.extract_batch(&audio_paths).into_iter();

        let mut examples = Vec::with_capacity(pending.len());
        for row in pending {
            let vector = match row.input {
                RowInput::Features(values) => AudioFeatureVector::from_vec(values),
                RowInput::Audio(audio) => match extracted.next() {
                    Some(Ok(features)) => features.vector,
                    Some(Err(err)) => {
                        warn!(line = row.line, path = %audio.display(), error = %err, "audio skipped");
                        skipped.record(
                            row.line,
                            Some(row.id),
                            SkipReason::UnreadableAudio,
                            err.to_string(),
                        );
                        continue;
                    }
                    None => {
                        skipped.record(
                            row.line,
                            Some(row.id),
                            SkipReason::UnreadableAudio,
                            "no extraction result".into(),
                        );
                        continue;
                    }
                },
            };
            if vector.len() != dimension {
                skipped.record(
                    row.line,
                    Some(row.id),
                    SkipReason::DimensionMismatch,
                    format!("expected {dimension} features, found {}", vector.len()),
                );
                continue;
            }
            examples.push(LabeledExample {
                id: row.id,
                vector,
                scores: row.scores,
            });
        }

        info!(
            manifest = %path.display(),
            used = examples.len(),
            skipped = skipped.total(),
            "manifest loaded"
        );
        Ok(Self {
            examples,
            skipped,
            extractor: extractor.config().clone(),
        })
    }

    /// Write every usable example as a prepared-features JSONL file.
    pub fn write_prepared<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| ScoringError::io(parent, err))?;
        }
        let file = File::create(path).map_err(|err| ScoringError::io(path, err))?;
        let mut writer = BufWriter::new(file);
        for example in &self.examples {
            let row = json!({
                "id": example.id,
                "features": example.vector.as_slice(),
                "pronunciation": example.scores.pronunciation,
                "fluency": example.scores.fluency,
                "extractor": self.extractor,
            });
            serde_json::to_writer(&mut writer, &row)?;
            writer
                .write_all(b"\n")
                .map_err(|err| ScoringError::io(path, err))?;
        }
        writer.flush().map_err(|err| ScoringError::io(path, err))?;
        Ok(())
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn skipped(&self) -> &SkipLog {
        &self.skipped
    }

    pub fn dimension(&self) -> usize {
        self.extractor.dimension()
    }

    /// Settings every vector in the corpus was extracted with.
    pub fn extractor(&self) -> &ExtractorConfig {
        &self.extractor
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

type RowError = (Option<String>, SkipReason, String);

/// An audio clip named by a manifest row, for unlabeled scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEntry {
    pub line: usize,
    pub id: String,
    pub path: PathBuf,
}

/// Read the id and audio location of every manifest row. Labels are not
/// required; rows without a usable id or audio source are skipped.
pub fn read_audio_entries<P: AsRef<Path>>(
    path: P,
    options: &ManifestOptions,
) -> Result<(Vec<AudioEntry>, SkipLog)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| ScoringError::resource(path, err))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut entries = Vec::new();
    let mut skipped = SkipLog::default();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let parsed = parse_object(raw).and_then(|object| {
            let id = parse_id(&object)?;
            match audio_source(&object, &id, &base, options) {
                Some(path) => Ok(AudioEntry { line, id, path }),
                None => Err((
                    Some(id),
                    SkipReason::UnreadableAudio,
                    "row has no audio_path".into(),
                )),
            }
        });
        match parsed {
            Ok(entry) => entries.push(entry),
            Err((id, reason, detail)) => skipped.record(line, id, reason, detail),
        }
    }
    Ok((entries, skipped))
}

fn parse_object(raw: &str) -> std::result::Result<Map<String, Value>, RowError> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err((None, SkipReason::MalformedJson, "row is not an object".into())),
        Err(err) => Err((None, SkipReason::MalformedJson, err.to_string())),
    }
}

fn parse_id(object: &Map<String, Value>) -> std::result::Result<String, RowError> {
    match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => Err((None, SkipReason::MissingId, "row has no usable id".into())),
    }
}

fn audio_source(
    object: &Map<String, Value>,
    id: &str,
    base: &Path,
    options: &ManifestOptions,
) -> Option<PathBuf> {
    if let Some(audio) = object.get("audio_path").and_then(Value::as_str) {
        Some(base.join(audio))
    } else {
        options
            .audio_dir
            .as_ref()
            .map(|dir| dir.join(format!("{id}.wav")))
    }
}

fn parse_row(
    raw: &str,
    base: &Path,
    options: &ManifestOptions,
    active: &ExtractorConfig,
) -> std::result::Result<PendingRow, RowError> {
    let object = parse_object(raw)?;
    let id = parse_id(&object)?;
    let fail = |reason: SkipReason, detail: String| (Some(id.clone()), reason, detail);

    let pronunciation = parse_label(&object, "pronunciation").map_err(|(r, d)| fail(r, d))?;
    let fluency = parse_label(&object, "fluency").map_err(|(r, d)| fail(r, d))?;

    let input = if let Some(features) = object.get("features") {
        check_extractor(object.get("extractor"), active)
            .map_err(|d| fail(SkipReason::ExtractorMismatch, d))?;
        RowInput::Features(parse_features(features).map_err(|d| fail(SkipReason::MalformedJson, d))?)
    } else if let Some(audio) = audio_source(&object, &id, base, options) {
        RowInput::Audio(audio)
    } else {
        return Err(fail(
            SkipReason::UnreadableAudio,
            "row has neither audio_path nor features".into(),
        ));
    };

    Ok(PendingRow {
        line: 0,
        id,
        scores: SubScores::new(pronunciation, fluency),
        input,
    })
}

/// Precomputed vectors are only usable under the settings that produced them.
fn check_extractor(
    recorded: Option<&Value>,
    active: &ExtractorConfig,
) -> std::result::Result<(), String> {
    let recorded =
        recorded.ok_or_else(|| "features row does not record its extractor".to_string())?;
    let recorded: ExtractorConfig = serde_json::from_value(recorded.clone())
        .map_err(|err| format!("unreadable extractor: {err}"))?;
    if &recorded == active {
        Ok(())
    } else {
        Err(format!("features were extracted with {recorded:?}"))
    }
}

/// Labels may be JSON numbers or numeric strings within the rubric range.
fn parse_label(
    object: &Map<String, Value>,
    field: &str,
) -> std::result::Result<f32, (SkipReason, String)> {
    let parsed = match object.get(field) {
        None | Some(Value::Null) => {
            return Err((SkipReason::MissingLabel, format!("{field} is missing")));
        }
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) if text.trim().is_empty() => {
            return Err((SkipReason::MissingLabel, format!("{field} is empty")));
        }
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    let value = parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| (SkipReason::NonNumericLabel, format!("{field} is not a number")))?;
    let value = value as f32;
    if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
        return Err((
            SkipReason::LabelOutOfRange,
            format!("{field} {value} outside {SCORE_MIN}..={SCORE_MAX}"),
        ));
    }
    Ok(value)
}

fn parse_features(value: &Value) -> std::result::Result<Vec<f32>, String> {
    let entries = value
        .as_array()
        .ok_or_else(|| "features is not an array".to_string())?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_f64()
                .filter(|v| v.is_finite())
                .map(|v| v as f32)
                .ok_or_else(|| format!("non-numeric feature value {entry}"))
        })
        .collect()
}
