//! Result files: deterministic output paths, TSV rows and run manifests.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::Result;
use crate::eval::EvalSummary;

pub const DEFAULT_OUTPUT_ROOT: &str = "results";

/// Hex characters kept from the SHA-512 digest.
const DIGEST_LEN: usize = 20;

pub fn short_digest(text: &str) -> String {
    let digest = Sha512::digest(text.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(DIGEST_LEN);
    hex
}

/// A configuration value as it appears in the hashed rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
}

impl ConfigValue {
    pub fn from_opt_str(value: Option<&str>) -> Self {
        value.map_or(Self::None, |s| Self::Str(s.to_string()))
    }

    pub fn from_opt_float(value: Option<f64>) -> Self {
        value.map_or(Self::None, Self::Float)
    }

    /// Plain text for TSV columns; `None` becomes an empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write_float(f, *x),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::IntList(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Key/value configuration of one evaluation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    entries: Vec<(String, ConfigValue)>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: ConfigValue) -> Self {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value));
        self
    }

    /// Entries sorted by key.
    pub fn sorted(&self) -> Vec<(String, ConfigValue)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Canonical rendering: `[('key', value), ...]` with keys sorted.
    pub fn canonical(&self) -> String {
        let items: Vec<String> = self
            .sorted()
            .iter()
            .map(|(k, v)| format!("('{k}', {v})"))
            .collect();
        format!("[{}]", items.join(", "))
    }

    pub fn digest(&self) -> String {
        short_digest(&self.canonical())
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.tsv", self.digest()))
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.json", self.digest()))
    }
}

/// Write one row per (claim, k) plus a `mean` row per k. Configuration values
/// are appended as trailing columns.
pub fn write_results_tsv(path: &Path, summary: &EvalSummary, config: &RunConfig) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    let config = config.sorted();

    let mut header: Vec<String> = ["claim_id", "k", "ndcg", "returned", "degenerate", "evaluated"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(config.iter().map(|(k, _)| k.clone()));
    writer.write_record(&header)?;

    let config_cells: Vec<String> = config.iter().map(|(_, v)| v.to_cell()).collect();
    for o in &summary.outcomes {
        let mut record = vec![
            o.claim_id.to_string(),
            o.k.to_string(),
            o.ndcg.to_string(),
            o.returned.to_string(),
            o.degenerate.to_string(),
            String::new(),
        ];
        record.extend(config_cells.iter().cloned());
        writer.write_record(&record)?;
    }
    for s in &summary.summaries {
        let mut record = vec![
            "mean".to_string(),
            s.k.to_string(),
            s.mean_ndcg.to_string(),
            String::new(),
            String::new(),
            s.evaluated.to_string(),
        ];
        record.extend(config_cells.iter().cloned());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Evaluating,
    Completed,
    Failed,
}

/// JSON manifest stored next to a results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub config: Vec<(String, String)>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claims: Option<usize>,
    pub mean_ndcg: Vec<(usize, f64)>,
    pub error: Option<String>,
}

impl EvaluationRun {
    pub fn start(config: &RunConfig) -> Self {
        Self {
            run_id: config.digest(),
            config: config
                .sorted()
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect(),
            status: RunStatus::Evaluating,
            started_at: Utc::now(),
            completed_at: None,
            claims: None,
            mean_ndcg: Vec::new(),
            error: None,
        }
    }

    pub fn on_completed(&mut self, summary: &EvalSummary) {
        if self.status != RunStatus::Evaluating {
            return;
        }
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.claims = summary.summaries.first().map(|s| s.evaluated + s.skipped);
        self.mean_ndcg = summary.summaries.iter().map(|s| (s.k, s.mean_ndcg)).collect();
    }

    pub fn on_failed(&mut self, reason: impl Into<String>) {
        if self.status != RunStatus::Evaluating {
            return;
        }
        self.status = RunStatus::Failed;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{ClaimOutcome, KSummary};

    fn config() -> RunConfig {
        RunConfig::new()
            .with("method", ConfigValue::Str("zero_shot_knn".into()))
            .with("similarity", ConfigValue::None)
            .with("cluster_ratio", ConfigValue::Float(0.5))
            .with("cluster_representative", ConfigValue::None)
    }

    #[test]
    fn canonical_form_sorts_keys() {
        assert_eq!(
            config().canonical(),
            "[('cluster_ratio', 0.5), ('cluster_representative', None), \
             ('method', 'zero_shot_knn'), ('similarity', None)]"
        );
        let more = RunConfig::new()
            .with("pad", ConfigValue::Bool(true))
            .with("ks", ConfigValue::IntList(vec![5, 10]))
            .with("ratio", ConfigValue::Float(1.0));
        assert_eq!(more.canonical(), "[('ks', [5, 10]), ('pad', True), ('ratio', 1.0)]");
    }

    #[test]
    fn digest_is_stable_and_order_independent() {
        let reordered = RunConfig::new()
            .with("similarity", ConfigValue::None)
            .with("cluster_representative", ConfigValue::None)
            .with("cluster_ratio", ConfigValue::Float(0.5))
            .with("method", ConfigValue::Str("zero_shot_knn".into()));
        assert_eq!(config().digest(), reordered.digest());
        assert_eq!(config().digest().len(), 20);
        assert_ne!(
            config().digest(),
            config().with("method", ConfigValue::Str("learned_similarity_knn".into())).digest()
        );
        assert!(config().output_path(Path::new("out")).ends_with(format!("{}.tsv", config().digest())));
    }

    #[test]
    fn results_tsv_has_claim_and_mean_rows() {
        let summary = EvalSummary {
            outcomes: vec![ClaimOutcome {
                claim_id: 3,
                k: 5,
                ndcg: 0.25,
                returned: 5,
                degenerate: false,
                latency_ms: 1.0,
            }],
            summaries: vec![KSummary {
                k: 5,
                mean_ndcg: 0.25,
                evaluated: 1,
                skipped: 0,
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.tsv");
        write_results_tsv(&path, &summary, &config()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("claim_id\tk\tndcg"));
        assert!(lines[0].ends_with("method\tsimilarity"));
        assert_eq!(lines[1], "3\t5\t0.25\t5\tfalse\t\t0.5\t\tzero_shot_knn\t");
        assert!(lines[2].starts_with("mean\t5\t0.25\t\t\t1\t"));
    }

    #[test]
    fn manifest_tracks_completion() {
        let mut run = EvaluationRun::start(&config());
        run.on_failed("boom");
        run.on_completed(&EvalSummary {
            outcomes: Vec::new(),
            summaries: Vec::new(),
        });
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("boom"));
    }
}
