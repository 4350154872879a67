use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ArclusError, Result};
use crate::model::{ClaimId, PremiseId};
use crate::output::short_digest;

/// External model producing one relevance score per claim–premise pair.
pub trait PairwiseScorer {
    /// Stable description of the model and its settings; keys the score cache.
    fn descriptor(&self) -> String;

    fn score(&self, pairs: &[(ClaimId, PremiseId)]) -> anyhow::Result<Vec<f32>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreRow {
    claim_id: ClaimId,
    premise_id: PremiseId,
    score: f32,
}

/// Relevance scores computed upstream for claim–premise pairs.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedScores {
    scores: HashMap<(ClaimId, PremiseId), f32>,
}

impl PrecomputedScores {
    pub fn from_pairs(pairs: impl IntoIterator<Item = ((ClaimId, PremiseId), f32)>) -> Self {
        Self {
            scores: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, claim_id: ClaimId, premise_id: &str) -> Result<f32> {
        self.scores
            .get(&(claim_id, premise_id.to_string()))
            .copied()
            .ok_or_else(|| ArclusError::key_not_found(format!("score for ({claim_id}, {premise_id})")))
    }

    /// Tab-separated `claim_id  premise_id  score` with a header row.
    pub fn load_tsv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
        let mut scores = HashMap::new();
        for row in reader.deserialize() {
            let row: ScoreRow = row?;
            scores.insert((row.claim_id, row.premise_id), row.score);
        }
        info!(path = %path.display(), count = scores.len(), "loaded precomputed scores");
        Ok(Self { scores })
    }

    pub fn save_tsv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        let mut keys: Vec<&(ClaimId, PremiseId)> = self.scores.keys().collect();
        keys.sort();
        for key in keys {
            writer.serialize(ScoreRow {
                claim_id: key.0,
                premise_id: key.1.clone(),
                score: self.scores[key],
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load scores cached under `cache_root`, computing them with `scorer` only
    /// when no cache file exists for its descriptor.
    pub fn load_or_compute(
        cache_root: &Path,
        scorer: &dyn PairwiseScorer,
        pairs: &[(ClaimId, PremiseId)],
    ) -> Result<Self> {
        let path = cache_root.join(format!("{}.tsv", short_digest(&scorer.descriptor())));
        if path.is_file() {
            return Self::load_tsv(&path);
        }

        info!(pairs = pairs.len(), scorer = %scorer.descriptor(), "computing similarities");
        let values = scorer.score(pairs).map_err(ArclusError::Scorer)?;
        if values.len() != pairs.len() {
            return Err(ArclusError::invalid(format!(
                "scorer returned {} scores for {} pairs",
                values.len(),
                pairs.len()
            )));
        }

        let scores = Self::from_pairs(pairs.iter().cloned().zip(values));
        fs::create_dir_all(cache_root)?;
        scores.save_tsv(&path)?;
        Ok(scores)
    }
}
