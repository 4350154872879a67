use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::{ensure_unique, require, MethodConfig, PrecomputedScores, RankingMethod};
use crate::cluster::{num_clusters, Clusterer};
use crate::error::Result;
use crate::model::{ClaimId, PremiseId, Ranking};
use crate::storage::PremiseStore;

/// Pool indices ordered by descending precomputed score; ties keep pool order.
fn by_descending_score(
    scores: &PrecomputedScores,
    claim_id: ClaimId,
    premise_ids: &[PremiseId],
) -> Result<Vec<usize>> {
    let values = premise_ids
        .iter()
        .map(|p| scores.get(claim_id, p))
        .collect::<Result<Vec<f32>>>()?;
    let mut order: Vec<usize> = (0..premise_ids.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    Ok(order)
}

/// Rank premises by scores of a fine-tuned pairwise claim–premise model.
#[derive(Debug, Clone)]
pub struct LearnedSimilarityKnn {
    scores: Arc<PrecomputedScores>,
}

impl LearnedSimilarityKnn {
    pub const NAME: &'static str = "learned_similarity_knn";

    pub fn new(scores: Arc<PrecomputedScores>) -> Self {
        Self { scores }
    }

    pub fn from_config(config: MethodConfig) -> Result<Box<dyn RankingMethod>> {
        config.ensure_only(Self::NAME, &["scores"])?;
        Ok(Box::new(Self::new(require(config.scores, "scores", Self::NAME)?)))
    }
}

impl RankingMethod for LearnedSimilarityKnn {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rank(&self, claim_id: ClaimId, premise_ids: &[PremiseId], k: usize) -> Result<Ranking> {
        ensure_unique(premise_ids)?;
        let order = by_descending_score(&self.scores, claim_id, premise_ids)?;
        Ok(order
            .into_iter()
            .take(k)
            .map(|i| premise_ids[i].clone())
            .collect())
    }
}

/// Like [`LearnedSimilarityKnn`], but keeps only the best scored premise of
/// every embedding cluster.
#[derive(Debug, Clone)]
pub struct LearnedSimilarityClusterKnn {
    scores: Arc<PrecomputedScores>,
    premises: Arc<PremiseStore>,
    clusterer: Arc<dyn Clusterer>,
    ratio: f64,
}

impl LearnedSimilarityClusterKnn {
    pub const NAME: &'static str = "learned_similarity_cluster_knn";

    pub fn new(
        scores: Arc<PrecomputedScores>,
        premises: Arc<PremiseStore>,
        clusterer: Arc<dyn Clusterer>,
        ratio: f64,
    ) -> Self {
        Self {
            scores,
            premises,
            clusterer,
            ratio,
        }
    }

    pub fn from_config(config: MethodConfig) -> Result<Box<dyn RankingMethod>> {
        config.ensure_only(Self::NAME, &["scores", "premises", "cluster_ratio", "seed"])?;
        let ratio = config.cluster_ratio_or_default()?;
        let clusterer = config.clusterer();
        Ok(Box::new(Self::new(
            require(config.scores, "scores", Self::NAME)?,
            require(config.premises, "premises", Self::NAME)?,
            clusterer,
            ratio,
        )))
    }
}

impl RankingMethod for LearnedSimilarityClusterKnn {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rank(&self, claim_id: ClaimId, premise_ids: &[PremiseId], k: usize) -> Result<Ranking> {
        ensure_unique(premise_ids)?;
        let premises = self.premises.stack(premise_ids)?;
        let order = by_descending_score(&self.scores, claim_id, premise_ids)?;
        if k == 0 || premise_ids.is_empty() {
            return Ok(Vec::new());
        }

        let n_clusters = num_clusters(self.ratio, premise_ids.len(), k);
        let clustering = self.clusterer.cluster(&premises, n_clusters)?;

        // The first premise seen for a label wins; later ones are dropped.
        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(k);
        for i in order {
            if seen.insert(clustering.labels[i]) {
                result.push(premise_ids[i].clone());
                if result.len() == k {
                    break;
                }
            }
        }

        debug!(claim_id, pool = premise_ids.len(), n_clusters, k, "learned cluster knn ranking");
        Ok(result)
    }
}
