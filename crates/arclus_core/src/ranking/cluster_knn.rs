use std::sync::Arc;

use nalgebra::DMatrix;
use tracing::{debug, warn};

use super::{ensure_unique, require, MethodConfig, RankingMethod};
use crate::cluster::{num_clusters, Clusterer, Clustering};
use crate::error::Result;
use crate::model::{ClaimId, PremiseId, Ranking, RepresentativeMode};
use crate::similarity::{most_similar, Similarity};
use crate::storage::{ClaimStore, PremiseStore};

/// Cluster the candidate pool and return at most one premise per cluster.
///
/// Each non-empty cluster contributes one representative; representatives are
/// then ranked by similarity to the claim.
#[derive(Debug, Clone)]
pub struct ZeroShotClusterKnn {
    similarity: Arc<dyn Similarity>,
    claims: Arc<ClaimStore>,
    premises: Arc<PremiseStore>,
    clusterer: Arc<dyn Clusterer>,
    ratio: f64,
    /// Parsed on every call; an unsupported mode fails the first ranking.
    representative: String,
}

impl ZeroShotClusterKnn {
    pub const NAME: &'static str = "zero_shot_cluster_knn";

    pub fn new(
        similarity: Arc<dyn Similarity>,
        claims: Arc<ClaimStore>,
        premises: Arc<PremiseStore>,
        clusterer: Arc<dyn Clusterer>,
        ratio: f64,
        representative: impl Into<String>,
    ) -> Self {
        Self {
            similarity,
            claims,
            premises,
            clusterer,
            ratio,
            representative: representative.into(),
        }
    }

    pub fn from_config(config: MethodConfig) -> Result<Box<dyn RankingMethod>> {
        config.ensure_only(
            Self::NAME,
            &[
                "similarity",
                "claims",
                "premises",
                "cluster_ratio",
                "cluster_representative",
                "seed",
            ],
        )?;
        let ratio = config.cluster_ratio_or_default()?;
        let clusterer = config.clusterer();
        let representative = config.representative_or_default();
        Ok(Box::new(Self::new(
            require(config.similarity, "similarity", Self::NAME)?,
            require(config.claims, "claims", Self::NAME)?,
            require(config.premises, "premises", Self::NAME)?,
            clusterer,
            ratio,
            representative,
        )))
    }

    /// Local premise index chosen for every non-empty cluster, in label order.
    fn representatives(
        &self,
        mode: RepresentativeMode,
        claim: &DMatrix<f32>,
        premises: &DMatrix<f32>,
        clustering: &Clustering,
    ) -> Result<Vec<usize>> {
        let mut chosen = Vec::with_capacity(clustering.n_clusters());
        for label in 0..clustering.n_clusters() {
            let members = clustering.members(label);
            if members.is_empty() {
                continue;
            }
            let anchor = match mode {
                RepresentativeMode::ClosestToCenter => clustering.centroid(label),
                RepresentativeMode::ClosestToClaim => claim.clone(),
            };
            let in_cluster = premises.select_rows(members.iter());
            if let Some(best) = most_similar(self.similarity.as_ref(), &anchor, &in_cluster, 1)?
                .first()
            {
                chosen.push(members[*best]);
            }
        }
        Ok(chosen)
    }
}

impl RankingMethod for ZeroShotClusterKnn {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rank(&self, claim_id: ClaimId, premise_ids: &[PremiseId], k: usize) -> Result<Ranking> {
        let mode: RepresentativeMode = self.representative.parse()?;
        ensure_unique(premise_ids)?;
        let claim = self.claims.row(&claim_id)?;
        let premises = self.premises.stack(premise_ids)?;
        if k == 0 || premise_ids.is_empty() {
            return Ok(Vec::new());
        }

        let n_clusters = num_clusters(self.ratio, premise_ids.len(), k);
        let clustering = self.clusterer.cluster(&premises, n_clusters)?;
        let representatives = self.representatives(mode, &claim, &premises, &clustering)?;
        if representatives.is_empty() {
            warn!(claim_id, n_clusters, "all clusters empty, returning no premises");
            return Ok(Vec::new());
        }

        let representative_repr = premises.select_rows(representatives.iter());
        let top = most_similar(self.similarity.as_ref(), &claim, &representative_repr, k)?;
        debug!(
            claim_id,
            pool = premise_ids.len(),
            n_clusters,
            representatives = representatives.len(),
            k,
            mode = mode.as_str(),
            "cluster knn ranking"
        );

        Ok(top
            .into_iter()
            .map(|i| premise_ids[representatives[i]].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::cluster::KMeans;
    use crate::error::ArclusError;
    use crate::ranking::fixtures::{ids, stores, zero_shot_config};
    use crate::ranking::method_by_name;
    use crate::similarity::CosineSimilarity;

    fn method(ratio: f64, mode: &str) -> Box<dyn RankingMethod> {
        method_by_name(
            "zero_shot_cluster_knn",
            MethodConfig {
                cluster_ratio: Some(ratio),
                cluster_representative: Some(mode.to_string()),
                seed: Some(3),
                ..zero_shot_config()
            },
        )
        .unwrap()
    }

    fn pool() -> Vec<PremiseId> {
        ids(&["a", "b", "c", "d", "e", "f"])
    }

    #[test]
    fn at_most_one_premise_per_cluster() {
        let (_, premises) = stores();
        for mode in ["closest-to-center", "closest-to-claim"] {
            let ranking = method(0.5, mode).rank(1, &pool(), 3).unwrap();
            assert!(!ranking.is_empty() && ranking.len() <= 3);

            // Re-run the identical clustering to recover the labels.
            let repr = premises.stack(&pool()).unwrap();
            let clustering = KMeans::with_seed(3)
                .cluster(&repr, num_clusters(0.5, 6, 3))
                .unwrap();
            let labels: HashSet<usize> = ranking
                .iter()
                .map(|id| clustering.labels[pool().iter().position(|p| p == id).unwrap()])
                .collect();
            assert_eq!(labels.len(), ranking.len());
        }
    }

    #[test]
    fn redundant_premises_collapse_to_one_representative() {
        // Two tight groups: {b, c, d} along x and {a, e, f} along y.
        let ranking = method(0.34, "closest-to-claim").rank(1, &pool(), 2).unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0], "d");
        assert!(["a", "e", "f"].contains(&ranking[1].as_str()));
    }

    #[test]
    fn representative_mode_picks_centroid_or_claim_neighbour() {
        // One cluster with centroid (2/3, 2/3): `diag` is nearest the centroid
        // while `x` is nearest the claim.
        let claims = ClaimStore::from_entries(vec![(1, vec![1.0, 0.0])]).unwrap();
        let premises = PremiseStore::from_entries(vec![
            ("x".to_string(), vec![1.0, 0.0]),
            ("diag".to_string(), vec![1.0, 1.0]),
            ("y".to_string(), vec![0.0, 1.0]),
        ])
        .unwrap();
        let (claims, premises) = (Arc::new(claims), Arc::new(premises));
        let pool = ids(&["x", "diag", "y"]);

        let rank_with = |mode: RepresentativeMode| {
            ZeroShotClusterKnn::new(
                Arc::new(CosineSimilarity),
                claims.clone(),
                premises.clone(),
                Arc::new(KMeans::default()),
                0.1,
                mode.as_str(),
            )
            .rank(1, &pool, 1)
            .unwrap()
        };

        assert_eq!(rank_with(RepresentativeMode::ClosestToCenter), ids(&["diag"]));
        assert_eq!(rank_with(RepresentativeMode::ClosestToClaim), ids(&["x"]));
    }

    #[test]
    fn ranking_is_idempotent_with_fixed_seed() {
        let m = method(0.5, "closest-to-center");
        let first = m.rank(2, &pool(), 3).unwrap();
        let second = m.rank(2, &pool(), 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unsupported_mode_fails_at_ranking_time() {
        let m = method(0.5, "closest-to-moon");
        let err = m.rank(1, &pool(), 2).unwrap_err();
        assert!(matches!(err, ArclusError::InvalidArgument(_)));
    }

    #[test]
    fn output_is_drawn_from_pool_without_duplicates() {
        let subset = ids(&["f", "c", "a"]);
        let ranking = method(1.0, "closest-to-center").rank(1, &subset, 5).unwrap();
        assert_eq!(ranking.len(), 3);
        let unique: HashSet<&PremiseId> = ranking.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(ranking.iter().all(|id| subset.contains(id)));
    }
}
