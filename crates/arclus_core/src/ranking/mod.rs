//! Premise ranking strategies and their name registry.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use crate::cluster::{Clusterer, KMeans, DEFAULT_CLUSTER_RATIO, DEFAULT_SEED};
use crate::error::{ArclusError, Result};
use crate::model::{ClaimId, PremiseId, Ranking, RepresentativeMode};
use crate::similarity::Similarity;
use crate::storage::{ClaimStore, PremiseStore};

mod cluster_knn;
mod knn;
mod learned;
mod scores;

pub use cluster_knn::ZeroShotClusterKnn;
pub use knn::ZeroShotKnn;
pub use learned::{LearnedSimilarityClusterKnn, LearnedSimilarityKnn};
pub use scores::{PairwiseScorer, PrecomputedScores};

pub trait RankingMethod: Debug {
    fn name(&self) -> &'static str;

    /// Return at most `k` of `premise_ids`, most relevant first.
    ///
    /// `premise_ids` must not contain duplicates.
    fn rank(&self, claim_id: ClaimId, premise_ids: &[PremiseId], k: usize) -> Result<Ranking>;
}

/// Named constructor arguments shared by every method factory.
///
/// A factory rejects any field it does not consume.
#[derive(Debug, Clone, Default)]
pub struct MethodConfig {
    pub similarity: Option<Arc<dyn Similarity>>,
    pub claims: Option<Arc<ClaimStore>>,
    pub premises: Option<Arc<PremiseStore>>,
    pub scores: Option<Arc<PrecomputedScores>>,
    pub cluster_ratio: Option<f64>,
    pub cluster_representative: Option<String>,
    pub seed: Option<u64>,
}

impl MethodConfig {
    fn set_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.similarity.is_some() {
            fields.push("similarity");
        }
        if self.claims.is_some() {
            fields.push("claims");
        }
        if self.premises.is_some() {
            fields.push("premises");
        }
        if self.scores.is_some() {
            fields.push("scores");
        }
        if self.cluster_ratio.is_some() {
            fields.push("cluster_ratio");
        }
        if self.cluster_representative.is_some() {
            fields.push("cluster_representative");
        }
        if self.seed.is_some() {
            fields.push("seed");
        }
        fields
    }

    pub(crate) fn ensure_only(&self, method: &str, accepted: &[&str]) -> Result<()> {
        let unused: Vec<&str> = self
            .set_fields()
            .into_iter()
            .filter(|f| !accepted.contains(f))
            .collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(ArclusError::invalid(format!(
                "unused argument(s) for {method}: {}",
                unused.join(", ")
            )))
        }
    }

    pub(crate) fn cluster_ratio_or_default(&self) -> Result<f64> {
        let ratio = self.cluster_ratio.unwrap_or(DEFAULT_CLUSTER_RATIO);
        if ratio.is_nan() || ratio <= 0.0 {
            return Err(ArclusError::invalid(format!("cluster_ratio must be > 0, got {ratio}")));
        }
        Ok(ratio)
    }

    pub(crate) fn clusterer(&self) -> Arc<dyn Clusterer> {
        Arc::new(KMeans::with_seed(self.seed.unwrap_or(DEFAULT_SEED)))
    }

    pub(crate) fn representative_or_default(&self) -> String {
        self.cluster_representative
            .clone()
            .unwrap_or_else(|| RepresentativeMode::ClosestToCenter.as_str().to_string())
    }
}

pub(crate) fn require<T>(field: Option<T>, name: &str, method: &str) -> Result<T> {
    field.ok_or_else(|| ArclusError::invalid(format!("{method} requires `{name}`")))
}

pub(crate) fn ensure_unique(premise_ids: &[PremiseId]) -> Result<()> {
    let mut seen = HashSet::with_capacity(premise_ids.len());
    for id in premise_ids {
        if !seen.insert(id) {
            return Err(ArclusError::invalid(format!("duplicate premise id in pool: {id}")));
        }
    }
    Ok(())
}

type MethodFactory = fn(MethodConfig) -> Result<Box<dyn RankingMethod>>;

const METHODS: &[(&str, MethodFactory)] = &[
    ("zeroshotknn", ZeroShotKnn::from_config),
    ("zeroshotclusterknn", ZeroShotClusterKnn::from_config),
    ("learnedsimilarityknn", LearnedSimilarityKnn::from_config),
    ("learnedsimilarityclusterknn", LearnedSimilarityClusterKnn::from_config),
];

/// Lower-case and drop `_` / `-`, so `zero_shot_knn` and `ZeroShotKNN` match.
pub fn normalize_method_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect()
}

pub fn method_names() -> impl Iterator<Item = &'static str> {
    METHODS.iter().map(|(name, _)| *name)
}

pub fn method_by_name(name: &str, config: MethodConfig) -> Result<Box<dyn RankingMethod>> {
    let normalized = normalize_method_name(name);
    let (_, factory) = METHODS
        .iter()
        .find(|(candidate, _)| *candidate == normalized)
        .ok_or_else(|| ArclusError::UnknownName {
            kind: "ranking method",
            name: name.to_string(),
        })?;
    factory(config)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn registry_accepts_normalized_names() {
        for name in ["zero_shot_knn", "ZeroShotKNN", "zero-shot-knn"] {
            let method = method_by_name(name, zero_shot_config()).unwrap();
            assert_eq!(method.name(), "zero_shot_knn");
        }
        assert_eq!(method_names().count(), 4);
    }

    #[test]
    fn unknown_method_fails_at_construction() {
        let err = method_by_name("bm25", MethodConfig::default()).unwrap_err();
        assert!(matches!(err, ArclusError::UnknownName { kind: "ranking method", .. }));
    }

    #[test]
    fn unused_arguments_are_rejected() {
        let config = MethodConfig {
            cluster_ratio: Some(0.5),
            ..zero_shot_config()
        };
        let err = method_by_name("zero_shot_knn", config).unwrap_err();
        assert!(err.to_string().contains("cluster_ratio"), "{err}");
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let config = MethodConfig {
            similarity: None,
            ..zero_shot_config()
        };
        let err = method_by_name("zero_shot_cluster_knn", config).unwrap_err();
        assert!(err.to_string().contains("similarity"), "{err}");
    }

    #[test]
    fn duplicate_pool_entries_are_rejected() {
        assert!(ensure_unique(&ids(&["a", "b", "a"])).is_err());
        assert!(ensure_unique(&ids(&["a", "b"])).is_ok());
    }
}
