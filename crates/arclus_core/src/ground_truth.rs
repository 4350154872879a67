//! Ground-truth premise clusters and their relevance grades.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::info;

use crate::error::{ArclusError, Result};
use crate::model::{Assignment, ClaimId, PremiseId};

/// Candidate pool and annotations for one claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimGroundTruth {
    pub claim_id: ClaimId,
    /// Candidate pool in file order.
    pub premise_ids: Vec<PremiseId>,
    relevance: HashMap<PremiseId, f64>,
    cluster: HashMap<PremiseId, i64>,
}

impl ClaimGroundTruth {
    fn new(claim_id: ClaimId) -> Self {
        Self {
            claim_id,
            ..Self::default()
        }
    }

    /// Grade of every labelled cluster, keyed by ascending label: the highest
    /// relevance among its members.
    pub fn cluster_grades(&self) -> BTreeMap<i64, f64> {
        let mut grades: BTreeMap<i64, f64> = BTreeMap::new();
        for (premise, label) in &self.cluster {
            let rel = self.relevance.get(premise).copied().unwrap_or(0.0);
            grades
                .entry(*label)
                .and_modify(|g| *g = g.max(rel))
                .or_insert(rel);
        }
        grades
    }

    /// Best achievable relevance sequence: one entry per cluster, descending.
    pub fn ideal_relevances(&self) -> Vec<f64> {
        let mut ideal: Vec<f64> = self.cluster_grades().into_values().collect();
        ideal.sort_by(|a, b| b.total_cmp(a));
        ideal
    }

    /// Relevance of each ranked premise. A premise earns its cluster's grade
    /// the first time that cluster appears; unlabelled premises and repeats of
    /// an already credited cluster earn 0.
    pub fn predicted_relevances(&self, ranking: &[PremiseId]) -> Vec<f64> {
        let grades = self.cluster_grades();
        let mut credited = HashSet::new();
        ranking
            .iter()
            .map(|premise| match self.cluster.get(premise) {
                Some(label) if credited.insert(*label) => grades[label],
                _ => 0.0,
            })
            .collect()
    }

    /// Whether any cluster carries a positive grade.
    pub fn has_relevant(&self) -> bool {
        self.cluster_grades().values().any(|g| *g > 0.0)
    }
}

/// Ground truth for every evaluated claim, iterated by ascending claim ID.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    claims: BTreeMap<ClaimId, ClaimGroundTruth>,
}

impl GroundTruth {
    pub fn from_assignments(assignments: impl IntoIterator<Item = Assignment>) -> Result<Self> {
        let mut claims: BTreeMap<ClaimId, ClaimGroundTruth> = BTreeMap::new();
        for a in assignments {
            let entry = claims
                .entry(a.claim_id)
                .or_insert_with(|| ClaimGroundTruth::new(a.claim_id));
            if entry.relevance.contains_key(&a.premise_id) {
                return Err(ArclusError::invalid(format!(
                    "premise {} assigned twice to claim {}",
                    a.premise_id, a.claim_id
                )));
            }
            entry.premise_ids.push(a.premise_id.clone());
            if let Some(label) = a.premise_cluster {
                entry.cluster.insert(a.premise_id.clone(), label);
            }
            entry.relevance.insert(a.premise_id, a.relevance);
        }
        Ok(Self { claims })
    }

    /// Read assignments from a `.tsv` (tab) or any other (comma) delimited file.
    pub fn load(path: &Path) -> Result<Self> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") => b'\t',
            _ => b',',
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        let assignments = reader
            .deserialize()
            .collect::<std::result::Result<Vec<Assignment>, csv::Error>>()?;

        let ground_truth = Self::from_assignments(assignments)?;
        info!(
            path = %path.display(),
            claims = ground_truth.len(),
            "loaded ground truth assignments"
        );
        Ok(ground_truth)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn get(&self, claim_id: ClaimId) -> Result<&ClaimGroundTruth> {
        self.claims
            .get(&claim_id)
            .ok_or_else(|| ArclusError::key_not_found(format!("claim {claim_id}")))
    }

    pub fn claims(&self) -> impl Iterator<Item = &ClaimGroundTruth> {
        self.claims.values()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn row(claim_id: ClaimId, premise: &str, relevance: f64, cluster: Option<i64>) -> Assignment {
        Assignment {
            claim_id,
            premise_id: premise.to_string(),
            relevance,
            premise_cluster: cluster,
        }
    }

    fn sample() -> GroundTruth {
        GroundTruth::from_assignments(vec![
            row(1, "p1", 3.0, Some(2)),
            row(1, "p2", 1.0, Some(2)),
            row(1, "p3", 2.0, Some(0)),
            row(1, "p4", 5.0, None),
            row(1, "p5", 0.0, Some(7)),
        ])
        .unwrap()
    }

    #[test]
    fn ideal_takes_best_grade_per_cluster() {
        let gt = sample();
        let claim = gt.get(1).unwrap();
        let grades: Vec<(i64, f64)> = claim.cluster_grades().into_iter().collect();
        assert_eq!(grades, vec![(0, 2.0), (2, 3.0), (7, 0.0)]);
        assert_eq!(claim.ideal_relevances(), vec![3.0, 2.0, 0.0]);
        assert!(claim.has_relevant());
    }

    #[test]
    fn predicted_relevance_credits_each_cluster_once() {
        let gt = sample();
        let claim = gt.get(1).unwrap();
        let ranking: Vec<PremiseId> = ["p2", "p1", "p4", "p3", "zz"].iter().map(|s| s.to_string()).collect();
        assert_eq!(claim.predicted_relevances(&ranking), vec![3.0, 0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn pool_keeps_file_order() {
        let gt = sample();
        assert_eq!(gt.get(1).unwrap().premise_ids, vec!["p1", "p2", "p3", "p4", "p5"]);
        assert!(matches!(gt.get(2), Err(ArclusError::KeyNotFound(_))));
    }

    #[test]
    fn duplicate_assignment_is_rejected() {
        let err = GroundTruth::from_assignments(vec![row(1, "p1", 1.0, None), row(1, "p1", 2.0, None)]);
        assert!(err.is_err());
    }

    #[test]
    fn loads_tsv_with_float_and_missing_labels() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "claim_id\tpremise_id\trelevance\tpremise_cluster").unwrap();
        writeln!(file, "4\tp1\t2\t1.0").unwrap();
        writeln!(file, "4\tp2\t1\t").unwrap();
        writeln!(file, "3\tp9\t0\t5").unwrap();
        file.flush().unwrap();

        let gt = GroundTruth::load(file.path()).unwrap();
        let ids: Vec<ClaimId> = gt.claims().map(|c| c.claim_id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(gt.get(4).unwrap().ideal_relevances(), vec![2.0]);
        assert!(!gt.get(3).unwrap().has_relevant());
    }
}
