use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ArclusError, Result};
use crate::ground_truth::GroundTruth;
use crate::metrics::ndcg_score;
use crate::model::ClaimId;
use crate::ranking::RankingMethod;

pub const DEFAULT_KS: [usize; 2] = [5, 10];

/// How claims without any relevant ground truth enter the per-k mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroIdcgPolicy {
    /// Leave them out of the mean.
    #[default]
    Exclude,
    /// Count them as an nDCG of 0.
    Include,
}

impl ZeroIdcgPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclude => "exclude",
            Self::Include => "include",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalOptions {
    pub pad: bool,
    pub zero_idcg: ZeroIdcgPolicy,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            pad: true,
            zero_idcg: ZeroIdcgPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub claim_id: ClaimId,
    pub k: usize,
    pub ndcg: f64,
    /// Number of premises the method returned.
    pub returned: usize,
    /// The claim has no relevant ground truth, so its nDCG is 0 by definition.
    pub degenerate: bool,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KSummary {
    pub k: usize,
    pub mean_ndcg: f64,
    /// Claims contributing to the mean.
    pub evaluated: usize,
    /// Degenerate claims left out under [`ZeroIdcgPolicy::Exclude`].
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub outcomes: Vec<ClaimOutcome>,
    pub summaries: Vec<KSummary>,
}

impl EvalSummary {
    pub fn mean_ndcg(&self, k: usize) -> Option<f64> {
        self.summaries
            .iter()
            .find(|s| s.k == k)
            .map(|s| s.mean_ndcg)
    }
}

fn summarize(outcomes: &[ClaimOutcome], k: usize, policy: ZeroIdcgPolicy) -> KSummary {
    let for_k = outcomes.iter().filter(|o| o.k == k);
    let (included, skipped): (Vec<&ClaimOutcome>, Vec<&ClaimOutcome>) = match policy {
        ZeroIdcgPolicy::Include => (for_k.collect(), Vec::new()),
        ZeroIdcgPolicy::Exclude => for_k.partition(|o| !o.degenerate),
    };

    let evaluated = included.len();
    let mean_ndcg = if evaluated == 0 {
        0.0
    } else {
        included.iter().map(|o| o.ndcg).sum::<f64>() / evaluated as f64
    };

    KSummary {
        k,
        mean_ndcg,
        evaluated,
        skipped: skipped.len(),
    }
}

/// Rank every claim's candidate pool at each cut-off in `ks` and score the
/// rankings against the ground truth.
///
/// Every cut-off must be positive and appear once.
pub fn evaluate_ranking_method(
    method: &dyn RankingMethod,
    ground_truth: &GroundTruth,
    ks: &[usize],
    options: &EvalOptions,
) -> Result<EvalSummary> {
    for (i, k) in ks.iter().enumerate() {
        if *k == 0 || ks[..i].contains(k) {
            return Err(ArclusError::invalid(format!(
                "cut-offs must be positive and distinct, got {ks:?}"
            )));
        }
    }

    let mut outcomes = Vec::with_capacity(ground_truth.len() * ks.len());

    for claim in ground_truth.claims() {
        let ideal = claim.ideal_relevances();
        let degenerate = !claim.has_relevant();
        if degenerate {
            warn!(claim_id = claim.claim_id, "claim has no relevant ground truth");
        }

        for &k in ks {
            let start = Instant::now();
            let ranking = method.rank(claim.claim_id, &claim.premise_ids, k)?;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            let predicted = claim.predicted_relevances(&ranking);
            outcomes.push(ClaimOutcome {
                claim_id: claim.claim_id,
                k,
                ndcg: ndcg_score(&predicted, &ideal, k, options.pad),
                returned: ranking.len(),
                degenerate,
                latency_ms,
            });
        }
    }

    let summaries: Vec<KSummary> = ks
        .iter()
        .map(|&k| summarize(&outcomes, k, options.zero_idcg))
        .collect();
    for s in &summaries {
        info!(
            method = method.name(),
            k = s.k,
            mean_ndcg = s.mean_ndcg,
            evaluated = s.evaluated,
            skipped = s.skipped,
            "evaluation finished"
        );
    }

    Ok(EvalSummary {
        outcomes,
        summaries,
    })
}
