use std::sync::Arc;

use tracing::debug;

use super::{ensure_unique, require, MethodConfig, RankingMethod};
use crate::error::Result;
use crate::model::{ClaimId, PremiseId, Ranking};
use crate::similarity::{most_similar, Similarity};
use crate::storage::{ClaimStore, PremiseStore};

/// Rank premises by similarity of pre-computed representations to the claim.
#[derive(Debug, Clone)]
pub struct ZeroShotKnn {
    similarity: Arc<dyn Similarity>,
    claims: Arc<ClaimStore>,
    premises: Arc<PremiseStore>,
}

impl ZeroShotKnn {
    pub const NAME: &'static str = "zero_shot_knn";

    pub fn new(
        similarity: Arc<dyn Similarity>,
        claims: Arc<ClaimStore>,
        premises: Arc<PremiseStore>,
    ) -> Self {
        Self {
            similarity,
            claims,
            premises,
        }
    }

    pub fn from_config(config: MethodConfig) -> Result<Box<dyn RankingMethod>> {
        config.ensure_only(Self::NAME, &["similarity", "claims", "premises"])?;
        Ok(Box::new(Self::new(
            require(config.similarity, "similarity", Self::NAME)?,
            require(config.claims, "claims", Self::NAME)?,
            require(config.premises, "premises", Self::NAME)?,
        )))
    }
}

impl RankingMethod for ZeroShotKnn {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rank(&self, claim_id: ClaimId, premise_ids: &[PremiseId], k: usize) -> Result<Ranking> {
        ensure_unique(premise_ids)?;
        let claim = self.claims.row(&claim_id)?;
        let premises = self.premises.stack(premise_ids)?;
        if k == 0 || premise_ids.is_empty() {
            return Ok(Vec::new());
        }

        let top = most_similar(self.similarity.as_ref(), &claim, &premises, k)?;
        debug!(claim_id, pool = premise_ids.len(), k, "knn ranking");
        Ok(top.into_iter().map(|i| premise_ids[i].clone()).collect())
    }
}
