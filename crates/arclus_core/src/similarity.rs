//! Pairwise similarities between claim and premise representations.
//!
//! Every similarity maps a `Qc×D` claim matrix and a `Qp×D` premise matrix to
//! a `Qc×Qp` score matrix where higher means more relevant.

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::{ArclusError, Result};

pub const DEFAULT_LP_P: f32 = 2.0;
pub const DEFAULT_CSLS_K: usize = 1;

/// Smallest norm used when normalizing; zero vectors stay zero.
const NORM_EPS: f32 = 1e-12;

pub trait Similarity: Debug {
    fn sim(&self, claims: &DMatrix<f32>, premises: &DMatrix<f32>) -> Result<DMatrix<f32>>;
}

fn check_dims(claims: &DMatrix<f32>, premises: &DMatrix<f32>) -> Result<()> {
    if claims.ncols() != premises.ncols() {
        return Err(ArclusError::DimensionMismatch {
            expected: claims.ncols(),
            actual: premises.ncols(),
        });
    }
    Ok(())
}

/// `1 / (1 + ||c - p||_p)`, always in (0, 1].
#[derive(Debug, Clone, Copy)]
pub struct LpSimilarity {
    p: f32,
}

impl LpSimilarity {
    /// `p` may be `f32::INFINITY` for the max-norm.
    pub fn new(p: f32) -> Result<Self> {
        if p.is_nan() || p <= 0.0 {
            return Err(ArclusError::invalid(format!("Lp similarity needs p > 0, got {p}")));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    fn distance<'a>(&self, a: impl Iterator<Item = &'a f32>, b: impl Iterator<Item = &'a f32>) -> f32 {
        let diffs = a.zip(b).map(|(x, y)| (x - y).abs());
        if self.p.is_infinite() {
            diffs.fold(0.0f32, f32::max)
        } else if self.p == 1.0 {
            diffs.sum()
        } else if self.p == 2.0 {
            diffs.map(|d| d * d).sum::<f32>().sqrt()
        } else {
            diffs.map(|d| d.powf(self.p)).sum::<f32>().powf(1.0 / self.p)
        }
    }
}

impl Default for LpSimilarity {
    fn default() -> Self {
        Self { p: DEFAULT_LP_P }
    }
}

impl Similarity for LpSimilarity {
    fn sim(&self, claims: &DMatrix<f32>, premises: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        check_dims(claims, premises)?;
        Ok(DMatrix::from_fn(claims.nrows(), premises.nrows(), |i, j| {
            let d = self.distance(claims.row(i).iter(), premises.row(j).iter());
            1.0 / (1.0 + d)
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

/// L2-normalize every row.
pub fn normalize_rows(m: &DMatrix<f32>) -> DMatrix<f32> {
    let mut out = m.clone();
    for mut row in out.row_iter_mut() {
        let norm = row.norm().max(NORM_EPS);
        row /= norm;
    }
    out
}

impl Similarity for CosineSimilarity {
    fn sim(&self, claims: &DMatrix<f32>, premises: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        check_dims(claims, premises)?;
        Ok(normalize_rows(claims) * normalize_rows(premises).transpose())
    }
}

/// Cross-domain similarity local scaling on top of a base similarity.
///
/// `csls[i, j] = 2 sim[i, j] - avg(top_k(sim[i, :])) - avg(top_k(sim[:, j]))`
///
/// When an axis is shorter than `k`, its top-k takes the whole axis.
#[derive(Debug, Clone)]
pub struct CslsSimilarity {
    base: Arc<dyn Similarity>,
    k: usize,
}

impl CslsSimilarity {
    pub fn new(base: Arc<dyn Similarity>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(ArclusError::invalid("CSLS needs k > 0"));
        }
        Ok(Self { base, k })
    }
}

/// Mean of the `k` largest values (all of them if fewer than `k`).
fn mean_top_k(values: impl Iterator<Item = f32>, k: usize) -> f32 {
    let mut values: Vec<f32> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| b.total_cmp(a));
    let k = k.min(values.len());
    values[..k].iter().sum::<f32>() / k as f32
}

impl Similarity for CslsSimilarity {
    fn sim(&self, claims: &DMatrix<f32>, premises: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        let sim = self.base.sim(claims, premises)?;

        let row_means: Vec<f32> = sim
            .row_iter()
            .map(|row| mean_top_k(row.iter().copied(), self.k))
            .collect();
        let col_means: Vec<f32> = sim
            .column_iter()
            .map(|col| mean_top_k(col.iter().copied(), self.k))
            .collect();

        Ok(DMatrix::from_fn(sim.nrows(), sim.ncols(), |i, j| {
            2.0 * sim[(i, j)] - row_means[i] - col_means[j]
        }))
    }
}

/// Indices of the `k` largest scores, best first. Ties keep input order.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(k.min(scores.len()));
    order
}

/// Index of the largest score; the first one wins on ties.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    top_k_indices(scores, 1).into_iter().next()
}

/// Most similar premise rows for a single claim, best first.
pub fn most_similar(
    similarity: &dyn Similarity,
    claim: &DMatrix<f32>,
    premises: &DMatrix<f32>,
    k: usize,
) -> Result<Vec<usize>> {
    let sim = similarity.sim(claim, premises)?;
    if sim.nrows() != 1 {
        return Err(ArclusError::invalid(format!(
            "expected a single claim row, got {}",
            sim.nrows()
        )));
    }
    let scores: Vec<f32> = sim.row(0).iter().copied().collect();
    Ok(top_k_indices(&scores, k))
}

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub p: f32,
    pub csls_k: usize,
    /// Base similarity wrapped by `csls`.
    pub csls_base: String,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            p: DEFAULT_LP_P,
            csls_k: DEFAULT_CSLS_K,
            csls_base: "cosine".to_string(),
        }
    }
}

fn normalize_similarity_name(name: &str) -> String {
    let name: String = name
        .to_lowercase()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect();
    match name.strip_suffix("similarity") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => name,
    }
}

pub fn similarity_by_name(name: &str, config: &SimilarityConfig) -> Result<Arc<dyn Similarity>> {
    let similarity: Arc<dyn Similarity> = match normalize_similarity_name(name).as_str() {
        "lp" => Arc::new(LpSimilarity::new(config.p)?),
        "l1" => Arc::new(LpSimilarity::new(1.0)?),
        "l2" => Arc::new(LpSimilarity::new(2.0)?),
        "cos" | "cosine" => Arc::new(CosineSimilarity),
        "csls" => {
            if normalize_similarity_name(&config.csls_base) == "csls" {
                return Err(ArclusError::invalid("CSLS cannot wrap itself"));
            }
            let base = similarity_by_name(&config.csls_base, config)?;
            Arc::new(CslsSimilarity::new(base, config.csls_k)?)
        }
        _ => {
            return Err(ArclusError::UnknownName {
                kind: "similarity",
                name: name.to_string(),
            })
        }
    };
    Ok(similarity)
}
