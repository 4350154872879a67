use std::fmt::Debug;

use nalgebra::{DMatrix, RowDVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{ArclusError, Result};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CLUSTER_RATIO: f64 = 0.5;

/// Partition of a point set into labelled clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster label per input row, in `[0, n_clusters)`.
    pub labels: Vec<usize>,
    /// One centroid per cluster (`n_clusters × D`).
    pub centroids: DMatrix<f32>,
}

impl Clustering {
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Row indices assigned to `label`, in input order.
    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == label)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn centroid(&self, label: usize) -> DMatrix<f32> {
        self.centroids.rows(label, 1).into_owned()
    }
}

pub trait Clusterer: Debug {
    /// Group the rows of `points` into `n_clusters` clusters. Some clusters may
    /// end up empty when points coincide.
    fn cluster(&self, points: &DMatrix<f32>, n_clusters: usize) -> Result<Clustering>;
}

/// Cluster count for a candidate pool: `round(ratio * n)` clamped to `[k, n]`.
///
/// Rounds half to even.
pub fn num_clusters(ratio: f64, num_premises: usize, k: usize) -> usize {
    let n_clusters = (ratio * num_premises as f64).round_ties_even().max(0.0) as usize;
    n_clusters.max(k).min(num_premises)
}

#[derive(Debug, Clone)]
pub struct KMeansConfig {
    pub seed: u64,
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this.
    pub tolerance: f32,
    /// Independent k-means++ restarts; the lowest inertia wins.
    pub n_init: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            max_iterations: 300,
            tolerance: 1e-4,
            n_init: 10,
        }
    }
}

/// Lloyd's k-means with k-means++ seeding.
#[derive(Debug, Clone, Default)]
pub struct KMeans {
    config: KMeansConfig,
}

struct Run {
    labels: Vec<usize>,
    centroids: DMatrix<f32>,
    inertia: f32,
    iterations: usize,
}

fn squared_distance(a: &[f32], b: impl Iterator<Item = f32>) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Result<Self> {
        if config.max_iterations == 0 {
            return Err(ArclusError::invalid("k-means needs max_iterations > 0"));
        }
        if config.n_init == 0 {
            return Err(ArclusError::invalid("k-means needs n_init > 0"));
        }
        if config.tolerance.is_nan() || config.tolerance < 0.0 {
            return Err(ArclusError::invalid("k-means tolerance must be >= 0"));
        }
        Ok(Self { config })
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            config: KMeansConfig {
                seed,
                ..KMeansConfig::default()
            },
        }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    fn nearest(rows: &[Vec<f32>], centroids: &DMatrix<f32>, point: usize) -> (usize, f32) {
        let mut best = (0, f32::INFINITY);
        for (c, centroid) in centroids.row_iter().enumerate() {
            let d = squared_distance(&rows[point], centroid.iter().copied());
            if d < best.1 {
                best = (c, d);
            }
        }
        best
    }

    /// k-means++: each next seed is drawn with probability proportional to its
    /// squared distance from the closest seed chosen so far.
    fn init_centroids(rows: &[Vec<f32>], dim: usize, k: usize, rng: &mut StdRng) -> DMatrix<f32> {
        let n = rows.len();
        let mut chosen = Vec::with_capacity(k);
        chosen.push(rng.gen_range(0..n));

        let mut min_dist: Vec<f32> = rows
            .iter()
            .map(|r| squared_distance(r, rows[chosen[0]].iter().copied()))
            .collect();

        while chosen.len() < k {
            let total: f32 = min_dist.iter().sum();
            let next = if total <= 0.0 {
                // Every point sits on a seed already; duplicates give empty clusters.
                rng.gen_range(0..n)
            } else {
                let mut target = rng.gen::<f32>() * total;
                let mut pick = n - 1;
                for (i, d) in min_dist.iter().enumerate() {
                    if target < *d {
                        pick = i;
                        break;
                    }
                    target -= d;
                }
                pick
            };
            chosen.push(next);
            for (i, r) in rows.iter().enumerate() {
                let d = squared_distance(r, rows[next].iter().copied());
                if d < min_dist[i] {
                    min_dist[i] = d;
                }
            }
        }

        let mut data = Vec::with_capacity(k * dim);
        for idx in chosen {
            data.extend_from_slice(&rows[idx]);
        }
        DMatrix::from_row_slice(k, dim, &data)
    }

    fn run_once(&self, rows: &[Vec<f32>], dim: usize, k: usize, rng: &mut StdRng) -> Run {
        let n = rows.len();
        let mut centroids = Self::init_centroids(rows, dim, k, rng);
        let mut labels = vec![0usize; n];
        let mut iterations = 0;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;
            for (i, label) in labels.iter_mut().enumerate() {
                *label = Self::nearest(rows, &centroids, i).0;
            }

            let mut sums = DMatrix::<f32>::zeros(k, dim);
            let mut counts = vec![0usize; k];
            for (i, label) in labels.iter().enumerate() {
                counts[*label] += 1;
                let mut row = sums.row_mut(*label);
                row += RowDVector::from_row_slice(&rows[i]);
            }

            let mut shift = 0.0f32;
            for c in 0..k {
                // Empty clusters keep their previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                let updated = sums.row(c) / counts[c] as f32;
                shift = shift.max((&updated - centroids.row(c)).norm());
                centroids.set_row(c, &updated);
            }

            if shift <= self.config.tolerance {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, label) in labels.iter_mut().enumerate() {
            let (c, d) = Self::nearest(rows, &centroids, i);
            *label = c;
            inertia += d;
        }

        Run {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }
}

impl Clusterer for KMeans {
    fn cluster(&self, points: &DMatrix<f32>, n_clusters: usize) -> Result<Clustering> {
        let n = points.nrows();
        if n == 0 {
            return Err(ArclusError::invalid("cannot cluster an empty point set"));
        }
        if n_clusters == 0 || n_clusters > n {
            return Err(ArclusError::invalid(format!(
                "n_clusters must be in [1, {n}], got {n_clusters}"
            )));
        }

        let dim = points.ncols();
        let rows: Vec<Vec<f32>> = points
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut best: Option<Run> = None;
        for _ in 0..self.config.n_init {
            let run = self.run_once(&rows, dim, n_clusters, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| ArclusError::invalid("k-means produced no run"))?;

        debug!(
            points = n,
            n_clusters,
            iterations = best.iterations,
            inertia = best.inertia,
            "k-means finished"
        );

        Ok(Clustering {
            labels: best.labels,
            centroids: best.centroids,
        })
    }
}
