//! Ranking quality metrics.
//!
//! nDCG compares the graded relevance of a predicted ranking against the
//! best achievable ordering of the ground truth:
//!
//! ```text
//! DCG@k  = sum_{i=1..k} rel_i / log2(i + 1)
//! nDCG@k = DCG@k / IDCG@k        (0 when IDCG@k = 0)
//! ```

use nalgebra::DMatrix;

use crate::error::{ArclusError, Result};

/// Discounted cumulative gain with linear gains.
pub fn dcg(relevances: &[f64]) -> f64 {
    relevances
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / ((i + 2) as f64).log2())
        .sum()
}

/// Normalized DCG of `predicted` against `ideal` at cut-off `k`.
///
/// With `pad`, both sequences are scored at depth `k` and missing predicted
/// positions count as zero relevance, which penalizes short rankings. Without
/// it the depth shrinks to the predicted length, so a short ranking is only
/// compared against an equally short ideal.
pub fn ndcg_score(predicted: &[f64], ideal: &[f64], k: usize, pad: bool) -> f64 {
    let depth = if pad { k } else { k.min(predicted.len()) };

    let mut ideal_sorted = ideal.to_vec();
    ideal_sorted.sort_by(|a, b| b.total_cmp(a));

    let actual = dcg(&predicted[..depth.min(predicted.len())]);
    let best = dcg(&ideal_sorted[..depth.min(ideal_sorted.len())]);

    if best <= 0.0 {
        return 0.0;
    }
    actual / best
}

/// Fraction of rows whose predicted class matches the label.
///
/// A single probability column is thresholded at 0.5; wider matrices use the
/// row argmax.
pub fn accuracy(predictions: &DMatrix<f32>, labels: &[usize]) -> Result<f64> {
    if predictions.nrows() != labels.len() {
        return Err(ArclusError::invalid(format!(
            "{} predictions for {} labels",
            predictions.nrows(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Ok(0.0);
    }

    let correct = predictions
        .row_iter()
        .zip(labels)
        .filter(|(row, label)| {
            let predicted = if row.len() == 1 {
                usize::from(row[0] >= 0.5)
            } else {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
                        if *v > best.1 {
                            (i, *v)
                        } else {
                            best
                        }
                    })
                    .0
            };
            predicted == **label
        })
        .count();

    Ok(correct as f64 / labels.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndcg_matches_hand_computed_value() {
        let predicted = [3.0, 2.0, 3.0, 0.0, 2.0];
        let ideal = [3.0, 3.0, 2.0, 2.0, 0.0];
        assert!((dcg(&predicted) - 6.535565121611999).abs() < 1e-12);
        assert!((dcg(&ideal) - 6.754142376861158).abs() < 1e-12);
        let score = ndcg_score(&predicted, &ideal, 5, true);
        assert!((score - 0.9676380444691279).abs() < 1e-12);
    }

    #[test]
    fn perfect_ranking_scores_one() {
        let rel = [3.0, 2.0, 1.0];
        assert!((ndcg_score(&rel, &rel, 3, true) - 1.0).abs() < 1e-12);
        // The ideal is sorted internally.
        assert!((ndcg_score(&rel, &[1.0, 3.0, 2.0], 3, true) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_ideal_gain_scores_zero() {
        assert_eq!(ndcg_score(&[1.0, 2.0], &[0.0, 0.0], 2, true), 0.0);
        assert_eq!(ndcg_score(&[], &[], 5, false), 0.0);
    }

    #[test]
    fn padding_penalizes_short_rankings() {
        let predicted = [2.0, 1.0];
        let ideal = [2.0, 2.0, 1.0, 1.0];

        let padded = ndcg_score(&predicted, &ideal, 4, true);
        let unpadded = ndcg_score(&predicted, &ideal, 4, false);

        // padded: DCG = 2 + 1/log2(3); IDCG over 4 positions.
        let expected_dcg = 2.0 + 1.0 / 3f64.log2();
        let expected_padded = expected_dcg / dcg(&ideal);
        let expected_unpadded = expected_dcg / dcg(&ideal[..2]);
        assert!((padded - expected_padded).abs() < 1e-12);
        assert!((unpadded - expected_unpadded).abs() < 1e-12);
        assert!(padded < unpadded);
    }

    #[test]
    fn only_first_k_entries_count() {
        let score = ndcg_score(&[0.0, 0.0, 5.0], &[5.0, 0.0, 0.0], 2, true);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn accuracy_thresholds_or_argmaxes() {
        let probs = DMatrix::from_row_slice(4, 1, &[0.9, 0.2, 0.5, 0.4]);
        assert!((accuracy(&probs, &[1, 0, 1, 1]).unwrap() - 0.75).abs() < 1e-12);

        let logits = DMatrix::from_row_slice(3, 3, &[0.1, 0.7, 0.2, 2.0, 1.0, 0.0, 0.0, 0.0, 3.0]);
        assert!((accuracy(&logits, &[1, 0, 0]).unwrap() - 2.0 / 3.0).abs() < 1e-12);

        assert!(accuracy(&logits, &[1]).is_err());
    }
}
