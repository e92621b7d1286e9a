//! Conversion of per-row kNN distances into the joint probability matrix P.
//!
//! Each row is fitted with a Gaussian kernel whose precision is found by a
//! bounded binary search so that the row entropy matches the target
//! perplexity. Rows are then symmetrized into the joint distribution used
//! for the whole optimization; P is never renormalized afterwards.

use ndarray::Array2;
use tracing::debug;

use crate::types::NeighborTable;

/// Lower clamp applied to every raw per-row probability before
/// normalization.
pub const MIN_POSSIBLE_PROB: f64 = 1e-9;

/// Entropy terms with probability at or below this are skipped so the
/// search never evaluates ln(0).
const ENTROPY_FLOOR: f64 = 1e-7;

/// Trial budget of the per-row precision search. Exhausting it is a
/// convergence policy, not an error: the last evaluated row is kept.
const MAX_TRIALS: usize = 50;

/// Default tolerance on |row entropy − ln(perplexity)|.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Builds the symmetric joint probability matrix from a kNN table.
///
/// The result is dense N×N but only entries on the symmetrized kNN
/// support are nonzero. Total mass sums to 1. Rows whose only neighbor
/// is the row itself calibrate to zero, which keeps single-point inputs
/// well defined.
#[tracing::instrument(skip(neighbors), name = "perplexity_calibration", fields(rows = neighbors.len()))]
pub fn calibrate(neighbors: &NeighborTable, perplexity: f64, tolerance: f64) -> Array2<f64> {
    let n = neighbors.len();
    let target = perplexity.ln();
    let mut raw = Array2::<f64>::zeros((n, n));
    let mut probs: Vec<f64> = Vec::new();
    let mut trials_spent = 0usize;

    for (i, row) in neighbors.iter().enumerate() {
        probs.clear();
        probs.resize(row.len(), 0.0);

        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..MAX_TRIALS {
            trials_spent += 1;

            let mut sum = 0.0;
            for (slot, nb) in probs.iter_mut().zip(row.iter()) {
                *slot = if nb.index == i {
                    0.0
                } else {
                    (-nb.dist * beta).exp().max(MIN_POSSIBLE_PROB)
                };
                sum += *slot;
            }
            if sum > 0.0 {
                for p in probs.iter_mut() {
                    *p /= sum;
                }
            }

            let entropy: f64 = probs
                .iter()
                .filter(|&&p| p > ENTROPY_FLOOR)
                .map(|&p| -p * p.ln())
                .sum();

            if (entropy - target).abs() < tolerance {
                break;
            }
            if entropy > target {
                // Too flat: sharpen the kernel.
                beta_min = beta;
                beta = if beta_max.is_finite() {
                    0.5 * (beta + beta_max)
                } else {
                    beta * 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_finite() {
                    0.5 * (beta + beta_min)
                } else {
                    beta * 0.5
                };
            }
        }

        for (nb, &p) in row.iter().zip(probs.iter()) {
            raw[[i, nb.index]] = p;
        }
    }

    // Symmetrize into the joint distribution over directed kNN pairs.
    let scale = 1.0 / (2.0 * n as f64);
    let mut joint = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let v = (raw[[i, j]] + raw[[j, i]]) * scale;
            joint[[i, j]] = v;
            joint[[j, i]] = v;
        }
    }

    debug!(
        rows = n,
        mean_trials = trials_spent as f64 / n.max(1) as f64,
        "perplexity calibration finished"
    );
    joint
}
