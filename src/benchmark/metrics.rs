//! Score-based recall metrics.
//!
//! A candidate entry counts as a hit when its *score* occurs among the scores
//! of the ground-truth prefix, regardless of primary key. Ties between
//! equidistant documents therefore never cost recall.
//!
//! | Quantity | Formula |
//! |----------|---------|
//! | mismatches@k | \|{c ∈ C[..k] : score(c) ∉ scores(G[..k])}\| |
//! | recall@k | (k - mismatches@k) / k |

use crate::persistence::format::round_to;
use crate::persistence::{GtRecord, Neighbor, ScoreMatch};

/// Entries of `candidate[..k]` whose score is absent from `truth[..k]`.
pub fn mismatched(
    candidate: &GtRecord,
    truth: &GtRecord,
    k: usize,
    mode: ScoreMatch,
) -> Vec<Neighbor> {
    candidate.filter_score_not_in(truth, k, mode, |_| {})
}

pub fn count_mismatches(
    candidate: &GtRecord,
    truth: &GtRecord,
    k: usize,
    mode: ScoreMatch,
) -> usize {
    mismatched(candidate, truth, k, mode).len()
}

/// `(k - mismatches) / k`, in `[0, 1]`. Zero for `k == 0`.
pub fn recall_from_mismatches(k: usize, mismatches: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    (k - mismatches.min(k)) as f64 / k as f64
}

/// Compute recall@k of `candidate` against `truth`.
///
/// # Returns
///
/// Recall value in [0.0, 1.0]
pub fn recall_at_k(candidate: &GtRecord, truth: &GtRecord, k: usize, mode: ScoreMatch) -> f64 {
    recall_from_mismatches(k, count_mismatches(candidate, truth, k, mode))
}

/// Compute recall at multiple k values.
pub fn recall_curve(
    candidate: &GtRecord,
    truth: &GtRecord,
    k_values: &[usize],
    mode: ScoreMatch,
) -> Vec<(usize, f64)> {
    k_values
        .iter()
        .map(|&k| (k, recall_at_k(candidate, truth, k, mode)))
        .collect()
}

/// Mean of `values`, zero when empty.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// A fraction in `[0, 1]` as a percentage rounded to `digits` decimals.
pub fn as_percent(fraction: f64, digits: u32) -> f64 {
    round_to(fraction * 100.0, digits)
}
