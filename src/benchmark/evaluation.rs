//! Recall evaluation against a search oracle.
//!
//! Two drivers:
//!
//! | Driver | Ground truth | Output |
//! |--------|--------------|--------|
//! | [`RecallEvaluator::run`] | exact search per query | windowed summary rows |
//! | [`diff_ground_truth`] | stored [`GroundTruth`] file | per-query percent, consistency |
//!
//! # Windows
//!
//! The recall driver splits `samples` queries into windows of
//! `samples / 20` (or 1 when `samples <= 50`). Every query of a window runs
//! on its own worker; windows run one after another. A single failed query
//! discards its whole window and stops the run; earlier windows stay
//! aggregated.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Range;

use rayon::prelude::*;
use serde::Serialize;

use super::metrics::{self, as_percent};
use super::report::{header_line, summary_line, IgnoreMismatches, MismatchHandler, FINAL_BANNER};
use super::traits::{QuerySource, SearchOracle};
use crate::config::{DEFAULT_TOPK, REPORT_PRECISION, WINDOW_DIVISOR, WINDOW_THRESHOLD};
use crate::error::{EvalError, QueryFailure, Result};
use crate::persistence::{GroundTruth, GtRecord, ScoreMatch};

static IGNORE: IgnoreMismatches = IgnoreMismatches;

/// Window size for `total` queries.
pub fn window_size(total: usize) -> usize {
    if total > WINDOW_THRESHOLD {
        total / WINDOW_DIVISOR
    } else {
        1
    }
}

/// Number of queries actually evaluated for a requested sample count.
pub(crate) fn resolve_samples(requested: usize, available: usize) -> usize {
    if requested > available {
        tracing::warn!(
            requested,
            available,
            "sample count exceeds available queries, clamping"
        );
        available
    } else {
        requested
    }
}

/// Recall evaluator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Sorted, de-duplicated k values.
    pub topk: Vec<usize>,
    /// Number of queries to evaluate, starting at index 0.
    pub samples: usize,
    pub score_match: ScoreMatch,
    /// Upper bound on workers per window. `None` sizes the pool to the window.
    pub max_workers: Option<usize>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            topk: vec![200],
            samples: 1,
            score_match: ScoreMatch::Exact,
            max_workers: None,
        }
    }
}

impl EvaluatorConfig {
    /// Config for `topk` (sorted and de-duplicated here) and `samples`.
    pub fn new(mut topk: Vec<usize>, samples: usize) -> Self {
        topk.sort_unstable();
        topk.dedup();
        Self {
            topk,
            samples,
            ..Default::default()
        }
    }

    /// Parse a comma-separated k list such as `"1,10,100"`.
    pub fn parse_topk(list: &str) -> Result<Vec<usize>> {
        let mut topk = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| EvalError::InvalidConfig(format!("invalid k '{s}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        topk.sort_unstable();
        topk.dedup();
        if topk.is_empty() {
            return Err(EvalError::InvalidConfig(format!(
                "empty k list '{list}' (default is {DEFAULT_TOPK})"
            )));
        }
        if topk[0] == 0 {
            return Err(EvalError::InvalidConfig("k must be positive".into()));
        }
        Ok(topk)
    }

    pub fn with_score_match(mut self, score_match: ScoreMatch) -> Self {
        self.score_match = score_match;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Largest k, the number of results requested from the oracle.
    pub fn max_topk(&self) -> usize {
        self.topk.last().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topk.is_empty() {
            return Err(EvalError::InvalidConfig("k list is empty".into()));
        }
        if self.topk.contains(&0) {
            return Err(EvalError::InvalidConfig("k must be positive".into()));
        }
        if self.topk.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EvalError::InvalidConfig(
                "k list must be strictly increasing".into(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(EvalError::InvalidConfig("max_workers must be positive".into()));
        }
        if let ScoreMatch::Tolerant { rel_tol } = self.score_match {
            if !(rel_tol.is_finite() && rel_tol >= 0.0) {
                return Err(EvalError::InvalidConfig(format!(
                    "invalid tolerance {rel_tol}"
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a windowed recall run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallReport {
    pub topk: Vec<usize>,
    pub search_param: u32,
    /// Per-query recall, one value per k, for every aggregated query.
    pub per_query: BTreeMap<usize, Vec<f64>>,
    /// True when every requested query was aggregated.
    pub completed: bool,
    /// The window whose failure stopped the run.
    pub failed_window: Option<Range<usize>>,
}

impl RecallReport {
    pub fn new(topk: Vec<usize>, search_param: u32) -> Self {
        Self {
            topk,
            search_param,
            per_query: BTreeMap::new(),
            completed: false,
            failed_window: None,
        }
    }

    /// Aggregate the recalls of one query.
    pub fn record(&mut self, query: usize, recalls: Vec<f64>) {
        self.per_query.insert(query, recalls);
    }

    /// Number of aggregated queries.
    pub fn samples(&self) -> usize {
        self.per_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_query.is_empty()
    }

    /// Mean recall per k over all aggregated queries.
    pub fn mean_recall(&self) -> Vec<f64> {
        (0..self.topk.len())
            .map(|i| metrics::mean(self.per_query.values().filter_map(|r| r.get(i).copied())))
            .collect()
    }

    /// Mean recall per k as percentages rounded for display.
    pub fn percentages(&self) -> Vec<f64> {
        self.mean_recall()
            .into_iter()
            .map(|m| as_percent(m, REPORT_PRECISION))
            .collect()
    }

    pub fn summary_line(&self) -> String {
        summary_line(self.samples(), self.search_param, &self.percentages())
    }
}

/// Concurrent recall@k evaluator.
pub struct RecallEvaluator<'a, O: ?Sized, Q: ?Sized> {
    oracle: &'a O,
    queries: &'a Q,
    config: EvaluatorConfig,
    handler: &'a dyn MismatchHandler,
}

impl<'a, O, Q> RecallEvaluator<'a, O, Q>
where
    O: SearchOracle + ?Sized,
    Q: QuerySource + ?Sized,
{
    pub fn new(oracle: &'a O, queries: &'a Q, config: EvaluatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle,
            queries,
            config,
            handler: &IGNORE,
        })
    }

    pub fn with_mismatch_handler(mut self, handler: &'a dyn MismatchHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Queries the run will evaluate.
    pub fn sample_count(&self) -> usize {
        resolve_samples(self.config.samples, self.queries.count())
    }

    /// Recall of query `idx`, one value per configured k.
    pub fn evaluate(&self, idx: usize) -> std::result::Result<Vec<f64>, QueryFailure> {
        let query = self.queries.get(idx).ok_or(QueryFailure::MissingQuery(idx))?;
        let max_k = self.config.max_topk();

        let truth = GtRecord::from(self.oracle.search(&query, max_k, true)?);
        let candidate = GtRecord::from(self.oracle.search(&query, max_k, false)?);
        if candidate.count() < max_k {
            return Err(QueryFailure::InsufficientCandidates {
                expected: max_k,
                actual: candidate.count(),
            });
        }

        Ok(self
            .config
            .topk
            .iter()
            .map(|&k| {
                let mismatched =
                    metrics::mismatched(&candidate, &truth, k, self.config.score_match);
                if !mismatched.is_empty() {
                    self.handler.on_mismatch(idx, k, &mismatched);
                }
                metrics::recall_from_mismatches(k, mismatched.len())
            })
            .collect())
    }

    /// Evaluate every query of `window` concurrently, one worker per query.
    ///
    /// Results come back in query order.
    #[allow(clippy::type_complexity)]
    pub fn evaluate_window(
        &self,
        window: Range<usize>,
    ) -> Result<Vec<(usize, std::result::Result<Vec<f64>, QueryFailure>)>> {
        let mut workers = window.len().max(1);
        if let Some(cap) = self.config.max_workers {
            workers = workers.min(cap);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bench-recall-{i}"))
            .build()?;
        Ok(pool.install(|| {
            window
                .into_par_iter()
                .map(|idx| (idx, self.evaluate(idx)))
                .collect()
        }))
    }

    /// Run all windows, writing summary rows to `out`.
    pub fn run(&self, out: &mut dyn Write) -> Result<RecallReport> {
        let total = self.sample_count();
        let window = window_size(total);
        let mut report = RecallReport::new(self.config.topk.clone(), self.oracle.search_param());
        tracing::info!(total, window, topk = ?self.config.topk, "starting recall run");

        let mut start = 0;
        while start < total {
            if start == 0 {
                writeln!(out, "{}", header_line(&self.config.topk))?;
            }
            let end = (start + window).min(total);

            let mut accepted = Vec::with_capacity(end - start);
            let mut failed = false;
            for (idx, result) in self.evaluate_window(start..end)? {
                match result {
                    Ok(recalls) => accepted.push((idx, recalls)),
                    Err(e) => {
                        tracing::error!(
                            query = idx,
                            topk = self.config.max_topk(),
                            error = %e,
                            "query failed"
                        );
                        failed = true;
                    }
                }
            }
            if failed {
                tracing::error!(start, end, "failed to run recall window, stopping");
                report.failed_window = Some(start..end);
                break;
            }

            for (idx, recalls) in accepted {
                report.record(idx, recalls);
            }
            writeln!(out, "{}", report.summary_line())?;
            start = end;
        }

        report.completed = report.failed_window.is_none() && report.samples() == total;
        if !report.is_empty() {
            writeln!(out, "{FINAL_BANNER}")?;
            writeln!(out, "{}", header_line(&self.config.topk))?;
            writeln!(out, "{}", report.summary_line())?;
        }
        tracing::info!(
            samples = report.samples(),
            completed = report.completed,
            "recall run finished"
        );
        Ok(report)
    }
}

/// Ground-truth diff configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffConfig {
    pub samples: usize,
    /// Search in exact mode, to validate a ground-truth file itself.
    pub linear: bool,
    pub score_match: ScoreMatch,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            samples: 1,
            linear: false,
            score_match: ScoreMatch::Exact,
        }
    }
}

/// Outcome of a ground-truth diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    /// Queries sampled.
    pub samples: usize,
    /// Sampled queries with zero mismatches.
    pub consistent: usize,
    /// Percent of matching entries per compared query.
    pub per_query: BTreeMap<usize, f64>,
    /// Queries skipped because the search or a lookup failed.
    pub failed: Vec<usize>,
}

impl DiffReport {
    /// Percent of sampled queries with zero mismatches.
    pub fn consistency_percentage(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        as_percent(self.consistent as f64 / self.samples as f64, REPORT_PRECISION)
    }
}

/// Compare oracle results against a stored ground truth, query by query.
///
/// Each query is searched for `gt.count()` results and compared at that k.
/// A query answered with fewer results is recorded as failed.
pub fn diff_ground_truth<O, Q>(
    oracle: &O,
    queries: &Q,
    gt: &GroundTruth,
    config: &DiffConfig,
    handler: &dyn MismatchHandler,
    out: &mut dyn Write,
) -> Result<DiffReport>
where
    O: SearchOracle + ?Sized,
    Q: QuerySource + ?Sized,
{
    let k = gt.count();
    if k == 0 {
        return Err(EvalError::InvalidConfig(
            "ground truth holds zero entries per record".into(),
        ));
    }
    let samples = resolve_samples(config.samples, queries.count());
    let mut report = DiffReport {
        samples,
        ..Default::default()
    };

    for idx in 0..samples {
        let compared = queries
            .get(idx)
            .ok_or(QueryFailure::MissingQuery(idx))
            .and_then(|query| {
                let truth = gt.record(idx).ok_or(QueryFailure::MissingGroundTruth(idx))?;
                let candidate = GtRecord::from(oracle.search(&query, k, config.linear)?);
                if candidate.count() < k {
                    return Err(QueryFailure::InsufficientCandidates {
                        expected: k,
                        actual: candidate.count(),
                    });
                }
                Ok(metrics::mismatched(&candidate, truth, k, config.score_match))
            });
        let mismatched = match compared {
            Ok(mismatched) => mismatched,
            Err(e) => {
                tracing::error!(query = idx, error = %e, "diff query failed");
                report.failed.push(idx);
                continue;
            }
        };

        if mismatched.is_empty() {
            report.consistent += 1;
        } else {
            handler.on_mismatch(idx, k, &mismatched);
        }
        let percent = as_percent(
            metrics::recall_from_mismatches(k, mismatched.len()),
            REPORT_PRECISION,
        );
        writeln!(out, "{idx}, {percent:?}")?;
        report.per_query.insert(idx, percent);
    }

    writeln!(
        out,
        "consist percentage: {:.2}",
        report.consistency_percentage()
    )?;
    Ok(report)
}
