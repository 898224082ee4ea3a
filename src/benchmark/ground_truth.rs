//! Offline ground-truth generation.

use std::path::Path;

use rayon::prelude::*;

use super::evaluation::resolve_samples;
use super::traits::{QuerySource, SearchOracle};
use crate::error::{EvalError, QueryFailure, Result};
use crate::persistence::{GroundTruth, GtRecord};

/// Exact top-`count` records for the first `samples` queries, in query order.
///
/// Every query must produce exactly `count` results; the first failure
/// aborts generation.
pub fn generate_ground_truth<O, Q>(
    oracle: &O,
    queries: &Q,
    count: usize,
    samples: usize,
) -> Result<Vec<GtRecord>>
where
    O: SearchOracle + ?Sized,
    Q: QuerySource + ?Sized,
{
    if count == 0 {
        return Err(EvalError::InvalidConfig(
            "ground-truth count must be positive".into(),
        ));
    }
    let samples = resolve_samples(samples, queries.count());

    (0..samples)
        .into_par_iter()
        .map(|idx| {
            exact_record(oracle, queries, idx, count)
                .map_err(|source| EvalError::Query { index: idx, source })
        })
        .collect()
}

fn exact_record<O, Q>(
    oracle: &O,
    queries: &Q,
    idx: usize,
    count: usize,
) -> std::result::Result<GtRecord, QueryFailure>
where
    O: SearchOracle + ?Sized,
    Q: QuerySource + ?Sized,
{
    let query = queries.get(idx).ok_or(QueryFailure::MissingQuery(idx))?;
    let results = oracle.search(&query, count, true)?;
    if results.len() < count {
        return Err(QueryFailure::InsufficientCandidates {
            expected: count,
            actual: results.len(),
        });
    }
    Ok(GtRecord::from(results))
}

/// Generate ground truth and write it to `path`.
pub fn write_ground_truth<O, Q>(
    oracle: &O,
    queries: &Q,
    count: usize,
    samples: usize,
    path: &Path,
) -> Result<GroundTruth>
where
    O: SearchOracle + ?Sized,
    Q: QuerySource + ?Sized,
{
    let records = generate_ground_truth(oracle, queries, count, samples)?;
    let mut gt = GroundTruth::new(count, path);
    for record in records {
        gt.append(record)?;
    }
    gt.serialize()?;
    Ok(gt)
}
