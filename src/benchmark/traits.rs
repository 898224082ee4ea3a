//! Seams between the evaluator and the things it measures.

use std::sync::Arc;

use crate::config::DEFAULT_SEARCH_PARAM;
use crate::error::OracleError;
use crate::persistence::Neighbor;

/// A search engine answering top-k queries in two modes.
///
/// `exact = true` is the brute-force (linear) search used as ground truth;
/// `exact = false` is the approximate search under test. Results are ordered
/// best first and hold at most `topk` entries. The collection or column being
/// searched is part of the oracle instance.
pub trait SearchOracle: Send + Sync {
    fn search(&self, query: &[f32], topk: usize, exact: bool)
        -> Result<Vec<Neighbor>, OracleError>;

    /// Search parameter reported in summary rows (`ef` or equivalent).
    fn search_param(&self) -> u32 {
        DEFAULT_SEARCH_PARAM
    }
}

impl<T: SearchOracle + ?Sized> SearchOracle for &T {
    fn search(
        &self,
        query: &[f32],
        topk: usize,
        exact: bool,
    ) -> Result<Vec<Neighbor>, OracleError> {
        (**self).search(query, topk, exact)
    }

    fn search_param(&self) -> u32 {
        (**self).search_param()
    }
}

impl<T: SearchOracle + ?Sized> SearchOracle for Box<T> {
    fn search(
        &self,
        query: &[f32],
        topk: usize,
        exact: bool,
    ) -> Result<Vec<Neighbor>, OracleError> {
        (**self).search(query, topk, exact)
    }

    fn search_param(&self) -> u32 {
        (**self).search_param()
    }
}

impl<T: SearchOracle + ?Sized> SearchOracle for Arc<T> {
    fn search(
        &self,
        query: &[f32],
        topk: usize,
        exact: bool,
    ) -> Result<Vec<Neighbor>, OracleError> {
        (**self).search(query, topk, exact)
    }

    fn search_param(&self) -> u32 {
        (**self).search_param()
    }
}

/// Query feature vectors addressed by index.
pub trait QuerySource: Send + Sync {
    /// Query `index`, or `None` past the end.
    fn get(&self, index: usize) -> Option<Vec<f32>>;

    fn count(&self) -> usize;
}

impl<T: QuerySource + ?Sized> QuerySource for &T {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        (**self).get(index)
    }

    fn count(&self) -> usize {
        (**self).count()
    }
}

impl<T: QuerySource + ?Sized> QuerySource for Box<T> {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        (**self).get(index)
    }

    fn count(&self) -> usize {
        (**self).count()
    }
}
