//! Error types for recall evaluation.

use thiserror::Error;

use crate::persistence::PersistenceError;

/// Non-success answer from a search oracle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// The engine returned a failure status.
    #[error("search failed with status {code}: {message}")]
    Status { code: i32, message: String },
    /// Query dimension does not match the searched collection.
    #[error("dimension mismatch: query has {query_dim} dimensions, collection has {doc_dim}")]
    DimensionMismatch { query_dim: usize, doc_dim: usize },
}

/// Why a single query could not contribute to recall.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryFailure {
    /// The oracle call failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// The call succeeded but returned too few results for the largest k.
    #[error("insufficient candidates: expected {expected}, got {actual}")]
    InsufficientCandidates { expected: usize, actual: usize },
    /// The query source has no query at this index.
    #[error("query {0} not found")]
    MissingQuery(usize),
    /// The ground-truth store has no record at this index.
    #[error("ground truth for query {0} not found")]
    MissingGroundTruth(usize),
}

/// Errors that abort an evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Invalid evaluator configuration (empty k list, zero k, ...)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dataset or ground-truth file error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A query failed where every query is required (ground-truth generation)
    #[error("query {index} failed: {source}")]
    Query {
        index: usize,
        #[source]
        source: QueryFailure,
    },

    /// Worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// Report output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rayon::ThreadPoolBuildError> for EvalError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
