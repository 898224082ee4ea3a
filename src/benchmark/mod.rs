//! Recall@k evaluation of vector search engines.
//!
//! The evaluator asks a [`SearchOracle`] for exact and approximate results of
//! the same query and scores the approximate list against the exact one:
//!
//! - **Recall@k**: fraction of the first k candidates whose score occurs in
//!   the first k ground-truth scores
//! - **Consistency**: fraction of queries whose results match a stored
//!   ground-truth file with zero mismatches
//!
//! | Module | Role |
//! |--------|------|
//! | [`traits`] | oracle and query-source seams |
//! | [`metrics`] | mismatch counting and recall |
//! | [`evaluation`] | windowed concurrent driver, ground-truth diff |
//! | [`report`] | summary rows, mismatch dumps |
//! | [`oracle`] | in-process flat oracle |
//! | [`queries`] | in-memory, dataset and text query sources |
//! | [`ground_truth`] | offline ground-truth generation |

pub mod evaluation;
pub mod ground_truth;
pub mod metrics;
pub mod oracle;
pub mod queries;
pub mod report;
pub mod traits;

pub use evaluation::{
    diff_ground_truth, window_size, DiffConfig, DiffReport, EvaluatorConfig, RecallEvaluator,
    RecallReport,
};
pub use ground_truth::{generate_ground_truth, write_ground_truth};
pub use metrics::{count_mismatches, recall_at_k, recall_curve};
pub use oracle::{FlatOracle, FlatOracleConfig};
pub use queries::{DatasetQueries, TextQueries, VecQueries};
pub use report::{IgnoreMismatches, JsonMismatchDump, MismatchHandler};
pub use traits::{QuerySource, SearchOracle};

pub use crate::persistence::ScoreMatch;
