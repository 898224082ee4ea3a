//! vecs-eval: `.vecs2` vector datasets and recall@k evaluation.
//!
//! Two halves:
//!
//! - [`persistence`]: a validated random-access reader for the `.vecs2`
//!   binary dataset format (mmap or seek + read), a writer for the same
//!   layout, a text exporter, and the flat ground-truth file
//! - [`benchmark`]: a concurrent evaluator comparing a search engine's
//!   approximate top-k results with exact results, plus a ground-truth diff
//!
//! # Example
//!
//! ```no_run
//! use vecs_eval::benchmark::{
//!     DatasetQueries, EvaluatorConfig, FlatOracle, FlatOracleConfig, RecallEvaluator,
//! };
//! use vecs_eval::persistence::VecsReader;
//!
//! let reader = VecsReader::open_mmap("base.vecs2")?;
//! let oracle = FlatOracle::from_reader(&reader, FlatOracleConfig::default())?;
//! let queries = DatasetQueries::new(&reader)?;
//!
//! let config = EvaluatorConfig::new(EvaluatorConfig::parse_topk("1,10,100")?, 100);
//! let report = RecallEvaluator::new(&oracle, &queries, config)?.run(&mut std::io::stdout())?;
//! println!("{:?}", report.percentages());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Scoring
//!
//! Results are compared by score, not by primary key: a candidate at the
//! same distance as a ground-truth entry is a hit even if it names another
//! document. Exact score equality is the default; see [`ScoreMatch`] for the
//! tolerant comparator.

pub mod benchmark;
pub mod config;
pub mod distance;
pub mod error;
pub mod persistence;

pub use error::{EvalError, OracleError, QueryFailure, Result};
pub use persistence::{
    GroundTruth, GtRecord, Neighbor, PersistenceError, PersistenceResult, ScoreMatch, ValueType,
    VecsReader,
};
