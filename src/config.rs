//! Tuning constants and defaults.
//!
//! Runtime configuration lives next to the component it configures
//! ([`crate::persistence::ReaderOptions`], [`crate::benchmark::EvaluatorConfig`],
//! [`crate::benchmark::FlatOracleConfig`]) and is filled from CLI flags in
//! `main.rs`.

/// Number of consecutive keys loaded per key-cache miss.
pub const KEY_CACHE_BATCH: usize = 1024;

/// Sample counts above this are split into [`WINDOW_DIVISOR`] windows.
pub const WINDOW_THRESHOLD: usize = 50;

/// Number of windows a large recall run is split into.
pub const WINDOW_DIVISOR: usize = 20;

/// Search parameter reported when the oracle does not expose one.
pub const DEFAULT_SEARCH_PARAM: u32 = 500;

/// Relative tolerance of the tolerant score comparator.
pub const DEFAULT_TOLERANCE: f32 = 1e-5;

/// Lines per text export segment.
pub const DEFAULT_SEGMENT_SIZE: u64 = 1_000_000;

/// Default k list of the recall CLI.
pub const DEFAULT_TOPK: &str = "200";

/// Decimal places of per-query recall percentages in reports.
pub const REPORT_PRECISION: u32 = 4;
