//! Report output: summary rows and mismatch dumps.
//!
//! These are report lines written to an injected sink, not log records.
//!
//! ```text
//! Processed   ef    @1(%)   @10(%)
//!        20  500    100.0    99.85
//! ```

use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;

use crate::persistence::Neighbor;

/// Banner printed before the final cumulative summary.
pub const FINAL_BANNER: &str = "--------------------Recall Tests------------------";

/// Banner printed before each dumped mismatch.
pub const MISMATCH_BANNER: &str = "-----Mismatched Result-----";

/// Receives the mismatched entries of a query at one k.
///
/// Called from worker threads, possibly concurrently.
pub trait MismatchHandler: Send + Sync {
    fn on_mismatch(&self, query: usize, topk: usize, mismatched: &[Neighbor]);
}

/// Default handler: drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreMismatches;

impl MismatchHandler for IgnoreMismatches {
    fn on_mismatch(&self, _query: usize, _topk: usize, _mismatched: &[Neighbor]) {}
}

#[derive(Serialize)]
struct MismatchDump<'a> {
    query_id: usize,
    topk: usize,
    mismatched: &'a [Neighbor],
}

/// Writes each mismatch as a banner followed by pretty JSON.
///
/// Dumps from concurrent queries are serialized by an internal lock, so one
/// dump is never interleaved with another.
pub struct JsonMismatchDump<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonMismatchDump<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> MismatchHandler for JsonMismatchDump<W> {
    fn on_mismatch(&self, query: usize, topk: usize, mismatched: &[Neighbor]) {
        let dump = MismatchDump {
            query_id: query,
            topk,
            mismatched,
        };
        let json = match serde_json::to_string_pretty(&dump) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(query, error = %e, "failed to encode mismatch dump");
                return;
            }
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{MISMATCH_BANNER}\n{json}") {
            tracing::warn!(query, error = %e, "failed to write mismatch dump");
        }
    }
}

/// Column header of the summary table.
pub fn header_line(topk: &[usize]) -> String {
    let columns: Vec<String> = topk
        .iter()
        .map(|k| format!("{:>5}(%)", format!("@{k}")))
        .collect();
    format!("Processed   ef {}", columns.join(" "))
}

/// One summary row: samples, search parameter, then one percentage per k.
pub fn summary_line(samples: usize, search_param: u32, percents: &[f64]) -> String {
    let mut fields = vec![format!("{samples:9}"), format!("{search_param:4}")];
    fields.extend(percents.iter().map(|p| format!("{:>8}", format!("{p:?}"))));
    fields.join(" ")
}
