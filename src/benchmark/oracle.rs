//! In-process search oracle over a flat vector table.
//!
//! Exact search scans every stored vector. Approximate search scans only the
//! vectors of the first `n_probe` of `n_lists` round-robin partitions
//! (vector `i` lives in partition `i % n_lists`), which gives a predictable
//! recall below 1 without an index.
//!
//! ```text
//! n_lists = 4, n_probe = 2
//!
//!   i:    0  1  2  3  4  5  6  7 ...
//!   list: 0  1  2  3  0  1  2  3
//!   scan: ✓  ✓  ·  ·  ✓  ✓  ·  ·
//! ```

use crate::config::DEFAULT_SEARCH_PARAM;
use crate::distance::DistanceMetric;
use crate::error::{EvalError, OracleError, Result};
use crate::persistence::{ByteSource, Neighbor, VecsReader};

use super::traits::SearchOracle;

/// Flat oracle configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatOracleConfig {
    pub metric: DistanceMetric,
    /// Number of round-robin partitions.
    pub n_lists: usize,
    /// Partitions scanned by approximate search.
    pub n_probe: usize,
    /// Value reported as the search parameter in summary rows.
    pub search_param: u32,
}

impl Default for FlatOracleConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::L2,
            n_lists: 1,
            n_probe: 1,
            search_param: DEFAULT_SEARCH_PARAM,
        }
    }
}

impl FlatOracleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_lists == 0 {
            return Err(EvalError::InvalidConfig("n_lists must be positive".into()));
        }
        if self.n_probe == 0 || self.n_probe > self.n_lists {
            return Err(EvalError::InvalidConfig(format!(
                "n_probe must be in 1..={}, got {}",
                self.n_lists, self.n_probe
            )));
        }
        Ok(())
    }
}

/// Brute-force oracle over `(pk, vector)` pairs.
pub struct FlatOracle {
    dimension: usize,
    config: FlatOracleConfig,
    pks: Vec<u64>,
    vectors: Vec<f32>,
}

impl FlatOracle {
    pub fn new(dimension: usize, config: FlatOracleConfig) -> Result<Self> {
        config.validate()?;
        if dimension == 0 {
            return Err(EvalError::InvalidConfig("dimension must be positive".into()));
        }
        Ok(Self {
            dimension,
            config,
            pks: Vec::new(),
            vectors: Vec::new(),
        })
    }

    /// Load every entry of a valid dataset.
    pub fn from_reader<S: ByteSource>(
        reader: &VecsReader<S>,
        config: FlatOracleConfig,
    ) -> Result<Self> {
        let mut oracle = Self::new(reader.dimension(), config)?;
        let n = reader.num_vectors() as usize;
        oracle.pks.reserve(n);
        oracle.vectors.reserve(n * oracle.dimension);
        for entry in reader.entries() {
            let (pk, vector) = entry?;
            oracle.pks.push(pk);
            oracle.vectors.extend(vector.iter().map(|&v| v as f32));
        }
        tracing::info!(
            vectors = oracle.len(),
            dimension = oracle.dimension,
            metric = %oracle.config.metric,
            "flat oracle loaded"
        );
        Ok(oracle)
    }

    pub fn insert(&mut self, pk: u64, vector: &[f32]) -> std::result::Result<(), OracleError> {
        if vector.len() != self.dimension {
            return Err(OracleError::DimensionMismatch {
                query_dim: vector.len(),
                doc_dim: self.dimension,
            });
        }
        self.pks.push(pk);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &FlatOracleConfig {
        &self.config
    }

    #[inline]
    fn vector(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dimension..(i + 1) * self.dimension]
    }
}

impl SearchOracle for FlatOracle {
    fn search(
        &self,
        query: &[f32],
        topk: usize,
        exact: bool,
    ) -> std::result::Result<Vec<Neighbor>, OracleError> {
        if query.len() != self.dimension {
            return Err(OracleError::DimensionMismatch {
                query_dim: query.len(),
                doc_dim: self.dimension,
            });
        }
        if topk == 0 {
            return Err(OracleError::Status {
                code: 1,
                message: "topk must be positive".into(),
            });
        }

        let FlatOracleConfig {
            metric,
            n_lists,
            n_probe,
            ..
        } = self.config;
        let mut hits: Vec<Neighbor> = (0..self.len())
            .filter(|i| exact || i % n_lists < n_probe)
            .map(|i| Neighbor::new(self.pks[i], metric.distance(query, self.vector(i))))
            .collect();
        hits.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.pk.cmp(&b.pk)));
        hits.truncate(topk);
        Ok(hits)
    }

    fn search_param(&self) -> u32 {
        self.config.search_param
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_oracle(n: u64, config: FlatOracleConfig) -> FlatOracle {
        let mut oracle = FlatOracle::new(1, config).unwrap();
        for i in 0..n {
            oracle.insert(100 + i, &[i as f32]).unwrap();
        }
        oracle
    }

    #[test]
    fn exact_search_is_sorted_by_distance() {
        let oracle = line_oracle(10, FlatOracleConfig::default());
        let hits = oracle.search(&[3.2], 3, true).unwrap();
        let pks: Vec<u64> = hits.iter().map(|n| n.pk).collect();
        assert_eq!(pks, vec![103, 104, 102]);
        assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn ties_break_by_pk() {
        let mut oracle = FlatOracle::new(1, FlatOracleConfig::default()).unwrap();
        oracle.insert(9, &[1.0]).unwrap();
        oracle.insert(3, &[-1.0]).unwrap();
        let hits = oracle.search(&[0.0], 2, true).unwrap();
        assert_eq!(hits[0].pk, 3);
        assert_eq!(hits[1].pk, 9);
    }

    #[test]
    fn approximate_scans_probed_lists_only() {
        let config = FlatOracleConfig {
            n_lists: 2,
            n_probe: 1,
            ..Default::default()
        };
        let oracle = line_oracle(10, config);
        let hits = oracle.search(&[3.0], 10, false).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|n| (n.pk - 100) % 2 == 0));
        assert_eq!(oracle.search(&[3.0], 10, true).unwrap().len(), 10);
    }

    #[test]
    fn invalid_requests() {
        let oracle = line_oracle(2, FlatOracleConfig::default());
        assert!(matches!(
            oracle.search(&[1.0, 2.0], 1, true),
            Err(OracleError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            oracle.search(&[1.0], 0, true),
            Err(OracleError::Status { .. })
        ));
    }

    #[test]
    fn config_validation() {
        let bad = FlatOracleConfig {
            n_lists: 2,
            n_probe: 3,
            ..Default::default()
        };
        assert!(FlatOracle::new(4, bad).is_err());
        assert!(FlatOracle::new(0, FlatOracleConfig::default()).is_err());
    }
}
