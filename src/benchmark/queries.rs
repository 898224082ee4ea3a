//! Query sources.
//!
//! - `Vec<Vec<f32>>` ([`VecQueries`]): queries held in memory
//! - [`DatasetQueries`]: the vectors of a `.vecs2` dataset
//! - [`TextQueries`]: one query per line of a text file
//!
//! The text format accepts the lines written by
//! [`export_text`](crate::persistence::export::export_text): comma-separated
//! values, optionally followed by `|`-separated fields that are ignored.

use std::fs;
use std::path::Path;

use super::traits::QuerySource;
use crate::persistence::{ByteSource, PersistenceError, PersistenceResult, VecsReader};

/// In-memory queries.
pub type VecQueries = Vec<Vec<f32>>;

impl QuerySource for [Vec<f32>] {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        <[Vec<f32>]>::get(self, index).cloned()
    }

    fn count(&self) -> usize {
        self.len()
    }
}

impl QuerySource for Vec<Vec<f32>> {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        self.as_slice().get(index).cloned()
    }

    fn count(&self) -> usize {
        self.len()
    }
}

/// Queries read from the vectors of a loaded dataset.
pub struct DatasetQueries<'a, S> {
    reader: &'a VecsReader<S>,
}

impl<'a, S: ByteSource> DatasetQueries<'a, S> {
    pub fn new(reader: &'a VecsReader<S>) -> PersistenceResult<Self> {
        if !reader.is_valid() {
            return Err(PersistenceError::InvalidState(
                "query dataset is not loaded or invalid".into(),
            ));
        }
        Ok(Self { reader })
    }
}

impl<S: ByteSource> QuerySource for DatasetQueries<'_, S> {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        match self.reader.vector_f32(index as u64) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(index, error = %e, "failed to read query vector");
                None
            }
        }
    }

    fn count(&self) -> usize {
        self.reader.num_vectors() as usize
    }
}

/// Queries parsed from text, one per non-empty line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQueries {
    queries: Vec<Vec<f32>>,
}

impl TextQueries {
    pub fn load(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let queries = Self::parse(&text)?;
        tracing::info!(path = %path.display(), queries = queries.len(), "queries loaded");
        Ok(queries)
    }

    pub fn parse(text: &str) -> PersistenceResult<Self> {
        let mut queries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let features = line.split('|').next().unwrap_or_default();
            let query = features
                .split(',')
                .map(|v| {
                    v.trim().parse::<f32>().map_err(|_| {
                        PersistenceError::Format(format!(
                            "line {}: invalid value '{}'",
                            lineno + 1,
                            v.trim()
                        ))
                    })
                })
                .collect::<PersistenceResult<Vec<f32>>>()?;
            if let Some(first) = queries.first().map(Vec::len) {
                if first != query.len() {
                    return Err(PersistenceError::format_detail(
                        &format!("line {} dimension", lineno + 1),
                        first,
                        query.len(),
                    ));
                }
            }
            queries.push(query);
        }
        Ok(Self { queries })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn into_inner(self) -> Vec<Vec<f32>> {
        self.queries
    }
}

impl QuerySource for TextQueries {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        self.queries.as_slice().get(index).cloned()
    }

    fn count(&self) -> usize {
        self.queries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{DatasetWriter, MemorySource, ValueType};

    #[test]
    fn parse_plain_and_exported_lines() {
        let text = "1.0,2.0\n\n3.5,4.0|17|3.500000|3.5\n";
        let q = TextQueries::parse(text).unwrap();
        assert_eq!(q.count(), 2);
        assert_eq!(q.get(1), Some(vec![3.5, 4.0]));
        assert_eq!(q.get(2), None);
    }

    #[test]
    fn parse_reports_line_number() {
        let err = TextQueries::parse("1,2\n1,x\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(TextQueries::parse("1,2\n1,2,3\n").is_err());
    }

    #[test]
    fn dataset_queries_follow_reader() {
        let mut writer = DatasetWriter::new(ValueType::Fp32, 2);
        writer.push(1, &[0.5, 1.5]).unwrap();
        writer.push(2, &[2.5, 3.5]).unwrap();
        let mut reader = VecsReader::new(MemorySource::new(writer.to_bytes().unwrap()));
        reader.load().unwrap();

        let q = DatasetQueries::new(&reader).unwrap();
        assert_eq!(q.count(), 2);
        assert_eq!(q.get(1), Some(vec![2.5, 3.5]));
        assert_eq!(q.get(2), None);
    }

    #[test]
    fn vec_queries() {
        let q: VecQueries = vec![vec![1.0], vec![2.0]];
        assert_eq!(QuerySource::count(&q), 2);
        assert_eq!(QuerySource::get(&q, 0), Some(vec![1.0]));
    }
}
