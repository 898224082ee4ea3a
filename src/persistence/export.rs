//! Plain-text export of dataset vectors.
//!
//! Vectors are written to rotating segment files `segment.000`,
//! `segment.001`, ... of at most `segment_size` lines. Each line is
//!
//! ```text
//! v0,v1,...,vn|key|<v0 with 6 decimals>|<v0>
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::dataset::VecsReader;
use super::error::{PersistenceError, PersistenceResult};
use super::format::{DatasetHeader, MetaHeader, ValueType};
use super::source::ByteSource;

/// Writes one line per vector into size-bounded segment files.
pub struct SegmentWriter {
    output: PathBuf,
    segment_size: u64,
    value_type: ValueType,
    count: u64,
    segment_id: u32,
    segment: Option<BufWriter<File>>,
}

impl SegmentWriter {
    pub fn new(
        output: impl Into<PathBuf>,
        segment_size: u64,
        value_type: ValueType,
    ) -> PersistenceResult<Self> {
        if segment_size == 0 {
            return Err(PersistenceError::InvalidConfig(
                "segment size must be positive".into(),
            ));
        }
        let output = output.into();
        fs::create_dir_all(&output)?;
        Ok(Self {
            output,
            segment_size,
            value_type,
            count: 0,
            segment_id: 0,
            segment: None,
        })
    }

    fn segment_path(&self) -> PathBuf {
        self.output.join(format!("segment.{:03}", self.segment_id))
    }

    fn open_segment(&mut self) -> PersistenceResult<()> {
        self.close()?;
        let path = self.segment_path();
        tracing::debug!(path = %path.display(), "opening segment");
        self.segment = Some(BufWriter::new(File::create(path)?));
        self.segment_id += 1;
        Ok(())
    }

    fn format_value(&self, v: f64) -> String {
        if self.value_type.is_float() {
            format!("{v:?}")
        } else {
            format!("{v}")
        }
    }

    pub fn write(&mut self, key: u64, vector: &[f64]) -> PersistenceResult<()> {
        let line = {
            let values: Vec<String> = vector.iter().map(|&v| self.format_value(v)).collect();
            let first = vector.first().copied().unwrap_or(0.0);
            format!(
                "{}|{key}|{first:.6}|{}\n",
                values.join(","),
                self.format_value(first)
            )
        };
        if self.count % self.segment_size == 0 || self.segment.is_none() {
            self.open_segment()?;
        }
        let segment = self
            .segment
            .as_mut()
            .ok_or_else(|| PersistenceError::InvalidState("no open segment".into()))?;
        segment.write_all(line.as_bytes())?;
        self.count += 1;
        Ok(())
    }

    /// Lines written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Segment files opened so far.
    pub fn segments(&self) -> u32 {
        self.segment_id
    }

    pub fn close(&mut self) -> PersistenceResult<()> {
        if let Some(mut segment) = self.segment.take() {
            segment.flush()?;
        }
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to flush segment on drop");
        }
    }
}

#[derive(Serialize)]
struct Description<'a> {
    header: &'a DatasetHeader,
    meta: &'a MetaHeader,
}

/// Pretty JSON of the header and meta of a loaded dataset.
pub fn describe<S: ByteSource>(reader: &VecsReader<S>) -> PersistenceResult<String> {
    match (reader.header(), reader.meta()) {
        (Some(header), Some(meta)) => {
            Ok(serde_json::to_string_pretty(&Description { header, meta })?)
        }
        _ => Err(PersistenceError::InvalidState(
            "dataset is not loaded or has no meta".into(),
        )),
    }
}

/// Export vectors `range` (clamped to the dataset) as text segments under
/// `output`. Returns the number of vectors written.
pub fn export_text<S: ByteSource>(
    reader: &VecsReader<S>,
    range: Range<u64>,
    output: &Path,
    segment_size: u64,
) -> PersistenceResult<u64> {
    let value_type = reader
        .value_type()
        .filter(|_| reader.is_valid())
        .ok_or_else(|| PersistenceError::InvalidState("dataset is invalid".into()))?;
    let end = range.end.min(reader.num_vectors());
    let mut writer = SegmentWriter::new(output, segment_size, value_type)?;

    for index in range.start..end {
        let (key, vector) = match (reader.key(index)?, reader.vector(index)?) {
            (Some(key), Some(vector)) => (key, vector),
            _ => break,
        };
        writer.write(key, &vector)?;
        if (index + 1) % 100_000 == 0 {
            tracing::info!(exported = index + 1, "export progress");
        }
    }
    writer.close()?;
    Ok(writer.count())
}
