//! Writer for `.vecs2` datasets.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::{PersistenceError, PersistenceResult};
use super::format::{DatasetHeader, MetaHeader, Packed, ValueType};

/// Builds a dataset in memory and writes it in one pass.
///
/// Vectors are encoded as they are pushed; keys are kept aside and appended
/// after the vector array.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    meta: MetaHeader,
    value_type: ValueType,
    vectors: Vec<u8>,
    keys: Vec<u64>,
}

impl DatasetWriter {
    pub fn new(value_type: ValueType, dimension: u32) -> Self {
        Self {
            meta: MetaHeader::new(value_type, dimension),
            value_type,
            vectors: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn with_space_id(mut self, space_id: u64) -> Self {
        self.meta.space_id = space_id;
        self
    }

    pub fn with_attachment(
        mut self,
        attachment: serde_json::Map<String, serde_json::Value>,
    ) -> PersistenceResult<Self> {
        self.meta.set_attachment(attachment)?;
        Ok(self)
    }

    pub fn meta(&self) -> &MetaHeader {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append one vector with its key.
    pub fn push(&mut self, key: u64, vector: &[f64]) -> PersistenceResult<()> {
        if vector.len() != self.meta.dimension as usize {
            return Err(PersistenceError::InvalidConfig(format!(
                "vector has {} dimensions, dataset has {}",
                vector.len(),
                self.meta.dimension
            )));
        }
        self.value_type.encode_into(vector, &mut self.vectors);
        self.keys.push(key);
        Ok(())
    }

    pub fn push_f32(&mut self, key: u64, vector: &[f32]) -> PersistenceResult<()> {
        let widened: Vec<f64> = vector.iter().map(|&x| x as f64).collect();
        self.push(key, &widened)
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> PersistenceResult<()> {
        let meta = self.meta.pack()?;
        let meta_size = i32::try_from(meta.len())
            .map_err(|_| PersistenceError::InvalidConfig("meta region too large".into()))?;
        out.write_all(&DatasetHeader::new(self.keys.len() as u64, meta_size).pack())?;
        out.write_all(&meta)?;
        out.write_all(&self.vectors)?;
        for key in &self.keys {
            out.write_all(&key.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> PersistenceResult<Vec<u8>> {
        let mut out = Vec::with_capacity(
            DatasetHeader::SIZE + self.meta.size() + self.vectors.len() + self.keys.len() * 8,
        );
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        tracing::info!(
            path = %path.as_ref().display(),
            num_vectors = self.keys.len(),
            "dataset written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sizes_add_up() {
        let mut writer = DatasetWriter::new(ValueType::Int16, 3);
        writer.push(1, &[1.0, 2.0, 3.0]).unwrap();
        writer.push(2, &[4.0, 5.0, 6.0]).unwrap();
        let bytes = writer.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12 + 64 + 2 * 3 * 2 + 2 * 8);
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut writer = DatasetWriter::new(ValueType::Fp32, 4);
        assert!(writer.push(1, &[1.0]).is_err());
        assert!(writer.is_empty());
    }

    #[test]
    fn attachment_grows_meta_region() {
        let mut attachment = serde_json::Map::new();
        attachment.insert("source".into(), serde_json::json!("sift"));
        let writer = DatasetWriter::new(ValueType::Fp32, 2)
            .with_attachment(attachment)
            .unwrap();
        let bytes = writer.to_bytes().unwrap();
        let header = DatasetHeader::unpack(&bytes, 0).unwrap();
        assert_eq!(header.meta_size as usize, writer.meta().size());
        assert!(header.meta_size > 64);
    }
}
