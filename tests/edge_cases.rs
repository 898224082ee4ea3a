//! Edge case tests for vecs-eval datasets and ground-truth files.
//!
//! Tests unusual inputs and boundary conditions that could cause failures.

use std::fs;

use vecs_eval::persistence::{
    DatasetHeader, DatasetWriter, FileSource, GroundTruth, MemorySource, MetaHeader, MmapSource,
    Packed, PersistenceError, ValueType, VecsReader,
};

fn hand_packed(header: DatasetHeader, meta: &[u8], body: &[u8]) -> Vec<u8> {
    let mut bytes = header.pack();
    bytes.extend_from_slice(meta);
    bytes.extend_from_slice(body);
    bytes
}

fn loaded(bytes: Vec<u8>) -> VecsReader<MemorySource> {
    let mut reader = VecsReader::new(MemorySource::new(bytes));
    reader.load().expect("header must be readable");
    reader
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn two_fp32_vectors_packed_by_hand() {
    let meta = MetaHeader::new(ValueType::Fp32, 4).pack().unwrap();
    assert_eq!(meta.len(), 64);

    let vectors = [[0.1f32, 0.2, 0.3, 0.4], [1.5, -2.25, 3.125, 1e-3]];
    let mut body = Vec::new();
    for v in &vectors {
        for x in v {
            body.extend_from_slice(&x.to_le_bytes());
        }
    }
    body.extend_from_slice(&7u64.to_le_bytes());
    body.extend_from_slice(&9u64.to_le_bytes());

    let reader = loaded(hand_packed(DatasetHeader::new(2, 64), &meta, &body));
    assert!(reader.is_valid());
    assert_eq!(reader.num_vectors(), 2);
    assert_eq!(reader.dimension(), 4);
    assert_eq!(reader.value_type(), Some(ValueType::Fp32));

    assert_eq!(reader.vector(0).unwrap(), Some(vec![0.1, 0.2, 0.3, 0.4]));
    assert_eq!(reader.vector(1).unwrap(), Some(vec![1.5, -2.25, 3.125, 0.001]));
    assert_eq!(reader.key(0).unwrap(), Some(7));
    assert_eq!(reader.key(1).unwrap(), Some(9));
    assert_eq!(reader.vector(2).unwrap(), None);
}

#[test]
fn shorter_than_header_is_format_error() {
    let mut reader = VecsReader::new(MemorySource::new(vec![0u8; 11]));
    assert!(matches!(reader.load(), Err(PersistenceError::Format(_))));
    assert!(!reader.is_loaded());
}

#[test]
fn empty_dataset_is_valid() {
    let bytes = DatasetWriter::new(ValueType::Fp64, 3).to_bytes().unwrap();
    let reader = loaded(bytes);
    assert!(reader.is_valid());
    assert_eq!(reader.vector(0).unwrap(), None);
    assert_eq!(reader.key(0).unwrap(), None);
    assert_eq!(reader.entries().count(), 0);
}

#[test]
fn unsupported_value_type_is_invalid() {
    let mut meta = MetaHeader::new(ValueType::Fp32, 2);
    meta.value_type = 9;
    let bytes = hand_packed(DatasetHeader::new(0, 64), &meta.pack().unwrap(), &[]);
    let reader = loaded(bytes);
    assert!(reader.is_loaded());
    assert!(!reader.is_valid());
    assert!(reader.meta().is_none());
    assert!(matches!(reader.vector(0), Err(PersistenceError::InvalidState(_))));
}

#[test]
fn unit_size_disagreeing_with_type_is_invalid() {
    let mut meta = MetaHeader::new(ValueType::Fp32, 2);
    meta.unit_size = 2;
    let bytes = hand_packed(DatasetHeader::new(1, 64), &meta.pack().unwrap(), &[0u8; 4 + 8]);
    assert!(!loaded(bytes).is_valid());
}

#[test]
fn meta_size_below_fixed_prefix_is_invalid() {
    let meta = MetaHeader::new(ValueType::Int8, 1).pack().unwrap();
    let bytes = hand_packed(DatasetHeader::new(0, 32), &meta[..32], &[]);
    let reader = loaded(bytes);
    assert!(!reader.is_valid());
    assert!(reader.header().is_some());
}

#[test]
fn meta_past_end_of_file_is_invalid() {
    let bytes = hand_packed(DatasetHeader::new(0, 4096), &[0u8; 64], &[]);
    assert!(!loaded(bytes).is_valid());
}

#[test]
fn non_object_attachment_is_invalid() {
    let mut meta = MetaHeader::new(ValueType::Fp32, 1).pack().unwrap();
    let attachment = b"[1,2]";
    meta[24..28].copy_from_slice(&64u32.to_le_bytes());
    meta[28..32].copy_from_slice(&(attachment.len() as u32).to_le_bytes());
    meta.extend_from_slice(attachment);
    let meta_size = meta.len() as i32;
    let bytes = hand_packed(DatasetHeader::new(0, meta_size), &meta, &[]);
    assert!(!loaded(bytes).is_valid());
}

#[test]
fn attachment_survives_roundtrip() {
    let mut map = serde_json::Map::new();
    map.insert("metric".into(), serde_json::json!("l2"));
    map.insert("source".into(), serde_json::json!({ "rows": 3 }));
    let mut writer = DatasetWriter::new(ValueType::Int16, 2)
        .with_space_id(42)
        .with_attachment(map.clone())
        .unwrap();
    writer.push(5, &[-300.0, 300.0]).unwrap();

    let reader = loaded(writer.to_bytes().unwrap());
    assert!(reader.is_valid());
    let meta = reader.meta().unwrap();
    assert_eq!(meta.space_id, 42);
    assert_eq!(meta.attachment, map);
    assert_eq!(reader.vector(0).unwrap(), Some(vec![-300.0, 300.0]));
}

#[test]
fn unloaded_reader_refuses_access() {
    let bytes = DatasetWriter::new(ValueType::Fp32, 1).to_bytes().unwrap();
    let mut reader = VecsReader::new(MemorySource::new(bytes));
    assert!(matches!(reader.key(0), Err(PersistenceError::InvalidState(_))));
    reader.load().unwrap();
    assert!(reader.is_valid());
    reader.unload();
    assert!(!reader.is_loaded());
    assert!(!reader.is_valid());
    assert!(reader.vector(0).is_err());
}

#[test]
fn int8_values_saturate() {
    let mut writer = DatasetWriter::new(ValueType::Int8, 3);
    writer.push(1, &[500.0, -500.0, 1.6]).unwrap();
    let reader = loaded(writer.to_bytes().unwrap());
    assert_eq!(reader.vector(0).unwrap(), Some(vec![127.0, -128.0, 2.0]));
}

#[test]
fn dimension_mismatch_on_push_is_rejected() {
    let mut writer = DatasetWriter::new(ValueType::Fp32, 3);
    assert!(writer.push(1, &[1.0]).is_err());
    assert!(writer.is_empty());
}

// =============================================================================
// Backends
// =============================================================================

#[test]
fn mmap_and_seek_backends_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.vecs2");
    let mut writer = DatasetWriter::new(ValueType::Fp16, 2);
    for i in 0..3000u64 {
        writer.push(i * 3, &[i as f64 / 8.0, -(i as f64) / 4.0]).unwrap();
    }
    writer.save(&path).unwrap();

    let mmap = VecsReader::open_mmap(&path).unwrap();
    let seek = VecsReader::open_file(&path).unwrap();
    assert!(mmap.is_valid() && seek.is_valid());
    for i in [0u64, 1, 1023, 1024, 2047, 2999, 3000] {
        assert_eq!(mmap.key(i).unwrap(), seek.key(i).unwrap());
        assert_eq!(mmap.vector(i).unwrap(), seek.vector(i).unwrap());
    }

    let mut mem = VecsReader::new(MemorySource::new(fs::read(&path).unwrap()));
    mem.load().unwrap();
    let from_mem: Vec<_> = mem.entries().map(Result::unwrap).collect();
    let from_mmap: Vec<_> = mmap.entries().map(Result::unwrap).collect();
    assert_eq!(from_mem, from_mmap);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.vecs2");
    assert!(matches!(MmapSource::open(&path), Err(PersistenceError::Io(_))));
    assert!(matches!(FileSource::open(&path), Err(PersistenceError::Io(_))));
}

// =============================================================================
// Ground truth
// =============================================================================

#[test]
fn empty_ground_truth_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gt.bin");
    fs::write(&path, b"").unwrap();
    let mut gt = GroundTruth::new(10, &path);
    assert!(matches!(gt.load(), Err(PersistenceError::Format(_))));
    assert!(gt.is_empty());
}

#[test]
fn ground_truth_with_wrong_embedded_count_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gt.bin");
    // record size for count=1 is 16 bytes, but the record claims 2 entries
    let mut bytes = 2i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0u8; 12]);
    fs::write(&path, bytes).unwrap();
    let mut gt = GroundTruth::new(1, &path);
    assert!(gt.load().is_err());
}
