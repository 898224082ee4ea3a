//! Ground-truth records and the flat ground-truth file.
//!
//! # Record Format
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ count (4B, i32)                      │
//! ├──────────────────────────────────────┤
//! │ count × entry (12B each):            │
//! │   - pk    u64                        │
//! │   - score f32                        │
//! └──────────────────────────────────────┘
//! ```
//!
//! A ground-truth file is a flat concatenation of records, one per query, in
//! query order. Every record in one file has the same `count`.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{PersistenceError, PersistenceResult};
use super::format::{FieldReader, Packed};
use crate::config::DEFAULT_TOLERANCE;

/// One search result: primary key and score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub pk: u64,
    pub score: f32,
}

impl Neighbor {
    pub fn new(pk: u64, score: f32) -> Self {
        Self { pk, score }
    }
}

impl Packed for Neighbor {
    const SIZE: usize = 12;

    fn pack_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pk.to_le_bytes());
        out.extend_from_slice(&self.score.to_le_bytes());
    }

    fn unpack(buf: &[u8], offset: usize) -> PersistenceResult<Self> {
        let mut r = FieldReader::new(buf, offset);
        Ok(Self {
            pk: r.u64()?,
            score: r.f32()?,
        })
    }
}

/// How two scores are compared when matching result sets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScoreMatch {
    /// Bitwise value equality (`0.0` and `-0.0` compare equal).
    #[default]
    Exact,
    /// Relative tolerance, `|a - b| <= rel_tol * max(|a|, |b|)`.
    Tolerant { rel_tol: f32 },
}

impl ScoreMatch {
    pub fn tolerant() -> Self {
        ScoreMatch::Tolerant {
            rel_tol: DEFAULT_TOLERANCE,
        }
    }
}

fn score_key(score: f32) -> u32 {
    if score == 0.0 {
        0
    } else {
        score.to_bits()
    }
}

fn is_close(a: f32, b: f32, rel_tol: f32) -> bool {
    a == b || (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

/// Membership test for the scores of one record prefix.
enum ScoreSet {
    Exact(HashSet<u32>),
    Tolerant { scores: Vec<f32>, rel_tol: f32 },
}

impl ScoreSet {
    fn new(scores: impl Iterator<Item = f32>, mode: ScoreMatch) -> Self {
        match mode {
            ScoreMatch::Exact => ScoreSet::Exact(scores.map(score_key).collect()),
            ScoreMatch::Tolerant { rel_tol } => ScoreSet::Tolerant {
                scores: scores.collect(),
                rel_tol,
            },
        }
    }

    fn contains(&self, score: f32) -> bool {
        match self {
            ScoreSet::Exact(set) => set.contains(&score_key(score)),
            ScoreSet::Tolerant { scores, rel_tol } => {
                scores.iter().any(|&s| is_close(s, score, *rel_tol))
            }
        }
    }
}

/// Ordered result list of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GtRecord {
    recalls: Vec<Neighbor>,
}

impl GtRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded size of a record with `count` entries.
    pub fn size_for(count: usize) -> usize {
        4 + count * Neighbor::SIZE
    }

    pub fn count(&self) -> usize {
        self.recalls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recalls.is_empty()
    }

    pub fn append(&mut self, neighbor: Neighbor) {
        self.recalls.push(neighbor);
    }

    /// The first `end` entries.
    pub fn entries(&self, end: usize) -> &[Neighbor] {
        &self.recalls[..end.min(self.recalls.len())]
    }

    pub fn all(&self) -> &[Neighbor] {
        &self.recalls
    }

    pub fn find(&self, pk: u64) -> Option<&Neighbor> {
        self.recalls.iter().find(|r| r.pk == pk)
    }

    pub fn exists(&self, pk: u64) -> bool {
        self.find(pk).is_some()
    }

    pub fn pk_set(&self, end: usize) -> HashSet<u64> {
        self.entries(end).iter().map(|r| r.pk).collect()
    }

    pub fn score_list(&self, end: usize) -> Vec<f32> {
        self.entries(end).iter().map(|r| r.score).collect()
    }

    fn partition_by<F, R>(&self, keep: F, nums: usize, mut receiver: R) -> Vec<Neighbor>
    where
        F: Fn(&Neighbor) -> bool,
        R: FnMut(&Neighbor),
    {
        let mut results = Vec::new();
        for r in self.entries(nums) {
            if keep(r) {
                results.push(*r);
            } else {
                receiver(r);
            }
        }
        results
    }

    /// Entries among the first `nums` whose pk also appears in the first
    /// `nums` of `other`; the rest go to `receiver`.
    pub fn filter_pk<R: FnMut(&Neighbor)>(
        &self,
        other: &GtRecord,
        nums: usize,
        receiver: R,
    ) -> Vec<Neighbor> {
        let pks = other.pk_set(nums);
        self.partition_by(|r| pks.contains(&r.pk), nums, receiver)
    }

    /// Complement of [`GtRecord::filter_pk`].
    pub fn filter_pk_not_in<R: FnMut(&Neighbor)>(
        &self,
        other: &GtRecord,
        nums: usize,
        receiver: R,
    ) -> Vec<Neighbor> {
        let pks = other.pk_set(nums);
        self.partition_by(|r| !pks.contains(&r.pk), nums, receiver)
    }

    /// Entries among the first `nums` whose score also appears among the
    /// scores of the first `nums` of `other`; the rest go to `receiver`.
    ///
    /// Matching is by score value only: an entry matches even if a different
    /// pk produced the same score in `other`.
    pub fn filter_score<R: FnMut(&Neighbor)>(
        &self,
        other: &GtRecord,
        nums: usize,
        mode: ScoreMatch,
        receiver: R,
    ) -> Vec<Neighbor> {
        let scores = ScoreSet::new(other.entries(nums).iter().map(|r| r.score), mode);
        self.partition_by(|r| scores.contains(r.score), nums, receiver)
    }

    /// Complement of [`GtRecord::filter_score`]: the mismatched entries.
    pub fn filter_score_not_in<R: FnMut(&Neighbor)>(
        &self,
        other: &GtRecord,
        nums: usize,
        mode: ScoreMatch,
        receiver: R,
    ) -> Vec<Neighbor> {
        let scores = ScoreSet::new(other.entries(nums).iter().map(|r| r.score), mode);
        self.partition_by(|r| !scores.contains(r.score), nums, receiver)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::size_for(self.recalls.len()));
        out.extend_from_slice(&(self.recalls.len() as i32).to_le_bytes());
        for r in &self.recalls {
            r.pack_into(&mut out);
        }
        out
    }

    /// Decode a record that must hold exactly `count` entries.
    pub fn unpack(buf: &[u8], offset: usize, count: usize) -> PersistenceResult<Self> {
        let stored = FieldReader::new(buf, offset).i32()?;
        if stored < 0 || stored as usize != count {
            return Err(PersistenceError::format_detail(
                "ground-truth record count",
                count,
                stored,
            ));
        }
        let recalls = (0..count)
            .map(|i| Neighbor::unpack(buf, offset + 4 + i * Neighbor::SIZE))
            .collect::<PersistenceResult<Vec<_>>>()?;
        Ok(Self { recalls })
    }
}

impl From<Vec<Neighbor>> for GtRecord {
    fn from(recalls: Vec<Neighbor>) -> Self {
        Self { recalls }
    }
}

impl FromIterator<Neighbor> for GtRecord {
    fn from_iter<I: IntoIterator<Item = Neighbor>>(iter: I) -> Self {
        Self {
            recalls: iter.into_iter().collect(),
        }
    }
}

/// Ground-truth file with a fixed number of entries per record.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    count: usize,
    path: PathBuf,
    records: Vec<GtRecord>,
}

impl GroundTruth {
    pub fn new(count: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            count,
            path: path.into(),
            records: Vec::new(),
        }
    }

    /// Entries per record.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_size(&self) -> usize {
        GtRecord::size_for(self.count)
    }

    /// Read every record of the file, replacing the in-memory records.
    pub fn load(&mut self) -> PersistenceResult<()> {
        let size = fs::metadata(&self.path)?.len();
        let record_size = self.record_size() as u64;
        if size == 0 || size % record_size != 0 {
            tracing::error!(
                path = %self.path.display(),
                size,
                record_size,
                "ground-truth file size is not a multiple of the record size"
            );
            return Err(PersistenceError::Format(format!(
                "ground-truth file {} has {size} bytes, expected a positive multiple of {record_size}",
                self.path.display()
            )));
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buf = vec![0u8; record_size as usize];
        let mut records = Vec::with_capacity((size / record_size) as usize);
        for _ in 0..size / record_size {
            reader.read_exact(&mut buf)?;
            records.push(GtRecord::unpack(&buf, 0, self.count)?);
        }
        self.records = records;
        tracing::debug!(records = self.records.len(), "ground truth loaded");
        Ok(())
    }

    pub fn unload(&mut self) {
        self.records.clear();
    }

    /// Record of query `idx`.
    pub fn record(&self, idx: usize) -> Option<&GtRecord> {
        self.records.get(idx)
    }

    pub fn records(&self) -> std::slice::Iter<'_, GtRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record; it must hold exactly [`GroundTruth::count`] entries.
    pub fn append(&mut self, record: GtRecord) -> PersistenceResult<()> {
        if record.count() != self.count {
            return Err(PersistenceError::format_detail(
                "ground-truth record count",
                self.count,
                record.count(),
            ));
        }
        self.records.push(record);
        Ok(())
    }

    /// Rewrite the file with all in-memory records.
    pub fn serialize(&self) -> PersistenceResult<()> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        for record in &self.records {
            out.write_all(&record.pack())?;
        }
        out.flush()?;
        tracing::info!(
            path = %self.path.display(),
            records = self.records.len(),
            "ground truth written"
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a GroundTruth {
    type Item = &'a GtRecord;
    type IntoIter = std::slice::Iter<'a, GtRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
