//! Random-access reader for `.vecs2` datasets.
//!
//! A reader starts unloaded. [`VecsReader::load`] decodes the header and meta
//! region and computes the layout; [`VecsReader::is_valid`] then tells whether
//! the file size agrees with that layout. Every accessor refuses to touch an
//! unloaded or invalid dataset.
//!
//! Keys are served through a sliding cache of [`KEY_CACHE_BATCH`] consecutive
//! keys, so sequential or clustered key lookups cost one bulk read per batch
//! instead of one read per key.

use std::path::Path;

use parking_lot::Mutex;

use super::error::{PersistenceError, PersistenceResult};
use super::format::{decode_keys, DatasetHeader, MetaHeader, Packed, ValueType, KEY_SIZE};
use super::source::{ByteSource, FileSource, MmapSource};
use crate::config::KEY_CACHE_BATCH;

/// Reader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Serve keys through the batch cache. When disabled every lookup is a
    /// single 8-byte read.
    pub key_cache: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { key_cache: true }
    }
}

/// Layout computed by `load()`.
#[derive(Debug, Clone)]
struct Layout {
    header: DatasetHeader,
    meta: Option<MetaHeader>,
    value_type: Option<ValueType>,
    vectors_base: u64,
    keys_base: u64,
}

impl Layout {
    fn vector_size(&self) -> u64 {
        self.meta.as_ref().map_or(0, MetaHeader::vector_size)
    }

    /// File size implied by header and meta, `None` on overflow.
    fn expected_size(&self) -> Option<u64> {
        let n = self.header.num_vectors;
        self.vectors_base
            .checked_add(n.checked_mul(self.vector_size())?)?
            .checked_add(n.checked_mul(KEY_SIZE as u64)?)
    }
}

#[derive(Debug, Default)]
struct KeyCache {
    start: u64,
    keys: Vec<u64>,
}

impl KeyCache {
    fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.start + self.keys.len() as u64
    }
}

/// Reader over one `.vecs2` dataset.
pub struct VecsReader<S> {
    source: S,
    options: ReaderOptions,
    layout: Option<Layout>,
    valid: bool,
    cache: Mutex<KeyCache>,
}

impl VecsReader<MmapSource> {
    /// Open and load a memory-mapped dataset.
    pub fn open_mmap(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let mut reader = Self::new(MmapSource::open(path)?);
        reader.load()?;
        Ok(reader)
    }
}

impl VecsReader<FileSource> {
    /// Open and load a dataset through seek + read.
    pub fn open_file(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let mut reader = Self::new(FileSource::open(path)?);
        reader.load()?;
        Ok(reader)
    }
}

impl<S: ByteSource> VecsReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    pub fn with_options(source: S, options: ReaderOptions) -> Self {
        Self {
            source,
            options,
            layout: None,
            valid: false,
            cache: Mutex::new(KeyCache::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// Decode header and meta and compute the layout.
    ///
    /// Fails only when the header itself cannot be read. A meta region that
    /// cannot be decoded leaves the reader loaded but invalid.
    pub fn load(&mut self) -> PersistenceResult<()> {
        self.unload();

        let size = self.source.size();
        if size < DatasetHeader::SIZE as u64 {
            return Err(PersistenceError::format_detail(
                "dataset shorter than its header",
                DatasetHeader::SIZE,
                size,
            ));
        }
        let header = DatasetHeader::unpack(&self.source.read(0, DatasetHeader::SIZE)?, 0)?;
        let vectors_base = header.vectors_base();

        let meta = self.load_meta(&header);
        let value_type = meta.as_ref().and_then(|m| m.value_type().ok());
        let vector_size = meta.as_ref().map_or(0, MetaHeader::vector_size);
        let keys_base = header
            .num_vectors
            .checked_mul(vector_size)
            .and_then(|bytes| bytes.checked_add(vectors_base))
            .unwrap_or(u64::MAX);

        let layout = Layout {
            header,
            meta,
            value_type,
            vectors_base,
            keys_base,
        };
        self.valid = layout.meta.is_some()
            && layout.value_type.is_some()
            && layout.expected_size() == Some(size);
        if !self.valid {
            tracing::warn!(
                num_vectors = header.num_vectors,
                meta_size = header.meta_size,
                file_size = size,
                expected = ?layout.expected_size(),
                "dataset layout does not match file size"
            );
        } else {
            tracing::debug!(
                num_vectors = header.num_vectors,
                dimension = layout.meta.as_ref().map_or(0, |m| m.dimension),
                "dataset loaded"
            );
        }
        self.layout = Some(layout);
        Ok(())
    }

    fn load_meta(&self, header: &DatasetHeader) -> Option<MetaHeader> {
        if header.meta_size < MetaHeader::FIXED_SIZE as i32 {
            tracing::warn!(meta_size = header.meta_size, "meta region too short");
            return None;
        }
        if self.source.size() < header.vectors_base() {
            tracing::warn!(
                vectors_base = header.vectors_base(),
                file_size = self.source.size(),
                "meta region extends past end of file"
            );
            return None;
        }
        let meta = self
            .source
            .read(header.meta_base(), header.meta_size as usize)
            .and_then(|buf| MetaHeader::unpack(&buf, 0));
        let meta = match meta {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode meta header");
                return None;
            }
        };
        match meta.value_type() {
            Ok(vt) if vt.element_size() as u32 == meta.unit_size => Some(meta),
            Ok(vt) => {
                tracing::warn!(
                    value_type = ?vt,
                    unit_size = meta.unit_size,
                    "unit size does not match value type"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "unsupported meta value type");
                None
            }
        }
    }

    /// Drop the layout and the key cache.
    pub fn unload(&mut self) {
        self.layout = None;
        self.valid = false;
        *self.cache.get_mut() = KeyCache::default();
    }

    pub fn is_loaded(&self) -> bool {
        self.layout.is_some()
    }

    /// True when header, meta and file size all agree.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn header(&self) -> Option<&DatasetHeader> {
        self.layout.as_ref().map(|l| &l.header)
    }

    pub fn meta(&self) -> Option<&MetaHeader> {
        self.layout.as_ref().and_then(|l| l.meta.as_ref())
    }

    /// Number of vectors, 0 when unloaded.
    pub fn num_vectors(&self) -> u64 {
        self.layout.as_ref().map_or(0, |l| l.header.num_vectors)
    }

    pub fn dimension(&self) -> usize {
        self.meta().map_or(0, |m| m.dimension as usize)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.layout.as_ref().and_then(|l| l.value_type)
    }

    fn checked_layout(&self) -> PersistenceResult<(&Layout, ValueType)> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| PersistenceError::InvalidState("dataset is not loaded".into()))?;
        match layout.value_type {
            Some(vt) if self.valid => Ok((layout, vt)),
            _ => Err(PersistenceError::InvalidState("dataset is invalid".into())),
        }
    }

    /// Decoded vector at `index`, `None` past the end.
    pub fn vector(&self, index: u64) -> PersistenceResult<Option<Vec<f64>>> {
        let (layout, value_type) = self.checked_layout()?;
        if index >= layout.header.num_vectors {
            return Ok(None);
        }
        let size = layout.vector_size();
        let bytes = self
            .source
            .read(layout.vectors_base + index * size, size as usize)?;
        let mut out = Vec::new();
        value_type.decode_into(&bytes, &mut out);
        Ok(Some(out))
    }

    /// Vector at `index` narrowed to `f32`, the query representation.
    pub fn vector_f32(&self, index: u64) -> PersistenceResult<Option<Vec<f32>>> {
        Ok(self
            .vector(index)?
            .map(|v| v.into_iter().map(|x| x as f32).collect()))
    }

    /// Key of the vector at `index`, `None` past the end.
    pub fn key(&self, index: u64) -> PersistenceResult<Option<u64>> {
        let (layout, _) = self.checked_layout()?;
        let num_vectors = layout.header.num_vectors;
        if index >= num_vectors {
            return Ok(None);
        }
        if !self.options.key_cache {
            let bytes = self
                .source
                .read(layout.keys_base + index * KEY_SIZE as u64, KEY_SIZE)?;
            return Ok(decode_keys(&bytes).first().copied());
        }

        let mut cache = self.cache.lock();
        if !cache.contains(index) {
            let batch = KEY_CACHE_BATCH as u64;
            let start = index / batch * batch;
            let count = batch.min(num_vectors - start) as usize;
            let bytes = self
                .source
                .read(layout.keys_base + start * KEY_SIZE as u64, count * KEY_SIZE)?;
            cache.keys = decode_keys(&bytes);
            cache.start = start;
        }
        Ok(cache.keys.get((index - cache.start) as usize).copied())
    }

    /// Iterate `(key, vector)` pairs in file order.
    pub fn entries(&self) -> Entries<'_, S> {
        Entries {
            reader: self,
            next: 0,
        }
    }
}

/// Iterator over the `(key, vector)` pairs of a dataset.
pub struct Entries<'a, S> {
    reader: &'a VecsReader<S>,
    next: u64,
}

impl<S: ByteSource> Iterator for Entries<'_, S> {
    type Item = PersistenceResult<(u64, Vec<f64>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next;
        let entry = match (self.reader.key(index), self.reader.vector(index)) {
            (Ok(Some(key)), Ok(Some(vector))) => Ok((key, vector)),
            (Ok(None), _) | (_, Ok(None)) => return None,
            (Err(e), _) | (_, Err(e)) => {
                self.next = u64::MAX;
                Err(e)
            }
        };
        if entry.is_ok() {
            self.next += 1;
        }
        Some(entry)
    }
}
