//! Random-access byte sources.
//!
//! The dataset reader only ever asks for "`len` bytes at `offset`", so how the
//! bytes reach it is pluggable:
//!
//! - [`MmapSource`]: memory-mapped file, reads borrow straight from the mapping
//! - [`FileSource`]: seek + read on a plain file handle
//! - [`MemorySource`]: owned buffer, mostly for tests and generated datasets
//!
//! All backends share the same contract: a read that does not fit entirely
//! inside the source fails with [`std::io::ErrorKind::UnexpectedEof`] and never
//! returns a partial buffer.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::error::{PersistenceError, PersistenceResult};

/// Read-only, random-access view of a byte sequence.
pub trait ByteSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>>;
}

/// Validate a read against the source size and return it as a slice range.
fn checked_range(offset: u64, len: usize, size: u64) -> PersistenceResult<std::ops::Range<usize>> {
    let end = offset
        .checked_add(len as u64)
        .filter(|&end| end <= size)
        .ok_or_else(|| PersistenceError::out_of_range(offset, len, size))?;
    Ok(offset as usize..end as usize)
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>> {
        (**self).read(offset, len)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>> {
        (**self).read(offset, len)
    }
}

/// Memory-mapped file.
pub struct MmapSource {
    mmap: Mmap,
}

impl MmapSource {
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the file is opened read-only and the mapping is never written
        // through. Concurrent truncation by another process is not supported.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

impl ByteSource for MmapSource {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>> {
        let range = checked_range(offset, len, self.size())?;
        Ok(Cow::Borrowed(&self.mmap[range]))
    }
}

/// Plain file handle read with seek + read.
///
/// The handle is shared behind a mutex so the source stays `Sync`; each read
/// holds the lock for its seek and read.
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let mut file = File::open(path.as_ref())?;
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>> {
        checked_range(offset, len, self.size)?;
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(Cow::Owned(buf))
    }
}

/// Owned in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u64, len: usize) -> PersistenceResult<Cow<'_, [u8]>> {
        let range = checked_range(offset, len, self.size())?;
        Ok(Cow::Borrowed(&self.bytes[range]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&(0u8..=99).collect::<Vec<_>>()).unwrap();
        file.flush().unwrap();
        file
    }

    fn assert_contract(source: &dyn ByteSource) {
        assert_eq!(source.size(), 100);
        assert_eq!(&*source.read(0, 3).unwrap(), &[0, 1, 2]);
        assert_eq!(&*source.read(97, 3).unwrap(), &[97, 98, 99]);
        assert!(source.read(100, 0).unwrap().is_empty());
        assert!(source.read(98, 3).is_err());
        assert!(source.read(101, 0).is_err());
        assert!(source.read(u64::MAX, 2).is_err());
    }

    #[test]
    fn backends_are_interchangeable() {
        let file = sample_file();
        assert_contract(&MmapSource::open(file.path()).unwrap());
        assert_contract(&FileSource::open(file.path()).unwrap());
        assert_contract(&MemorySource::new((0u8..=99).collect()));
    }

    #[test]
    fn out_of_range_read_is_io_error() {
        let source = MemorySource::new(vec![0; 4]);
        match source.read(2, 4) {
            Err(PersistenceError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn boxed_source_delegates() {
        let boxed: Box<dyn ByteSource> = Box::new(MemorySource::new(vec![5, 6, 7]));
        assert_eq!(boxed.size(), 3);
        assert_eq!(&*boxed.read(1, 2).unwrap(), &[6, 7]);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.vecs2");
        assert!(matches!(MmapSource::open(&path), Err(PersistenceError::Io(_))));
        assert!(matches!(FileSource::open(&path), Err(PersistenceError::Io(_))));
    }
}
