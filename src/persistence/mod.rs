//! Dataset and ground-truth files.
//!
//! - [`format`]: fixed-layout codec primitives (header, meta, value types)
//! - [`source`]: random-access byte sources (mmap, seek + read, memory)
//! - [`dataset`]: validated random-access reader with a sliding key cache
//! - [`writer`]: dataset writer producing the same layout
//! - [`ground_truth`]: exact top-N records per query and their flat file
//! - [`export`]: plain-text export of dataset vectors
//!
//! All files use little-endian, unpadded, fixed-width fields. See
//! [`format`] for the byte layout.

pub mod dataset;
pub mod error;
pub mod export;
pub mod format;
pub mod ground_truth;
pub mod source;
pub mod writer;

pub use dataset::{ReaderOptions, VecsReader};
pub use error::{PersistenceError, PersistenceResult};
pub use format::{DatasetHeader, MetaHeader, Packed, ValueType};
pub use ground_truth::{GroundTruth, GtRecord, Neighbor, ScoreMatch};
pub use source::{ByteSource, FileSource, MemorySource, MmapSource};
pub use writer::DatasetWriter;
