//! On-disk layout of `.vecs2` datasets.
//!
//! # File Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ DatasetHeader (12B):                    │
//! │   - num_vectors   u64                   │
//! │   - meta_size     i32                   │
//! ├─────────────────────────────────────────┤
//! │ Meta region (meta_size B):              │
//! │   - MetaHeader fixed prefix (64B)       │
//! │   - JSON attachment (optional)          │
//! ├─────────────────────────────────────────┤
//! │ Vector array:                           │
//! │   - num_vectors × dimension scalars     │
//! ├─────────────────────────────────────────┤
//! │ Key array:                              │
//! │   - num_vectors × u64                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Encoding
//!
//! Every multi-byte field is little-endian, fixed width and unpadded. This is
//! the canonical encoding for files produced and consumed by this crate; files
//! written with host-native packing on a little-endian 64-bit machine happen
//! to share it.
//!
//! Meta prefix byte offsets:
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0 | header_size | u32 |
//! | 4 | major_order | u16 |
//! | 6 | value_type | u16 |
//! | 8 | dimension | u32 |
//! | 12 | unit_size | u32 |
//! | 16 | space_id | u64 |
//! | 24 | attachment_offset | u32 |
//! | 28 | attachment_size | u32 |
//! | 32 | reserve | \[u32; 8\] |

use serde::{Deserialize, Serialize};

use super::error::{PersistenceError, PersistenceResult};

/// Conventional extension of dataset files.
pub const DATASET_EXTENSION: &str = "vecs2";

/// Size of one key record.
pub const KEY_SIZE: usize = 8;

/// Fixed-layout value that can be packed to and unpacked from a byte buffer.
pub trait Packed: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded bytes to `out`.
    fn pack_into(&self, out: &mut Vec<u8>);

    /// Decode a value starting at `offset` in `buf`.
    fn unpack(buf: &[u8], offset: usize) -> PersistenceResult<Self>;

    /// Encode into a fresh buffer of exactly [`Packed::SIZE`] bytes.
    fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.pack_into(&mut out);
        out
    }
}

/// Little-endian field reader over a byte slice.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    fn take<const N: usize>(&mut self) -> PersistenceResult<[u8; N]> {
        let end = self
            .pos
            .checked_add(N)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                PersistenceError::format_detail(
                    "truncated buffer",
                    self.pos.saturating_add(N),
                    self.buf.len(),
                )
            })?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u16(&mut self) -> PersistenceResult<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> PersistenceResult<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&mut self) -> PersistenceResult<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> PersistenceResult<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    pub(crate) fn f32(&mut self) -> PersistenceResult<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }
}

/// Decode a contiguous little-endian `u64` array.
pub(crate) fn decode_keys(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(KEY_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; KEY_SIZE];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw)
        })
        .collect()
}

// ============ Dataset header ============

/// Fixed 12-byte header at the start of every dataset file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    /// Number of vectors (and keys) in the file
    pub num_vectors: u64,
    /// Size of the meta region that follows the header
    pub meta_size: i32,
}

impl DatasetHeader {
    pub fn new(num_vectors: u64, meta_size: i32) -> Self {
        Self {
            num_vectors,
            meta_size,
        }
    }

    /// Offset of the meta region.
    pub fn meta_base(&self) -> u64 {
        Self::SIZE as u64
    }

    /// Offset of the first vector record.
    ///
    /// A negative `meta_size` is treated as zero; such headers never produce a
    /// valid dataset because the meta region cannot be decoded.
    pub fn vectors_base(&self) -> u64 {
        self.meta_base() + self.meta_size.max(0) as u64
    }
}

impl Packed for DatasetHeader {
    const SIZE: usize = 12;

    fn pack_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.num_vectors.to_le_bytes());
        out.extend_from_slice(&self.meta_size.to_le_bytes());
    }

    fn unpack(buf: &[u8], offset: usize) -> PersistenceResult<Self> {
        let mut r = FieldReader::new(buf, offset);
        Ok(Self {
            num_vectors: r.u64()?,
            meta_size: r.i32()?,
        })
    }
}

// ============ Value types ============

/// Scalar type of the vector elements.
///
/// Codes follow the feature-type numbering of the dataset producer; codes not
/// listed here (binary and 4-bit types) are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ValueType {
    /// IEEE 754 half precision
    Fp16 = 3,
    /// IEEE 754 single precision
    Fp32 = 4,
    /// IEEE 754 double precision
    Fp64 = 5,
    /// Signed 8-bit integer
    Int8 = 6,
    /// Signed 16-bit integer
    Int16 = 7,
}

impl TryFrom<u16> for ValueType {
    type Error = PersistenceError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(ValueType::Fp16),
            4 => Ok(ValueType::Fp32),
            5 => Ok(ValueType::Fp64),
            6 => Ok(ValueType::Int8),
            7 => Ok(ValueType::Int16),
            other => Err(PersistenceError::Format(format!(
                "unsupported value type code {other}"
            ))),
        }
    }
}

impl ValueType {
    /// Numeric code stored in the meta header.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Bytes per scalar.
    pub fn element_size(self) -> usize {
        match self {
            ValueType::Fp16 => 2,
            ValueType::Fp32 => 4,
            ValueType::Fp64 => 8,
            ValueType::Int8 => 1,
            ValueType::Int16 => 2,
        }
    }

    /// Decimal digits kept when decoding, `None` for integer types.
    pub fn precision(self) -> Option<u32> {
        match self {
            ValueType::Fp16 => Some(3),
            ValueType::Fp32 => Some(6),
            ValueType::Fp64 => Some(10),
            ValueType::Int8 | ValueType::Int16 => None,
        }
    }

    pub fn is_float(self) -> bool {
        self.precision().is_some()
    }

    /// Decode `bytes` (a whole number of scalars) into `out`, applying the
    /// per-type rounding.
    pub fn decode_into(self, bytes: &[u8], out: &mut Vec<f64>) {
        let size = self.element_size();
        out.reserve(bytes.len() / size);
        for chunk in bytes.chunks_exact(size) {
            let raw = match self {
                ValueType::Fp16 => half::f16::from_le_bytes([chunk[0], chunk[1]]).to_f64(),
                ValueType::Fp32 => {
                    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                }
                ValueType::Fp64 => {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(chunk);
                    f64::from_le_bytes(b)
                }
                ValueType::Int8 => chunk[0] as i8 as f64,
                ValueType::Int16 => i16::from_le_bytes([chunk[0], chunk[1]]) as f64,
            };
            out.push(match self.precision() {
                Some(digits) => round_to(raw, digits),
                None => raw,
            });
        }
    }

    /// Encode `values` as scalars of this type. Integer types round to the
    /// nearest value and saturate at the type bounds.
    pub fn encode_into(self, values: &[f64], out: &mut Vec<u8>) {
        out.reserve(values.len() * self.element_size());
        for &v in values {
            match self {
                ValueType::Fp16 => out.extend_from_slice(&half::f16::from_f64(v).to_le_bytes()),
                ValueType::Fp32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
                ValueType::Fp64 => out.extend_from_slice(&v.to_le_bytes()),
                ValueType::Int8 => out.push((v.round() as i8) as u8),
                ValueType::Int16 => out.extend_from_slice(&(v.round() as i16).to_le_bytes()),
            }
        }
    }
}

/// Round `value` to `digits` decimal places.
///
/// Values whose scaled magnitude no longer fits the mantissa are returned
/// unchanged.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    let scaled = value * scale;
    if !scaled.is_finite() || scaled.abs() >= 2f64.powi(52) {
        return value;
    }
    scaled.round() / scale
}

// ============ Meta header ============

/// Vector meta information stored after the dataset header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaHeader {
    pub header_size: u32,
    pub major_order: u16,
    /// Raw value type code, see [`ValueType`]
    pub value_type: u16,
    pub dimension: u32,
    /// Bytes per scalar
    pub unit_size: u32,
    pub space_id: u64,
    /// Attachment offset relative to the start of the meta region
    pub attachment_offset: u32,
    pub attachment_size: u32,
    pub reserve: [u32; 8],
    /// Decoded JSON attachment
    pub attachment: serde_json::Map<String, serde_json::Value>,
}

impl MetaHeader {
    /// Size of the fixed prefix.
    pub const FIXED_SIZE: usize = 64;

    pub fn new(value_type: ValueType, dimension: u32) -> Self {
        Self {
            header_size: Self::FIXED_SIZE as u32,
            major_order: 0,
            value_type: value_type.code(),
            dimension,
            unit_size: value_type.element_size() as u32,
            space_id: 0,
            attachment_offset: 0,
            attachment_size: 0,
            reserve: [0; 8],
            attachment: serde_json::Map::new(),
        }
    }

    /// Replace the attachment, placing it right after the fixed prefix.
    pub fn set_attachment(
        &mut self,
        attachment: serde_json::Map<String, serde_json::Value>,
    ) -> PersistenceResult<()> {
        if attachment.is_empty() {
            self.attachment_offset = 0;
            self.attachment_size = 0;
        } else {
            let encoded = serde_json::to_vec(&attachment)?;
            self.attachment_offset = Self::FIXED_SIZE as u32;
            self.attachment_size = u32::try_from(encoded.len()).map_err(|_| {
                PersistenceError::InvalidConfig("attachment larger than 4 GiB".into())
            })?;
        }
        self.attachment = attachment;
        Ok(())
    }

    /// Resolve the value type code.
    pub fn value_type(&self) -> PersistenceResult<ValueType> {
        ValueType::try_from(self.value_type)
    }

    /// Bytes per vector record.
    pub fn vector_size(&self) -> u64 {
        self.unit_size as u64 * self.dimension as u64
    }

    /// Encoded size of the whole meta region.
    pub fn size(&self) -> usize {
        if self.attachment_size == 0 {
            Self::FIXED_SIZE
        } else {
            Self::FIXED_SIZE.max(self.attachment_offset as usize + self.attachment_size as usize)
        }
    }

    pub fn pack(&self) -> PersistenceResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.extend_from_slice(&self.major_order.to_le_bytes());
        out.extend_from_slice(&self.value_type.to_le_bytes());
        out.extend_from_slice(&self.dimension.to_le_bytes());
        out.extend_from_slice(&self.unit_size.to_le_bytes());
        out.extend_from_slice(&self.space_id.to_le_bytes());
        out.extend_from_slice(&self.attachment_offset.to_le_bytes());
        out.extend_from_slice(&self.attachment_size.to_le_bytes());
        for r in &self.reserve {
            out.extend_from_slice(&r.to_le_bytes());
        }

        if self.attachment_size > 0 {
            let encoded = serde_json::to_vec(&self.attachment)?;
            if encoded.len() != self.attachment_size as usize {
                return Err(PersistenceError::format_detail(
                    "attachment size mismatch",
                    self.attachment_size,
                    encoded.len(),
                ));
            }
            let offset = self.attachment_offset as usize;
            if offset < Self::FIXED_SIZE {
                return Err(PersistenceError::Format(format!(
                    "attachment offset {offset} overlaps the fixed meta prefix"
                )));
            }
            out.resize(offset, 0);
            out.extend_from_slice(&encoded);
        }
        Ok(out)
    }

    /// Decode the meta region. `buf` must hold the whole region starting at
    /// `offset`; the attachment offset is relative to `offset`.
    pub fn unpack(buf: &[u8], offset: usize) -> PersistenceResult<Self> {
        let mut r = FieldReader::new(buf, offset);
        let header_size = r.u32()?;
        let major_order = r.u16()?;
        let value_type = r.u16()?;
        let dimension = r.u32()?;
        let unit_size = r.u32()?;
        let space_id = r.u64()?;
        let attachment_offset = r.u32()?;
        let attachment_size = r.u32()?;
        let mut reserve = [0u32; 8];
        for slot in reserve.iter_mut() {
            *slot = r.u32()?;
        }

        let mut attachment = serde_json::Map::new();
        if attachment_size > 0 {
            let start = offset + attachment_offset as usize;
            let end = start + attachment_size as usize;
            let raw = buf.get(start..end).ok_or_else(|| {
                PersistenceError::format_detail("attachment outside meta region", end, buf.len())
            })?;
            match serde_json::from_slice::<serde_json::Value>(raw)? {
                serde_json::Value::Object(map) => attachment = map,
                other => {
                    return Err(PersistenceError::Deserialization(format!(
                        "attachment is not a JSON object: {other}"
                    )))
                }
            }
        }

        Ok(Self {
            header_size,
            major_order,
            value_type,
            dimension,
            unit_size,
            space_id,
            attachment_offset,
            attachment_size,
            reserve,
            attachment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_header_roundtrip() {
        let header = DatasetHeader::new(1_000_000, 96);
        let bytes = header.pack();
        assert_eq!(bytes.len(), DatasetHeader::SIZE);
        assert_eq!(DatasetHeader::unpack(&bytes, 0).unwrap(), header);
        assert_eq!(header.meta_base(), 12);
        assert_eq!(header.vectors_base(), 108);
    }

    #[test]
    fn dataset_header_at_offset() {
        let mut buf = vec![0xAA; 5];
        DatasetHeader::new(7, 64).pack_into(&mut buf);
        let header = DatasetHeader::unpack(&buf, 5).unwrap();
        assert_eq!(header.num_vectors, 7);
        assert_eq!(header.meta_size, 64);
    }

    #[test]
    fn short_header_is_format_error() {
        let err = DatasetHeader::unpack(&[0u8; 11], 0).unwrap_err();
        assert!(matches!(err, PersistenceError::Format(_)));
    }

    #[test]
    fn value_type_codes() {
        assert_eq!(ValueType::try_from(3).unwrap(), ValueType::Fp16);
        assert_eq!(ValueType::try_from(4).unwrap(), ValueType::Fp32);
        assert_eq!(ValueType::try_from(5).unwrap(), ValueType::Fp64);
        assert_eq!(ValueType::try_from(6).unwrap(), ValueType::Int8);
        assert_eq!(ValueType::try_from(7).unwrap(), ValueType::Int16);
        assert!(ValueType::try_from(0).is_err());
        assert!(ValueType::try_from(8).is_err());
    }

    #[test]
    fn decode_applies_precision() {
        let mut bytes = Vec::new();
        ValueType::Fp32.encode_into(&[0.123_456_78, -1.5], &mut bytes);
        let mut out = Vec::new();
        ValueType::Fp32.decode_into(&bytes, &mut out);
        assert_eq!(out, vec![0.123457, -1.5]);

        let mut bytes = Vec::new();
        ValueType::Fp16.encode_into(&[0.333_333], &mut bytes);
        let mut out = Vec::new();
        ValueType::Fp16.decode_into(&bytes, &mut out);
        assert_eq!(out, vec![0.333]);
    }

    #[test]
    fn integer_types_are_not_rounded() {
        let mut bytes = Vec::new();
        ValueType::Int16.encode_into(&[-300.0, 12.0, 40_000.0], &mut bytes);
        let mut out = Vec::new();
        ValueType::Int16.decode_into(&bytes, &mut out);
        assert_eq!(out, vec![-300.0, 12.0, i16::MAX as f64]);

        let mut bytes = Vec::new();
        ValueType::Int8.encode_into(&[-7.0, 100.0], &mut bytes);
        assert_eq!(bytes, vec![(-7i8) as u8, 100]);
    }

    #[test]
    fn meta_prefix_is_64_bytes() {
        let meta = MetaHeader::new(ValueType::Fp32, 128);
        let bytes = meta.pack().unwrap();
        assert_eq!(bytes.len(), MetaHeader::FIXED_SIZE);
        assert_eq!(meta.vector_size(), 512);
        // value type at offset 6, dimension at offset 8
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 4);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 128);
    }

    #[test]
    fn meta_roundtrip_with_attachment() {
        let mut meta = MetaHeader::new(ValueType::Fp64, 16);
        meta.space_id = 42;
        meta.reserve[3] = 9;
        let mut attachment = serde_json::Map::new();
        attachment.insert("measure".into(), serde_json::json!("SquaredEuclidean"));
        attachment.insert("nlist".into(), serde_json::json!(1024));
        meta.set_attachment(attachment).unwrap();

        let bytes = meta.pack().unwrap();
        assert_eq!(bytes.len(), meta.size());
        let parsed = MetaHeader::unpack(&bytes, 0).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.attachment["nlist"], serde_json::json!(1024));
    }

    #[test]
    fn attachment_outside_region_is_rejected() {
        let mut meta = MetaHeader::new(ValueType::Fp32, 4);
        let mut attachment = serde_json::Map::new();
        attachment.insert("k".into(), serde_json::json!(1));
        meta.set_attachment(attachment).unwrap();
        let bytes = meta.pack().unwrap();

        let truncated = &bytes[..bytes.len() - 1];
        assert!(MetaHeader::unpack(truncated, 0).is_err());
    }

    #[test]
    fn non_object_attachment_is_rejected() {
        let mut bytes = MetaHeader::new(ValueType::Fp32, 4).pack().unwrap();
        bytes[24..28].copy_from_slice(&64u32.to_le_bytes());
        bytes[28..32].copy_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"[1]");
        assert!(matches!(
            MetaHeader::unpack(&bytes, 0),
            Err(PersistenceError::Deserialization(_))
        ));
    }

    #[test]
    fn round_to_handles_large_values() {
        assert_eq!(round_to(1.234_567_891_23, 10), 1.234_567_891_2);
        assert_eq!(round_to(1e300, 10), 1e300);
        assert!(round_to(f64::NAN, 6).is_nan());
    }
}
