//! Error types for dataset and ground-truth file access.

use thiserror::Error;

/// Errors that can occur while reading or writing `.vecs2` datasets and
/// ground-truth files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, out-of-range reads from a byte source)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural format error (short file, misaligned records, bad header)
    #[error("format error: {0}")]
    Format(String),

    /// Serialization error (attachment or report JSON)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Operation not allowed in the current state (unloaded or invalid dataset)
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration or argument
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PersistenceError {
    /// Format error carrying the expected and actual values.
    pub(crate) fn format_detail(
        message: &str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::Format(format!("{message} (expected: {expected}, actual: {actual})"))
    }

    /// I/O error for a read that falls outside the source.
    pub(crate) fn out_of_range(offset: u64, len: usize, size: u64) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("read of {len} bytes at offset {offset} exceeds source size {size}"),
        ))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Deserialization(format!("json error: {e}"))
        } else {
            Self::Serialization(format!("json error: {e}"))
        }
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_is_unexpected_eof() {
        match PersistenceError::out_of_range(10, 4, 12) {
            PersistenceError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn format_detail_mentions_both_values() {
        let msg = PersistenceError::format_detail("size mismatch", 64, 12).to_string();
        assert!(msg.contains("expected: 64"));
        assert!(msg.contains("actual: 12"));
    }

    #[test]
    fn json_syntax_error_maps_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(
            PersistenceError::from(err),
            PersistenceError::Deserialization(_)
        ));
    }
}
