//! Error types for MDL/MDG parsing

use std::io;
use thiserror::Error;

/// Error types for model header and geometry stream decoding
#[derive(Error, Debug)]
pub enum MdlError {
    /// I/O Error during reading
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header failed every parse strategy, or a sanity-checked count/offset
    /// is out of bounds
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// A declared size or offset exceeds the buffer
    #[error("Truncated data: need {needed} bytes at offset {offset}, buffer has {available}")]
    TruncatedData {
        /// Offset of the attempted read
        offset: usize,
        /// Bytes the read required
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// No geometry could be recovered from the stream
    #[error("Ambiguous geometry: {0}")]
    AmbiguousGeometry(String),

    /// Decode cancelled via the advisory cancellation flag
    #[error("Decode cancelled")]
    Cancelled,
}

/// Result type using `MdlError`
pub type Result<T> = std::result::Result<T, MdlError>;

impl MdlError {
    /// Create a new `MalformedHeader` error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        MdlError::MalformedHeader(msg.into())
    }

    /// Create a new `AmbiguousGeometry` error
    pub fn ambiguous<S: Into<String>>(msg: S) -> Self {
        MdlError::AmbiguousGeometry(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MdlError::TruncatedData {
            offset: 100,
            needed: 12,
            available: 104,
        };
        assert_eq!(
            err.to_string(),
            "Truncated data: need 12 bytes at offset 100, buffer has 104"
        );

        let err = MdlError::malformed("component count 50000 exceeds limit");
        assert!(err.to_string().starts_with("Malformed header"));
    }
}
