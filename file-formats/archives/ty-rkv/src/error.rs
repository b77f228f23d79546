//! Error types for the RKV library

use std::io;
use thiserror::Error;

/// Result type alias for RKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RKV operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File is not a recognized RKV container
    #[error("Unknown archive format: {0}")]
    UnknownFormat(String),

    /// File not found in archive
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A declared record range exceeds the container file
    #[error("Truncated data for {name}: record needs {expected} bytes, container has {actual}")]
    TruncatedData {
        /// Name of the record whose range overflows
        name: String,
        /// End of the declared range
        expected: u64,
        /// Actual container size
        actual: u64,
    },

    /// A name or count is not representable in the target layout
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

impl Error {
    /// Create a new `UnknownFormat` error
    pub fn unknown_format<S: Into<String>>(msg: S) -> Self {
        Error::UnknownFormat(msg.into())
    }

    /// Check if this error is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::FileNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_format("no trailer");
        assert_eq!(err.to_string(), "Unknown archive format: no trailer");

        let err = Error::FileNotFound("boss.mdl".to_string());
        assert_eq!(err.to_string(), "File not found: boss.mdl");
        assert!(err.is_recoverable());
    }
}
