//! Error types for lsm-wal.

use std::io;
use thiserror::Error;

/// Result type alias for log and batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for log and batch operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from the destination sink or file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Data corruption detected while decoding.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::CrcMismatch { .. })
    }
}
