//! Error types for the framewalk binary and its capture reader.

use thiserror::Error;

/// Main error type for framewalk front-end operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture file
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error from the dissection and reassembly engine
    #[error(transparent)]
    Core(#[from] framewalk_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Not a pcap or pcapng file, or damaged
    #[error("Invalid capture format: {reason}")]
    InvalidFormat { reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
