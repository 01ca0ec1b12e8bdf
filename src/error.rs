//! Error types for retime.

use thiserror::Error;

/// Main error type for retime operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error acquiring or reading a capture source
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Error creating or writing a destination
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture sources (files and live interfaces).
#[derive(Error, Debug)]
pub enum SourceError {
    /// Capture file could not be opened
    #[error("could not open capture file: {path}")]
    FileOpen { path: String },

    /// Malformed capture file
    #[error("invalid capture format: {reason}")]
    InvalidFormat { reason: String },

    /// Capture file version other than 2.4
    #[error("unsupported capture version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Capture file link type other than Ethernet
    #[error("unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u16 },

    /// Capture file magic other than micro/nanosecond
    #[error("unsupported capture magic: {magic:#010x}")]
    UnsupportedMagic { magic: u32 },

    /// Live interface could not be acquired
    #[error("could not acquire interface {name}: {reason}")]
    Interface { name: String, reason: String },
}

/// Errors related to output destinations.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Destination could not be created
    #[error("could not open destination for writing: {path}")]
    Create { path: String },

    /// Date pattern rejected by the formatter
    #[error("bad time format string: {pattern}")]
    InvalidDateFormat { pattern: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
