//! Error types for procstats-core.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for tracker operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O errors from the persistence layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural errors while decoding a stats blob.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Structural rejection while decoding a persisted stats blob.
///
/// Any of these aborts the load wholesale: the caller discards everything
/// decoded so far and falls back to a freshly reset state. The on-disk file
/// is never modified by a failed read.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("bad magic number: 0x{got:08x}")]
    BadMagic { got: u32 },

    #[error("unsupported format version: {got}")]
    BadVersion { got: i32 },

    #[error("bad {what} constant: expected {expected}, got {got}")]
    BadConstant {
        what: &'static str,
        expected: i32,
        got: i32,
    },

    #[error("bad {what} count: {got}")]
    BadCount { what: &'static str, got: i32 },

    #[error("bad {what} table entry: 0x{raw:08x}")]
    BadOffset { what: &'static str, raw: u32 },

    #[error("{what} table entries out of order")]
    UnsortedTable { what: &'static str },

    #[error("bad {what} string")]
    BadString { what: &'static str },

    #[error("no common process for per-package entry: {name}")]
    MissingCommonProcess { name: String },

    #[error("truncated input: {0}")]
    Truncated(#[from] std::io::Error),
}
