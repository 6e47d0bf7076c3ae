//! State Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A state error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The state file exists but could not be read.
    #[display("unable to read state file: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The state file parsed as neither the current nor the legacy schema.
    /// Fix or delete the file by hand; it will not be overwritten.
    #[display("state file is corrupt: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// The state could not be written (including the final rename).
    #[display("unable to write state file: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    #[display("unable to serialize state")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}
