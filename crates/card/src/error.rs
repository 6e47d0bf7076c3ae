//! Card Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A card error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for card operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No mounted volume carries the requested label. Insert the card or
    /// check the label with `offload drives`.
    #[display("no volume labelled \"{_0}\" is mounted")]
    VolumeNotFound(#[error(not(source))] String),
    /// This platform has nowhere to look for volume labels; configure an
    /// explicit volume path instead.
    #[display("volume lookup by label is not supported on this platform")]
    Unsupported,
    /// The path exists but is not a directory.
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// The directory could not be listed at all.
    #[display("unable to read directory: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Cards get re-seated and mounts come and go.
        matches!(self, Self::VolumeNotFound(_) | Self::Unreadable(_))
    }
}
