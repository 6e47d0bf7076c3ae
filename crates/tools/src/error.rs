//! Tool Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A tool error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for external tool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Install the tool or point the config at it.
    #[display("{_0} not found; install it or set its executable path in the config")]
    ToolNotFound(#[error(not(source))] String),
    #[display("conversion profile not found: {}", _0.display())]
    ProfileNotFound(#[error(not(source))] PathBuf),
    /// The process could not be started at all.
    #[display("unable to start {_0}")]
    Spawn(#[error(not(source))] String),
    /// Exited unsuccessfully. `code` is `None` when killed by a signal.
    #[display("{tool} failed (exit code {}): {output}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Failed { tool: String, code: Option<i32>, output: String },
    #[display("{tool} still running after {secs}s; killed")]
    Timeout { tool: String, secs: u64 },
    /// Exited successfully without producing the expected file.
    #[display("expected output was not created: {}", _0.display())]
    MissingOutput(#[error(not(source))] PathBuf),
    /// Local file handling around the call (output directories, staging).
    #[display("unable to prepare {}", _0.display())]
    Prepare(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Timeout { .. } | Self::MissingOutput(_))
    }

    /// Returns `true` if no call to this tool can succeed this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolNotFound(_) | Self::ProfileNotFound(_))
    }
}
