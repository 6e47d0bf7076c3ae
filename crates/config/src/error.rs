//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No home directory to derive per-user locations from.
    #[display("unable to determine per-user config and data directories")]
    NoHomeDirectory,
    /// A config file was named explicitly but doesn't exist.
    #[display("config file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Config file extension isn't one of toml, json, yaml or yml.
    #[display("unsupported config format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// The configuration parsed but is not usable; the message says which
    /// setting to fix.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    #[display("refusing to overwrite existing file: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    #[display("unable to write config file: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}
