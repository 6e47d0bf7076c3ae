//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a pipeline failure.
///
/// ### Fatal, the run stops
/// - [`ErrorKind::Volume`]
/// - [`ErrorKind::Scan`]
/// - [`ErrorKind::State`]
/// - [`ErrorKind::MissingTool`]
///
/// ### Per batch, logged and the run carries on
/// - [`ErrorKind::Stage`]
/// - [`ErrorKind::Upload`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The card could not be located.
    #[display("camera card not found")]
    Volume,
    /// The card was found but could not be listed.
    #[display("unable to scan camera card")]
    Scan,
    /// The state file could not be written.
    #[display("unable to persist processed-file state")]
    State,
    /// A run needs a tool that was not supplied.
    #[display("no {_0} configured")]
    MissingTool(#[error(not(source))] &'static str),
    /// Nothing from a batch could be copied into its staging directory.
    #[display("unable to stage {_0} batch")]
    Stage(#[error(not(source))] &'static str),
    #[display("upload of {_0} batch failed")]
    Upload(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Volume | Self::Upload(_) | Self::Stage(_))
    }
}
