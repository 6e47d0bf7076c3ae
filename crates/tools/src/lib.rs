//! The external programs that do the actual work: a RAW converter, an
//! optional normalizer that runs first, and an uploader.
//!
//! Each sits behind a trait so the pipeline can be driven by fakes in tests.
//! The real implementations shell out through [`Tool`], which is located up
//! front with [`ToolSpec::locate`] so a missing program fails the run before
//! any file is touched.

mod convert;
mod discover;
pub mod error;
mod exec;
mod normalize;
mod upload;

pub use crate::convert::{Converter, RawTherapee};
pub use crate::discover::{DNG_CONVERTER, IMMICH_GO, RAWTHERAPEE, ToolSpec};
pub use crate::exec::Tool;
pub use crate::normalize::{DngConverter, Normalizer};
pub use crate::upload::{ImmichGo, ImmichSettings, Uploader};
