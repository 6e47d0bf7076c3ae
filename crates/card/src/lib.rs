//! Finding the memory card and working out what is on it.

mod catalog;
pub mod error;
mod scan;
mod volume;

pub use crate::catalog::{Catalog, FileKind, FileRecord};
pub use crate::scan::{JPEG_EXTENSIONS, scan};
#[cfg(windows)]
pub use crate::volume::DriveLetters;
pub use crate::volume::{FixedPath, MountRoots, Volume, VolumeResolver, platform_resolver};
