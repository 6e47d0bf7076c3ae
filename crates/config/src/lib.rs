//! Configuration for offload: one [`Config`] value built at startup and passed
//! to everything that needs it.

pub mod error;
mod load;
mod paths;
mod settings;

pub use crate::load::{load, write_sample};
pub use crate::paths::Paths;
pub use crate::settings::{Config, ConvertConfig, NormalizeConfig, ToolsConfig, UploadConfig, VolumeConfig};
