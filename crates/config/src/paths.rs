use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::OptionExt;
use std::path::{Path, PathBuf};

/// Per-user file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Paths {
    /// Platform locations, e.g. `~/.config/offload/config.toml` and
    /// `~/.local/share/offload/state.json` on Linux.
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "offload").ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
        Ok(Self {
            config_file: dirs.config_dir().join("config.toml"),
            state_file: dirs.data_dir().join("state.json"),
            output_dir: dirs.data_dir().join("output"),
        })
    }

    /// Everything under a single directory. Used by tests and portable installs.
    pub fn rooted(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            config_file: dir.join("config.toml"),
            state_file: dir.join("state.json"),
            output_dir: dir.join("output"),
        }
    }
}
