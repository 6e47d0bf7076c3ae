use crate::error::{ErrorKind, Result};
use std::path::{Path, PathBuf};

/// How to find one external tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Name used in messages.
    pub name: &'static str,
    /// Executable names tried against `PATH`, in order.
    pub candidates: &'static [&'static str],
    /// Absolute install locations tried last.
    pub install_locations: fn() -> Vec<PathBuf>,
}

pub const RAWTHERAPEE: ToolSpec = ToolSpec {
    name: "rawtherapee-cli",
    candidates: &["rawtherapee-cli", "rawtherapee-cli.exe"],
    install_locations: rawtherapee_locations,
};

pub const DNG_CONVERTER: ToolSpec = ToolSpec {
    name: "Adobe DNG Converter",
    candidates: &["Adobe DNG Converter", "dngconverter"],
    install_locations: dng_converter_locations,
};

pub const IMMICH_GO: ToolSpec = ToolSpec {
    name: "immich-go",
    candidates: &["immich-go", "immich-go.exe"],
    install_locations: immich_go_locations,
};

impl ToolSpec {
    /// Find the executable.
    ///
    /// A configured value wins outright: if it contains a path separator it
    /// must name an existing file, otherwise it is looked up on `PATH`. With
    /// nothing configured, [`candidates`](Self::candidates) are tried on
    /// `PATH` and then [`install_locations`](Self::install_locations).
    pub fn locate(&self, configured: Option<&Path>) -> Result<PathBuf> {
        if let Some(configured) = configured {
            let found = if configured.components().count() > 1 {
                configured.is_file().then(|| configured.to_path_buf())
            } else {
                which::which(configured).ok()
            };
            return match found {
                Some(path) => Ok(path),
                None => {
                    tracing::info!(tool = self.name, configured = %configured.display(), "Configured executable not found");
                    exn::bail!(ErrorKind::ToolNotFound(self.name.to_string()))
                },
            };
        }

        for candidate in self.candidates {
            if let Ok(path) = which::which(candidate) {
                tracing::debug!(tool = self.name, path = %path.display(), "Found on PATH");
                return Ok(path);
            }
        }
        tracing::debug!(tool = self.name, "Not found on PATH; checking install locations");
        for location in (self.install_locations)() {
            if location.is_file() {
                tracing::debug!(tool = self.name, path = %location.display(), "Found at install location");
                return Ok(location);
            }
        }
        exn::bail!(ErrorKind::ToolNotFound(self.name.to_string()));
    }
}

fn home_join(parts: &[&str]) -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(parts.iter().fold(PathBuf::from(home), |path, part| path.join(part)))
}

fn gopath_bin(executable: &str) -> Option<PathBuf> {
    let gopath = std::env::var_os("GOPATH").filter(|p| !p.is_empty())?;
    Some(PathBuf::from(gopath).join("bin").join(executable))
}

fn rawtherapee_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        [
            "/Applications/RawTherapee.app/Contents/MacOS/rawtherapee-cli",
            "/usr/local/bin/rawtherapee-cli",
            "/opt/homebrew/bin/rawtherapee-cli",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    } else if cfg!(windows) {
        [r"C:\Program Files\RawTherapee\rawtherapee-cli.exe", r"C:\Program Files (x86)\RawTherapee\rawtherapee-cli.exe"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    } else {
        vec![PathBuf::from("/usr/bin/rawtherapee-cli"), PathBuf::from("/usr/local/bin/rawtherapee-cli")]
    }
}

fn dng_converter_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Applications/Adobe DNG Converter.app/Contents/MacOS/Adobe DNG Converter")]
    } else if cfg!(windows) {
        [
            r"C:\Program Files\Adobe\Adobe DNG Converter\Adobe DNG Converter.exe",
            r"C:\Program Files (x86)\Adobe\Adobe DNG Converter\Adobe DNG Converter.exe",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    } else {
        // No native Linux build.
        Vec::new()
    }
}

fn immich_go_locations() -> Vec<PathBuf> {
    let executable = if cfg!(windows) { "immich-go.exe" } else { "immich-go" };
    let mut locations = Vec::new();
    if cfg!(target_os = "macos") {
        locations.push(PathBuf::from("/opt/homebrew/bin/immich-go"));
    }
    if !cfg!(windows) {
        locations.push(PathBuf::from("/usr/local/bin/immich-go"));
    }
    locations.extend(home_join(&["go", "bin", executable]));
    locations.extend(gopath_bin(executable));
    locations
}
