use crate::error::{ErrorKind, Result};
use crate::paths::Paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_LABEL: &str = "OM SYSTEM";
pub(crate) const DEFAULT_QUALITY: u32 = 92;

/// Top-level configuration.
///
/// Scalar settings come before the tables so the struct serializes to valid
/// TOML as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RAW extensions, case-insensitive, with or without the leading dot.
    pub raw_extensions: Vec<String>,
    /// Convert RAW files. When off, only camera JPEGs are uploaded.
    pub process_raw: bool,
    /// Upload the camera's own JPEG next to each processed RAW.
    pub upload_camera_jpegs: bool,
    /// Tag processed uploads with `profile:<name>`.
    pub tag_with_profile: bool,
    /// Delete processed files from the output directory after upload.
    pub cleanup_after_upload: bool,
    pub dry_run: bool,
    pub skip_upload: bool,
    /// Cap on new files per run; zero means no cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Parallel conversions; defaults to the core count, capped at 4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub state_file: PathBuf,
    pub volume: VolumeConfig,
    pub normalize: NormalizeConfig,
    pub convert: ConvertConfig,
    pub upload: UploadConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub label: String,
    /// Use this directory as the card instead of looking the label up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Optional RAW-to-DNG step for cameras the converter can't read directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Where intermediate files go; a scratch directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    pub compressed: bool,
    pub embed_original: bool,
    /// Delete intermediate files at the end of each run, whether or not the
    /// upload succeeded.
    pub cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Processing profile; its file stem is the profile name used in tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PathBuf>,
    pub quality: u32,
    pub output_directory: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Added to every upload.
    pub tags: Vec<String>,
    /// Accept self-signed server certificates.
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Kill any external tool still running after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_paths(&Paths::rooted(""))
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self { label: DEFAULT_LABEL.to_string(), path: None }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: None,
            output_directory: None,
            compressed: false,
            embed_original: false,
            cleanup: true,
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profile: None,
            quality: DEFAULT_QUALITY,
            output_directory: PathBuf::from("output"),
        }
    }
}

impl Config {
    /// Defaults, with file locations taken from `paths`.
    pub fn with_paths(paths: &Paths) -> Self {
        Self {
            raw_extensions: vec![".ORF".to_string()],
            process_raw: true,
            upload_camera_jpegs: true,
            tag_with_profile: true,
            cleanup_after_upload: true,
            dry_run: false,
            skip_upload: false,
            limit: None,
            workers: None,
            state_file: paths.state_file.clone(),
            volume: VolumeConfig::default(),
            normalize: NormalizeConfig::default(),
            convert: ConvertConfig { output_directory: paths.output_dir.clone(), ..ConvertConfig::default() },
            upload: UploadConfig::default(),
            tools: ToolsConfig::default(),
        }
    }

    /// RAW extensions normalised to uppercase with a leading dot.
    pub fn raw_extension_set(&self) -> HashSet<String> {
        self.raw_extensions
            .iter()
            .map(|ext| ext.trim())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                let upper = ext.to_uppercase();
                if upper.starts_with('.') { upper } else { format!(".{upper}") }
            })
            .collect()
    }

    /// Effective cap on new files per run.
    pub fn limit(&self) -> Option<usize> {
        self.limit.filter(|n| *n > 0)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.tools.timeout_secs.map(Duration::from_secs)
    }

    /// Check that this configuration can actually drive a run.
    ///
    /// # Errors
    /// [`ErrorKind::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.volume.label.trim().is_empty() && self.volume.path.is_none() {
            exn::bail!(invalid("volume.label is required (or set volume.path)"));
        }
        if self.process_raw {
            if self.raw_extension_set().is_empty() {
                exn::bail!(invalid("raw_extensions must list at least one extension"));
            }
            let Some(profile) = &self.convert.profile else {
                exn::bail!(invalid("convert.profile is required when process_raw is enabled"));
            };
            if !profile.is_file() {
                exn::bail!(invalid(format!("conversion profile not found: {}", profile.display())));
            }
        }
        if !self.skip_upload {
            if self.upload.server_url.as_deref().is_none_or(|s| s.trim().is_empty()) {
                exn::bail!(invalid("upload.server_url is required (use --skip-upload to skip uploading)"));
            }
            if self.upload.api_key.as_deref().is_none_or(|s| s.trim().is_empty()) {
                exn::bail!(invalid("upload.api_key is required (use --skip-upload to skip uploading)"));
            }
        }
        if !(1..=100).contains(&self.convert.quality) {
            exn::bail!(invalid("convert.quality must be between 1 and 100"));
        }
        if self.workers == Some(0) {
            exn::bail!(invalid("workers must be at least 1"));
        }
        if self.tools.timeout_secs == Some(0) {
            exn::bail!(invalid("tools.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ErrorKind {
    ErrorKind::Invalid(message.into())
}
