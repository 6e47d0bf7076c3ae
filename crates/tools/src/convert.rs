use crate::error::{ErrorKind, Result};
use crate::exec::Tool;
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Turns one RAW file into a finished JPEG.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Label recorded against every file this converter produced.
    fn profile_name(&self) -> &str;

    /// Convert `input`, returning the path of the JPEG written. The output
    /// name is derived from the input's base name, so converting the same
    /// file twice overwrites rather than duplicates.
    async fn convert(&self, input: &Path) -> Result<PathBuf>;
}

/// `rawtherapee-cli` applying a `.pp3` processing profile.
#[derive(Debug, Clone)]
pub struct RawTherapee {
    tool: Tool,
    profile: PathBuf,
    profile_name: String,
    quality: u32,
    output_dir: PathBuf,
}

impl RawTherapee {
    /// Checks the profile exists and creates `output_dir` if needed.
    pub fn new(tool: Tool, profile: impl Into<PathBuf>, quality: u32, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let profile = profile.into();
        let output_dir = output_dir.into();
        if !profile.is_file() {
            exn::bail!(ErrorKind::ProfileNotFound(profile));
        }
        std::fs::create_dir_all(&output_dir).or_raise(|| ErrorKind::Prepare(output_dir.clone()))?;
        let profile_name = profile
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "default".to_string());
        Ok(Self { tool, profile, profile_name, quality, output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or(input.as_os_str());
        let mut name = stem.to_os_string();
        name.push(".jpg");
        self.output_dir.join(name)
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        // `-c` has to come last; everything after it is read as input files.
        vec![
            "-o".into(),
            output.into(),
            format!("-j{}", self.quality).into(),
            "-Y".into(),
            "-p".into(),
            self.profile.clone().into(),
            "-c".into(),
            input.into(),
        ]
    }
}

#[async_trait]
impl Converter for RawTherapee {
    fn profile_name(&self) -> &str {
        &self.profile_name
    }

    #[instrument(skip_all, fields(input = %input.display()))]
    async fn convert(&self, input: &Path) -> Result<PathBuf> {
        let output = self.output_path(input);
        self.tool.run(&self.args(input, &output), false).await?;
        match tokio::fs::try_exists(&output).await {
            Ok(true) => Ok(output),
            _ => exn::bail!(ErrorKind::MissingOutput(output)),
        }
    }
}
