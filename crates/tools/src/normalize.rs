use crate::error::{ErrorKind, Result};
use crate::exec::Tool;
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// The DNG converter has been seen to exit before its output is fully on disk.
const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Rewrites a RAW file into a format the converter can read. Runs before
/// [`Converter::convert`](crate::Converter::convert) when enabled.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Returns the path of the intermediate file.
    async fn normalize(&self, input: &Path) -> Result<PathBuf>;
}

/// Adobe DNG Converter.
#[derive(Debug, Clone)]
pub struct DngConverter {
    tool: Tool,
    output_dir: PathBuf,
    compressed: bool,
    embed_original: bool,
    settle: Duration,
}

impl DngConverter {
    pub fn new(tool: Tool, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).or_raise(|| ErrorKind::Prepare(output_dir.clone()))?;
        Ok(Self { tool, output_dir, compressed: false, embed_original: false, settle: DEFAULT_SETTLE })
    }

    /// Lossy-compressed output; much smaller files.
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Embed the original RAW inside the DNG.
    pub fn embed_original(mut self, embed: bool) -> Self {
        self.embed_original = embed;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_name(input: &Path, extension: &str) -> OsString {
        let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
        name.push(extension);
        name
    }

    fn args(&self, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["-c".into(), "-d".into(), self.output_dir.clone().into(), "-o".into(), Self::file_name(input, ".dng")];
        if self.compressed {
            args.push("-lossy".into());
        }
        if self.embed_original {
            args.push("-e".into());
        }
        args.push(input.into());
        args
    }
}

#[async_trait]
impl Normalizer for DngConverter {
    #[instrument(skip_all, fields(input = %input.display()))]
    async fn normalize(&self, input: &Path) -> Result<PathBuf> {
        self.tool.run(&self.args(input), false).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        // Some builds upper-case the extension regardless of `-o`.
        for extension in [".dng", ".DNG"] {
            let candidate = self.output_dir.join(Self::file_name(input, extension));
            if let Ok(true) = tokio::fs::try_exists(&candidate).await {
                return Ok(candidate);
            }
        }
        exn::bail!(ErrorKind::MissingOutput(self.output_dir.join(Self::file_name(input, ".dng"))));
    }
}
