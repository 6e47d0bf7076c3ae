use crate::error::{ErrorKind, Result};
use crate::exec::Tool;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::ffi::OsString;
use std::path::Path;
use tracing::instrument;

/// Sends files to the photo server.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload everything in `dir` in a single call.
    async fn upload_batch(&self, dir: &Path, tags: &[String], recursive: bool) -> Result<()>;

    /// Upload one file by staging it alone in a throwaway directory.
    async fn upload_single(&self, file: &Path, tags: &[String]) -> Result<()> {
        let name = file.file_name().ok_or_raise(|| ErrorKind::Prepare(file.to_path_buf()))?;
        let staging = tempfile::Builder::new()
            .prefix("offload-upload-")
            .tempdir()
            .or_raise(|| ErrorKind::Prepare(file.to_path_buf()))?;
        tokio::fs::copy(file, staging.path().join(name))
            .await
            .or_raise(|| ErrorKind::Prepare(file.to_path_buf()))?;
        self.upload_batch(staging.path(), tags, false).await
    }
}

/// Connection settings for [`ImmichGo`].
#[derive(Debug, Clone, Default)]
pub struct ImmichSettings {
    pub server_url: String,
    pub api_key: String,
    pub album: Option<String>,
    /// Added to every upload, ahead of the per-batch tags.
    pub tags: Vec<String>,
    /// Let the tool draw its own progress UI on this terminal.
    pub show_progress: bool,
    pub skip_tls_verify: bool,
}

/// The `immich-go` command-line uploader.
#[derive(Debug, Clone)]
pub struct ImmichGo {
    tool: Tool,
    settings: ImmichSettings,
}

impl ImmichGo {
    pub fn new(tool: Tool, settings: ImmichSettings) -> Self {
        Self { tool, settings }
    }

    fn args(&self, dir: &Path, tags: &[String], recursive: bool) -> Vec<OsString> {
        let settings = &self.settings;
        let mut args: Vec<OsString> = vec![
            "upload".into(),
            "from-folder".into(),
            "--server".into(),
            settings.server_url.as_str().into(),
            "--api-key".into(),
            settings.api_key.as_str().into(),
            "--on-errors".into(),
            "continue".into(),
        ];
        if settings.skip_tls_verify {
            args.push("--skip-verify-ssl".into());
        }
        if !settings.show_progress {
            args.push("--no-ui".into());
        }
        if !recursive {
            args.push("--recursive=false".into());
        }
        for tag in settings.tags.iter().chain(tags) {
            args.push("--tag".into());
            args.push(tag.into());
        }
        if let Some(album) = settings.album.as_deref().filter(|a| !a.is_empty()) {
            args.push("--into-album".into());
            args.push(album.into());
        }
        args.push(dir.into());
        args
    }
}

#[async_trait]
impl Uploader for ImmichGo {
    #[instrument(skip_all, fields(dir = %dir.display()))]
    async fn upload_batch(&self, dir: &Path, tags: &[String], recursive: bool) -> Result<()> {
        let output = self.tool.run(&self.args(dir, tags, recursive), self.settings.show_progress).await?;
        tracing::trace!(%output, "Upload finished");
        Ok(())
    }
}
