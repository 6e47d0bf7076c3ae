use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use offload_tools::Uploader;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const TAG_PROCESSED: &str = "processed";
pub const TAG_CAMERA_ORIGINAL: &str = "camera-original";
/// Profile label recorded for files uploaded without conversion.
pub const JPG_ONLY_PROFILE: &str = "jpg-only";

/// A cohort of files uploaded together under the same tags.
#[derive(Debug, Clone)]
pub struct Batch {
    label: &'static str,
    tags: Vec<String>,
    files: Vec<PathBuf>,
}

/// How a batch upload went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Source files that made it into the upload, in batch order.
    pub staged: Vec<PathBuf>,
    pub copy_failures: usize,
}

/// How a best-effort deletion went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

impl Batch {
    /// Converted JPEGs: `processed`, plus `profile:<name>` when asked for.
    pub fn processed(profile: &str, tag_with_profile: bool) -> Self {
        let mut tags = Vec::with_capacity(2);
        if tag_with_profile {
            tags.push(format!("profile:{profile}"));
        }
        tags.push(TAG_PROCESSED.to_string());
        Self { label: "processed", tags, files: Vec::new() }
    }

    /// The camera's own JPEGs.
    pub fn camera_originals() -> Self {
        Self { label: "camera JPEG", tags: vec![TAG_CAMERA_ORIGINAL.to_string()], files: Vec::new() }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn push(&mut self, file: impl Into<PathBuf>) {
        self.files.push(file.into());
    }

    /// Copy this batch into a fresh scratch directory and upload that
    /// directory in one call.
    ///
    /// Copying is best-effort per file: failures are logged and the rest go
    /// ahead. Only files produced by this run are ever staged, so the upload
    /// never re-sends older output sitting in the same directory.
    #[instrument(skip_all, fields(batch = self.label, files = self.files.len()))]
    pub async fn upload(&self, uploader: &dyn Uploader) -> Result<BatchReport> {
        let staging = tempfile::Builder::new()
            .prefix("offload-batch-")
            .tempdir()
            .or_raise(|| ErrorKind::Stage(self.label))?;
        let (staged, copy_failures) = stage(&self.files, staging.path()).await;
        if staged.is_empty() {
            exn::bail!(ErrorKind::Stage(self.label));
        }

        let uploaded = uploader.upload_batch(staging.path(), &self.tags, false).await.or_raise(|| ErrorKind::Upload(self.label));
        let scratch = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!(path = %scratch.display(), error = %e, "Could not remove staging directory");
        }
        uploaded?;
        Ok(BatchReport { staged, copy_failures })
    }
}

/// Copy `files` into `dir`. Returns the files copied and the number that
/// failed; a name already staged counts as a failure rather than overwriting
/// the first copy.
async fn stage(files: &[PathBuf], dir: &Path) -> (Vec<PathBuf>, usize) {
    let mut seen: HashSet<OsString> = HashSet::with_capacity(files.len());
    let (mut staged, mut failed) = (Vec::with_capacity(files.len()), 0);
    for file in files {
        let Some(name) = file.file_name() else {
            failed += 1;
            continue;
        };
        if !seen.insert(name.to_os_string()) {
            tracing::warn!(file = %file.display(), "Another file with this name is already in the batch; skipping");
            failed += 1;
            continue;
        }
        match tokio::fs::copy(file, dir.join(name)).await {
            Ok(_) => staged.push(file.clone()),
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "Failed to stage file for upload");
                failed += 1;
            },
        }
    }
    (staged, failed)
}

/// Delete each of `files`, logging any that can't be removed.
pub async fn remove_files(files: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "Failed to delete");
                report.failed += 1;
            },
        }
    }
    report
}
