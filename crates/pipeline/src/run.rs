use crate::batch::{Batch, CleanupReport, JPG_ONLY_PROFILE, TAG_CAMERA_ORIGINAL, remove_files};
use crate::error::{ErrorKind, Result};
use crate::pool::{ConversionJob, PoolEvent, WorkerPool};
use crate::reconcile::reconcile;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use offload_card::{Catalog, FileKind, FileRecord, VolumeResolver};
use offload_config::Config;
use offload_state::StateStore;
use offload_tools::{Converter, Normalizer, Uploader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// The external collaborators a run may call. Which ones are required
/// depends on the configuration; a missing one is reported before any file
/// is touched.
#[derive(Clone, Default)]
pub struct Toolbox {
    pub converter: Option<Arc<dyn Converter>>,
    pub normalizer: Option<Arc<dyn Normalizer>>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

/// What a run did, for the closing report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub dry_run: bool,
    pub card: String,
    pub found_raw: usize,
    pub found_jpeg: usize,
    /// State entries dropped because their file left the card.
    pub forgotten: usize,
    /// Files selected for this run, after the limit.
    pub selected: Vec<String>,
    /// New files held back by the limit.
    pub deferred: usize,
    /// Files converted (or, in JPEG-only mode, uploaded) and marked processed.
    pub succeeded: usize,
    pub failed: usize,
    pub batches_uploaded: usize,
    pub batches_failed: usize,
    pub cleaned: CleanupReport,
    pub intermediates_cleaned: CleanupReport,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    resolver: &'a dyn VolumeResolver,
    tools: Toolbox,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, resolver: &'a dyn VolumeResolver, tools: Toolbox) -> Self {
        Self { config, resolver, tools }
    }

    /// Locate the card, work out what's new, process it, upload it, and
    /// persist the state.
    ///
    /// Per-file and per-batch failures are logged and counted in the
    /// [`Summary`]; only conditions that stop the whole run are returned as
    /// errors. A dry run reports what it would do and writes nothing, state
    /// included.
    #[instrument(skip_all)]
    pub async fn run(&self, state: &mut StateStore) -> Result<Summary> {
        let total = Instant::now();
        let mut summary = Summary { dry_run: self.config.dry_run, ..Summary::default() };

        let catalog = self.discover(&mut summary).await?;
        let (kind, noun) = if self.config.process_raw { (FileKind::Raw, "RAW") } else { (FileKind::Jpeg, "JPEG") };

        let plan = reconcile(&catalog, kind, state.processed(), self.config.limit());
        let forgotten = state.sync_with_card(&catalog.names());
        debug_assert_eq!(forgotten, plan.forget.len());
        if forgotten > 0 {
            tracing::info!(count = forgotten, "Forgot files no longer on the card");
        }
        state.set_card_id(summary.card.clone());
        summary.forgotten = forgotten;
        summary.deferred = plan.deferred;
        summary.selected = plan.new_files.iter().map(|f| f.name.clone()).collect();

        if plan.new_files.is_empty() {
            tracing::info!("No new {noun} files to process");
        } else {
            if plan.deferred > 0 {
                tracing::info!(
                    "Limiting to {} files ({} more left for a later run)",
                    plan.new_files.len(),
                    plan.deferred
                );
            }
            tracing::info!(count = plan.new_files.len(), "{} new {noun} files", plan.new_files.len());
        }

        if self.config.dry_run {
            for file in &plan.new_files {
                tracing::info!(file = %file.name, "Dry run: would process {}", file.name);
            }
            return Ok(summary);
        }

        if !plan.new_files.is_empty() {
            match kind {
                FileKind::Raw => self.process_raw(&catalog, plan.new_files, state, &mut summary).await?,
                FileKind::Jpeg => self.upload_jpegs(plan.new_files, state, &mut summary).await?,
            }
        }

        state.save().or_raise(|| ErrorKind::State)?;
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Done in {:.2}s",
            total.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    async fn discover(&self, summary: &mut Summary) -> Result<Catalog> {
        let started = Instant::now();
        tracing::info!(label = %self.config.volume.label, "Searching for card");
        let volume = self
            .resolver
            .resolve(&self.config.volume.label)
            .await
            .inspect_err(|e| {
                if e.is_retryable() {
                    tracing::warn!("Is the card inserted and mounted? Run again once it is");
                }
            })
            .or_raise(|| ErrorKind::Volume)?;
        tracing::info!(path = %volume.path.display(), "Found card in {}", secs(started.elapsed()));
        summary.card = volume.label.clone();

        let started = Instant::now();
        let catalog = offload_card::scan(&volume.path, &self.config.raw_extension_set())
            .await
            .or_raise(|| ErrorKind::Scan)?;
        summary.found_raw = catalog.raw.len();
        summary.found_jpeg = catalog.jpeg.len();
        tracing::info!(
            raw = catalog.raw.len(),
            jpeg = catalog.jpeg.len(),
            "Found {} RAW and {} JPEG files in {}",
            catalog.raw.len(),
            catalog.jpeg.len(),
            secs(started.elapsed())
        );
        Ok(catalog)
    }

    fn uploader(&self) -> Result<Option<&dyn Uploader>> {
        if self.config.skip_upload {
            return Ok(None);
        }
        let uploader = self.tools.uploader.as_deref().ok_or_raise(|| ErrorKind::MissingTool("uploader"))?;
        Ok(Some(uploader))
    }

    async fn process_raw(
        &self,
        catalog: &Catalog,
        files: Vec<&FileRecord>,
        state: &mut StateStore,
        summary: &mut Summary,
    ) -> Result<()> {
        // Everything that can stop the run is checked before the first file.
        let converter = self.tools.converter.clone().ok_or_raise(|| ErrorKind::MissingTool("converter"))?;
        let normalizer = if self.config.normalize.enabled {
            Some(self.tools.normalizer.clone().ok_or_raise(|| ErrorKind::MissingTool("normalizer"))?)
        } else {
            None
        };
        let uploader = self.uploader()?;

        let profile = converter.profile_name().to_string();
        let mut processed = Batch::processed(&profile, self.config.tag_with_profile);
        let mut originals = Batch::camera_originals();
        let mut intermediates: Vec<PathBuf> = Vec::new();

        let total = files.len();
        let jobs = files
            .into_iter()
            .enumerate()
            .map(|(sequence, source)| ConversionJob { sequence, source: source.clone() })
            .collect();
        let pool = WorkerPool::new(converter, normalizer, self.config.workers);
        let started = Instant::now();
        let mut done = 0;
        let mut converting = std::pin::pin!(pool.run(jobs));
        while let Some(event) = converting.next().await {
            let outcome = match event {
                PoolEvent::Started { jobs, workers } => {
                    tracing::info!(profile = %profile, "Converting {jobs} files with {workers} parallel workers");
                    continue;
                },
                PoolEvent::Complete => break,
                PoolEvent::Converted(outcome) => outcome,
            };
            done += 1;
            intermediates.extend(outcome.intermediate);
            match outcome.result {
                Ok(output) => {
                    let name = output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    tracing::info!(file = %outcome.source.name, "[{done}/{total}] Created: {name} ({})", secs(outcome.elapsed));
                    if self.config.upload_camera_jpegs
                        && let Some(jpeg) = catalog.sibling_jpeg(&outcome.source)
                    {
                        tracing::debug!(file = %jpeg.name, "Found matching camera JPEG");
                        originals.push(&jpeg.path);
                    }
                    processed.push(output);
                    state.mark_processed(&outcome.source.name, &profile);
                    summary.succeeded += 1;
                },
                Err(e) => {
                    tracing::error!(
                        file = %outcome.source.name,
                        error = ?e,
                        retryable = e.is_retryable(),
                        "[{done}/{total}] Failed to process {}",
                        outcome.source.name
                    );
                    summary.failed += 1;
                },
            }
        }
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Conversion finished in {}",
            secs(started.elapsed())
        );

        let uploaded = match uploader {
            None => {
                tracing::info!("Upload skipped");
                None
            },
            Some(uploader) => {
                let started = Instant::now();
                let uploaded = self.upload_batch(&processed, uploader, summary).await;
                if self.config.upload_camera_jpegs {
                    self.upload_batch(&originals, uploader, summary).await;
                }
                tracing::info!(
                    uploaded = summary.batches_uploaded,
                    failed = summary.batches_failed,
                    "Upload finished in {}",
                    secs(started.elapsed())
                );
                uploaded
            },
        };

        // Only what actually reached the server; files that failed to stage
        // stay on disk.
        if let Some(uploaded) = uploaded
            && self.config.cleanup_after_upload
        {
            summary.cleaned = remove_files(&uploaded).await;
            tracing::info!(removed = summary.cleaned.removed, failed = summary.cleaned.failed, "Cleaned up processed files");
        }
        if self.config.normalize.cleanup && !intermediates.is_empty() {
            summary.intermediates_cleaned = remove_files(&intermediates).await;
            tracing::info!(
                removed = summary.intermediates_cleaned.removed,
                failed = summary.intermediates_cleaned.failed,
                "Cleaned up intermediate files"
            );
        }
        Ok(())
    }

    /// Returns the files that made it to the server, or `None` if the upload
    /// failed. An empty batch counts as done.
    async fn upload_batch(&self, batch: &Batch, uploader: &dyn Uploader, summary: &mut Summary) -> Option<Vec<PathBuf>> {
        if batch.is_empty() {
            return Some(Vec::new());
        }
        let started = Instant::now();
        tracing::info!(tags = ?batch.tags(), "Uploading {} {} files", batch.len(), batch.label());
        match batch.upload(uploader).await {
            Ok(report) => {
                summary.batches_uploaded += 1;
                tracing::info!(
                    copy_failures = report.copy_failures,
                    "Uploaded {} {} files ({})",
                    report.staged.len(),
                    batch.label(),
                    secs(started.elapsed())
                );
                Some(report.staged)
            },
            Err(e) => {
                summary.batches_failed += 1;
                tracing::error!(error = ?e, retryable = e.is_retryable(), "Failed to upload {} files", batch.label());
                None
            },
        }
    }

    async fn upload_jpegs(&self, files: Vec<&FileRecord>, state: &mut StateStore, summary: &mut Summary) -> Result<()> {
        let Some(uploader) = self.uploader()? else {
            tracing::info!("Upload skipped; nothing else to do without RAW processing");
            return Ok(());
        };
        let tags = [TAG_CAMERA_ORIGINAL.to_string()];
        let total = files.len();
        let started = Instant::now();
        for (index, file) in files.into_iter().enumerate() {
            tracing::debug!(file = %file.name, "[{}/{total}] Uploading {}", index + 1, file.name);
            match uploader.upload_single(&file.path, &tags).await {
                Ok(()) => {
                    state.mark_processed(&file.name, JPG_ONLY_PROFILE);
                    summary.succeeded += 1;
                    tracing::debug!(file = %file.name, "Uploaded");
                },
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(file = %file.name, error = ?e, retryable = e.is_retryable(), "Failed to upload {}", file.name);
                },
            }
        }
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Upload finished in {}",
            secs(started.elapsed())
        );
        Ok(())
    }
}

fn secs(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}
