use crate::error::{ErrorKind, Result};
use crate::models::{Document, FORMAT_VERSION, LegacyDocument, ProcessedRecord, unset_if_zero};
use exn::ResultExt;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::hash::Hash;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::instrument;

/// Read-only snapshot returned by [`StateStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub count: usize,
    pub last_run: Option<OffsetDateTime>,
    pub card_id: Option<String>,
    /// Size of the last successful save, if the file exists.
    pub on_disk_size: Option<u64>,
}

/// How a [`StateStore`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// No state file existed yet.
    Fresh,
    /// Loaded from a current-schema file.
    Loaded,
    /// Loaded from a legacy-schema file and upgraded in memory.
    Migrated,
}

/// The filename → [`ProcessedRecord`] mapping that survives between runs.
///
/// One instance owns the file at `path` for the duration of a run and is its
/// only writer. Running two processes against the same state file at once is
/// not supported: the last `save()` wins and the other run's records are lost.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    origin: Origin,
    card_id: Option<String>,
    last_run: Option<OffsetDateTime>,
    processed: BTreeMap<String, ProcessedRecord>,
}

impl StateStore {
    /// An empty store that will be written to `path` on [`save`](Self::save).
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: Origin::Fresh,
            card_id: None,
            last_run: None,
            processed: BTreeMap::new(),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing file is not an error and yields an empty store. A file in the
    /// legacy list layout is upgraded in memory and immediately re-saved in the
    /// current layout; failing that save only logs a warning since the
    /// in-memory state is still valid for this run.
    ///
    /// # Errors
    /// - [`ErrorKind::Read`] if the file exists but cannot be read.
    /// - [`ErrorKind::Corrupt`] if neither schema parses.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No state file yet; starting empty");
                return Ok(Self::empty(path));
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
        };

        let (document, origin) = match serde_json::from_slice::<Document>(&bytes) {
            Ok(document) => (document, Origin::Loaded),
            Err(current_err) => match serde_json::from_slice::<LegacyDocument>(&bytes) {
                Ok(legacy) => (Document::from(legacy), Origin::Migrated),
                // Report against the current schema; that's the one people should be writing.
                Err(_) => return Err(current_err).or_raise(|| ErrorKind::Corrupt(path.to_path_buf())),
            },
        };

        let store = Self {
            path: path.to_path_buf(),
            origin,
            card_id: document.card_id.filter(|id| !id.is_empty()),
            last_run: unset_if_zero(document.last_run),
            processed: document.processed_files,
        };

        if origin == Origin::Migrated {
            tracing::info!(entries = store.len(), "Upgraded legacy state file");
            if let Err(e) = store.save() {
                tracing::warn!(
                    error = ?e,
                    retryable = e.is_retryable(),
                    "Could not save migrated state; continuing with in-memory copy"
                );
            }
        }
        Ok(store)
    }

    /// Write the store to disk.
    ///
    /// The document is written in full to a temporary file next to the target
    /// and then renamed over it, so an interrupted save leaves the previous
    /// file intact.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<()> {
        let document = Document {
            version: FORMAT_VERSION,
            card_id: self.card_id.clone(),
            last_run: self.last_run,
            processed_files: self.processed.clone(),
        };
        let json = serde_json::to_vec_pretty(&document).or_raise(|| ErrorKind::Serialize)?;

        let write_err = || ErrorKind::Write(self.path.clone());
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).or_raise(write_err)?;
        let mut tmp = tempfile::Builder::new().prefix(".state-").suffix(".json").tempfile_in(dir).or_raise(write_err)?;
        tmp.write_all(&json).or_raise(write_err)?;
        tmp.as_file().sync_all().or_raise(write_err)?;
        tmp.persist(&self.path).or_raise(write_err)?;
        tracing::debug!(entries = self.len(), bytes = json.len(), "State saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn is_processed(&self, filename: &str) -> bool {
        self.processed.contains_key(filename)
    }

    pub fn get(&self, filename: &str) -> Option<&ProcessedRecord> {
        self.processed.get(filename)
    }

    /// The full mapping, for reconciliation.
    pub fn processed(&self) -> &BTreeMap<String, ProcessedRecord> {
        &self.processed
    }

    pub fn card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }

    pub fn last_run(&self) -> Option<OffsetDateTime> {
        self.last_run
    }

    pub fn set_card_id(&mut self, card_id: impl Into<String>) {
        self.card_id = Some(card_id.into());
    }

    /// Record `filename` as processed now. Calling it again for the same
    /// filename replaces the record.
    pub fn mark_processed(&mut self, filename: impl Into<String>, profile: impl Into<String>) {
        self.mark_processed_at(filename, profile, OffsetDateTime::now_utc());
    }

    /// [`mark_processed`](Self::mark_processed) with an explicit timestamp.
    pub fn mark_processed_at(&mut self, filename: impl Into<String>, profile: impl Into<String>, at: OffsetDateTime) {
        let filename = filename.into();
        let record = ProcessedRecord {
            filename: filename.clone(),
            processed_at: at,
            profile_used: profile.into(),
        };
        self.processed.insert(filename, record);
        self.last_run = Some(at);
    }

    /// Forget every record whose filename is not in `present`, returning how
    /// many were removed.
    ///
    /// A file deleted from the card, then replaced by a different file reusing
    /// the name, must not be mistaken for one already processed.
    pub fn sync_with_card<S>(&mut self, present: &HashSet<S>) -> usize
    where
        S: Borrow<str> + Eq + Hash,
    {
        let before = self.processed.len();
        self.processed.retain(|filename, _| present.contains(filename.as_str()));
        before - self.processed.len()
    }

    /// Drop every record and the card identity, returning how many records
    /// there were. The caller still has to [`save`](Self::save).
    pub fn clear(&mut self) -> usize {
        let count = self.processed.len();
        self.processed.clear();
        self.card_id = None;
        self.last_run = None;
        count
    }

    pub fn stats(&self) -> Stats {
        Stats {
            count: self.processed.len(),
            last_run: self.last_run,
            card_id: self.card_id.clone(),
            on_disk_size: fs::metadata(&self.path).ok().map(|m| m.len()),
        }
    }
}
