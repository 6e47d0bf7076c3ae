//! Fakes for the external tools, plus a card laid out on disk.

#![allow(dead_code)]

use async_trait::async_trait;
use offload_card::FixedPath;
use offload_config::{Config, Paths};
use offload_state::StateStore;
use offload_tools::error::{ErrorKind as ToolErrorKind, Result as ToolResult};
use offload_tools::{Converter, Normalizer, Uploader};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn failed(tool: &str) -> ToolErrorKind {
    ToolErrorKind::Failed { tool: tool.to_string(), code: Some(1), output: "boom".to_string() }
}

/// Writes `<stem>.jpg` into its output directory, tracking how many calls
/// overlap.
pub struct FakeConverter {
    pub output_dir: PathBuf,
    pub delay: Duration,
    pub fail: HashSet<String>,
    /// Write each output under a directory named after the input's folder.
    pub per_folder: bool,
    pub calls: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    pub high_water: AtomicUsize,
}

impl FakeConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).unwrap();
        Self {
            output_dir,
            delay: Duration::ZERO,
            fail: HashSet::new(),
            per_folder: false,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.fail = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn per_folder(mut self) -> Self {
        self.per_folder = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn converted(&self) -> Vec<String> {
        let mut names: Vec<_> =
            self.calls.lock().unwrap().iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Converter for FakeConverter {
    fn profile_name(&self) -> &str {
        "Vivid"
    }

    async fn convert(&self, input: &Path) -> ToolResult<PathBuf> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(input.to_path_buf());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail.contains(&name) {
            exn::bail!(failed("fake-converter"));
        }
        let mut dir = self.output_dir.clone();
        if self.per_folder {
            dir.push(input.parent().unwrap().file_name().unwrap());
            std::fs::create_dir_all(&dir).unwrap();
        }
        let output = dir.join(format!("{}.jpg", input.file_stem().unwrap().to_string_lossy()));
        std::fs::write(&output, b"jpeg").unwrap();
        Ok(output)
    }
}

/// Writes `<stem>.dng` into its output directory.
pub struct FakeNormalizer {
    pub output_dir: PathBuf,
    pub fail: HashSet<String>,
}

impl FakeNormalizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).unwrap();
        Self { output_dir, fail: HashSet::new() }
    }
}

#[async_trait]
impl Normalizer for FakeNormalizer {
    async fn normalize(&self, input: &Path) -> ToolResult<PathBuf> {
        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail.contains(&name) {
            exn::bail!(failed("fake-normalizer"));
        }
        let output = self.output_dir.join(format!("{}.dng", input.file_stem().unwrap().to_string_lossy()));
        std::fs::write(&output, b"dng").unwrap();
        Ok(output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub files: Vec<String>,
    pub tags: Vec<String>,
}

/// Records the contents of every directory it is asked to upload.
#[derive(Default)]
pub struct FakeUploader {
    pub uploads: Mutex<Vec<Upload>>,
    pub fail: bool,
}

impl FakeUploader {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload_batch(&self, dir: &Path, tags: &[String], _recursive: bool) -> ToolResult<()> {
        let mut files: Vec<String> =
            std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().into_string().unwrap()).collect();
        files.sort();
        self.uploads.lock().unwrap().push(Upload { files, tags: tags.to_vec() });
        if self.fail {
            exn::bail!(failed("fake-uploader"));
        }
        Ok(())
    }
}

/// A temporary home with a card directory, an output directory and a state
/// file location.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("card/DCIM/100OMSYS")).unwrap();
        Self { dir }
    }

    pub fn card(&self) -> PathBuf {
        self.dir.path().join("card")
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn put(&self, names: &[&str]) {
        self.put_in("100OMSYS", names);
    }

    pub fn put_in(&self, folder: &str, names: &[&str]) {
        let dir = self.card().join("DCIM").join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::with_paths(&Paths::rooted(self.dir.path()));
        config.volume.path = Some(self.card());
        config.workers = Some(2);
        config
    }

    pub fn resolver(&self) -> FixedPath {
        FixedPath::new(self.card())
    }

    pub fn state(&self) -> StateStore {
        StateStore::load(self.dir.path().join("state.json")).unwrap()
    }

    pub fn state_with(&self, names: &[&str]) -> StateStore {
        let mut state = self.state();
        for name in names {
            state.mark_processed(*name, "Vivid");
        }
        state
    }
}
