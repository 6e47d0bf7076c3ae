use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Raw,
    Jpeg,
}

/// One image file found on the card. Rebuilt from scratch every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Bare filename, the identity used for deduplication.
    pub name: String,
    /// Filename without its extension; pairs a RAW file with its camera JPEG.
    pub match_key: String,
    pub size: u64,
    pub modified: OffsetDateTime,
    pub kind: FileKind,
}

impl FileRecord {
    /// Build a record from a path, deriving `name` and `match_key` from the
    /// final component. Returns `None` for paths without a UTF-8 filename.
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime, kind: FileKind) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_str()?.to_string();
        let match_key = match_key(&name).to_string();
        Some(Self { path, name, match_key, size, modified, kind })
    }
}

/// `P6010001.ORF` → `P6010001`. Only the last extension is stripped and a
/// leading dot does not count as one.
pub(crate) fn match_key(name: &str) -> &str {
    match Path::new(name).file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => name,
    }
}

/// Everything [`scan`](crate::scan) found under one root.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub root: PathBuf,
    /// In discovery order.
    pub raw: Vec<FileRecord>,
    /// In discovery order.
    pub jpeg: Vec<FileRecord>,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), raw: Vec::new(), jpeg: Vec::new() }
    }

    pub fn files(&self, kind: FileKind) -> &[FileRecord] {
        match kind {
            FileKind::Raw => &self.raw,
            FileKind::Jpeg => &self.jpeg,
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len() + self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.jpeg.is_empty()
    }

    /// Every filename currently on the card, of either kind.
    pub fn names(&self) -> HashSet<&str> {
        self.raw.iter().chain(&self.jpeg).map(|f| f.name.as_str()).collect()
    }

    /// The camera-generated JPEG shot alongside `raw`, if any. Match keys are
    /// compared case-sensitively and the first JPEG found wins.
    pub fn sibling_jpeg(&self, raw: &FileRecord) -> Option<&FileRecord> {
        self.jpeg.iter().find(|jpeg| jpeg.match_key == raw.match_key)
    }

    pub(crate) fn push(&mut self, record: FileRecord) {
        match record.kind {
            FileKind::Raw => self.raw.push(record),
            FileKind::Jpeg => self.jpeg.push(record),
        }
    }
}
