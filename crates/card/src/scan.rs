use crate::catalog::{Catalog, FileKind, FileRecord};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tracing::instrument;

/// Extensions (uppercased, with leading dot) recognised as camera JPEGs.
pub const JPEG_EXTENSIONS: [&str; 2] = [".JPG", ".JPEG"];

/// macOS litters non-HFS volumes with `._NAME` resource-fork files.
const APPLE_DOUBLE_PREFIX: &str = "._";

enum WalkEntry {
    File(FileRecord),
    Descend(PathBuf),
    Skip,
}

/// Walk `root` and sort every image into the RAW or JPEG group.
///
/// `raw_extensions` holds uppercased extensions with a leading dot (`.ORF`).
/// Classification is by uppercased extension: a RAW extension wins, then
/// [`JPEG_EXTENSIONS`], and anything else is ignored. Subdirectories or
/// entries that can't be read are logged and skipped; only failing to list
/// `root` itself is an error. Both groups come back sorted by path so that
/// discovery order is stable between runs.
#[instrument(skip_all, fields(root = %root.display()))]
pub async fn scan(root: &Path, raw_extensions: &HashSet<String>) -> Result<Catalog> {
    let metadata = fs::metadata(root).await.or_raise(|| ErrorKind::Unreadable(root.to_path_buf()))?;
    if !metadata.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(root.to_path_buf()));
    }

    let mut catalog = Catalog::new(root);
    let mut stack = vec![root.to_path_buf()];
    let mut first = true;

    'dirs: while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if first => return Err(e).or_raise(|| ErrorKind::Unreadable(current)),
            Err(e) => {
                tracing::warn!(path = %current.display(), error = %e, "Skipping unreadable directory");
                continue 'dirs;
            },
        };
        first = false;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(path = %current.display(), error = %e, "Stopped listing directory early");
                    break;
                },
            };
            match process_entry(entry, raw_extensions).await {
                WalkEntry::File(record) => catalog.push(record),
                WalkEntry::Descend(dir) => stack.push(dir),
                WalkEntry::Skip => {},
            }
        }
    }

    catalog.raw.sort_by(|a, b| a.path.cmp(&b.path));
    catalog.jpeg.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(raw = catalog.raw.len(), jpeg = catalog.jpeg.len(), "Scan complete");
    Ok(catalog)
}

async fn process_entry(entry: DirEntry, raw_extensions: &HashSet<String>) -> WalkEntry {
    let path = entry.path();
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        tracing::debug!(path = %path.display(), "Skipping non-UTF-8 filename");
        return WalkEntry::Skip;
    };
    if name.starts_with(APPLE_DOUBLE_PREFIX) {
        return WalkEntry::Skip;
    }
    let metadata = match entry.metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
            return WalkEntry::Skip;
        },
    };
    if metadata.is_dir() {
        return WalkEntry::Descend(path);
    }
    if !metadata.is_file() {
        return WalkEntry::Skip;
    }
    let Some(kind) = classify(name, raw_extensions) else {
        return WalkEntry::Skip;
    };
    let modified = metadata.modified().map(Into::into).unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    match FileRecord::new(path, metadata.len(), modified, kind) {
        Some(record) => WalkEntry::File(record),
        None => WalkEntry::Skip,
    }
}

fn classify(name: &str, raw_extensions: &HashSet<String>) -> Option<FileKind> {
    let extension = Path::new(name).extension()?.to_str()?;
    let extension = format!(".{}", extension.to_uppercase());
    if raw_extensions.contains(&extension) {
        Some(FileKind::Raw)
    } else if JPEG_EXTENSIONS.contains(&extension.as_str()) {
        Some(FileKind::Jpeg)
    } else {
        None
    }
}
