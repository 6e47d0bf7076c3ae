//! Locating the mounted card.
//!
//! Label lookup is a capability trait with a platform-selected implementation
//! ([`platform_resolver`]): mount-point directories on Unix, the disk list
//! with its volume names on Windows. [`FixedPath`] bypasses the lookup.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
#[cfg(any(windows, test))]
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A mounted volume and the label it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub label: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait VolumeResolver: Send + Sync {
    /// Every volume this resolver can currently see.
    async fn list_all(&self) -> Result<Vec<Volume>>;

    /// Find the volume whose label matches, ignoring case.
    async fn resolve(&self, label: &str) -> Result<Volume> {
        let wanted = label.to_lowercase();
        self.list_all()
            .await?
            .into_iter()
            .find(|volume| volume.label.to_lowercase() == wanted)
            .ok_or_else(|| exn::Exn::from(ErrorKind::VolumeNotFound(label.to_string())))
    }
}

/// The label resolver for this platform.
pub fn platform_resolver() -> Box<dyn VolumeResolver> {
    #[cfg(windows)]
    {
        Box::new(DriveLetters)
    }
    #[cfg(not(windows))]
    {
        Box::new(MountRoots::platform_default())
    }
}

/// Every mounted disk, labelled with its volume name (`D:\` shows up as
/// `OM SYSTEM`). Drives without a name are labelled by their letter.
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveLetters;

#[cfg(windows)]
#[async_trait]
impl VolumeResolver for DriveLetters {
    async fn list_all(&self) -> Result<Vec<Volume>> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mut volumes: Vec<Volume> = Vec::with_capacity(disks.list().len());
        for disk in disks.list() {
            let volume = drive_volume(disk.name(), disk.mount_point());
            if !volumes.iter().any(|v| v.path == volume.path) {
                volumes.push(volume);
            }
        }
        Ok(volumes)
    }
}

#[cfg(any(windows, test))]
fn drive_volume(name: &OsStr, mount: &Path) -> Volume {
    let name = name.to_string_lossy();
    let label = match name.trim() {
        "" => mount.to_string_lossy().trim_end_matches(['\\', '/']).to_string(),
        label => label.to_string(),
    };
    Volume { label, path: mount.to_path_buf() }
}

/// Treats each directory directly under a set of mount roots as a volume
/// labelled by its directory name.
#[derive(Debug, Clone)]
pub struct MountRoots {
    roots: Vec<PathBuf>,
}

impl MountRoots {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self { roots: roots.into_iter().map(Into::into).collect() }
    }

    #[cfg(target_os = "macos")]
    pub fn platform_default() -> Self {
        Self::new(["/Volumes"])
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    pub fn platform_default() -> Self {
        // udisks mounts under a per-user directory; older setups and manual
        // mounts use the shared ones.
        let mut roots = Vec::new();
        if let Ok(user) = std::env::var("USER") {
            roots.push(PathBuf::from("/media").join(&user));
            roots.push(PathBuf::from("/run/media").join(&user));
        }
        roots.extend([PathBuf::from("/media"), PathBuf::from("/mnt")]);
        Self { roots }
    }

    #[cfg(not(unix))]
    pub fn platform_default() -> Self {
        Self { roots: Vec::new() }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn list_root(root: &Path, into: &mut Vec<Volume>) -> Result<()> {
        let mut entries = fs::read_dir(root).await.or_raise(|| ErrorKind::Unreadable(root.to_path_buf()))?;
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Unreadable(root.to_path_buf()))? {
            // Symlinks are skipped on purpose: macOS links the boot volume in here.
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let path = entry.path();
            if into.iter().any(|v| v.path == path) {
                continue;
            }
            let Some(label) = path.file_name().and_then(|n| n.to_str()) else { continue };
            // Mounted but inaccessible (e.g. a stale automount).
            if fs::read_dir(&path).await.is_err() {
                tracing::debug!(path = %path.display(), "Skipping inaccessible volume");
                continue;
            }
            into.push(Volume { label: label.to_string(), path });
        }
        Ok(())
    }
}

#[async_trait]
impl VolumeResolver for MountRoots {
    async fn list_all(&self) -> Result<Vec<Volume>> {
        if self.roots.is_empty() {
            exn::bail!(ErrorKind::Unsupported);
        }
        let mut volumes = Vec::new();
        for root in &self.roots {
            match Self::list_root(root, &mut volumes).await {
                Ok(()) => {},
                Err(e) => tracing::trace!(root = %root.display(), error = ?e, "Mount root not listable"),
            }
        }
        Ok(volumes)
    }
}

/// A volume given directly by path, bypassing label lookup.
#[derive(Debug, Clone)]
pub struct FixedPath {
    path: PathBuf,
}

impl FixedPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn volume(&self) -> Volume {
        let label = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.path.display().to_string());
        Volume { label, path: self.path.clone() }
    }
}

#[async_trait]
impl VolumeResolver for FixedPath {
    async fn list_all(&self) -> Result<Vec<Volume>> {
        Ok(match fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_dir() => vec![self.volume()],
            _ => Vec::new(),
        })
    }

    /// The label is not checked; the configured path is the card.
    async fn resolve(&self, _label: &str) -> Result<Volume> {
        match fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_dir() => Ok(self.volume()),
            Ok(_) => exn::bail!(ErrorKind::NotADirectory(self.path.clone())),
            Err(_) => exn::bail!(ErrorKind::VolumeNotFound(self.path.display().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::named("OM SYSTEM", r"D:\", "OM SYSTEM")]
    #[case::padded(" EOS_DIGITAL ", r"E:\", "EOS_DIGITAL")]
    #[case::unnamed("", r"F:\", "F:")]
    fn test_drive_volume_label(#[case] name: &str, #[case] mount: &str, #[case] expected: &str) {
        let volume = drive_volume(OsStr::new(name), Path::new(mount));
        assert_eq!(volume.label, expected);
        assert_eq!(volume.path, Path::new(mount));
    }

    fn mount_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("OM SYSTEM")).unwrap();
        std::fs::create_dir(dir.path().join("Backup")).unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_mount_roots_lists_directories_only() {
        let dir = mount_fixture();
        let resolver = MountRoots::new([dir.path()]);
        let mut labels: Vec<_> = resolver.list_all().await.unwrap().into_iter().map(|v| v.label).collect();
        labels.sort();
        assert_eq!(labels, ["Backup", "OM SYSTEM"]);
    }

    #[tokio::test]
    async fn test_resolve_ignores_case() {
        let dir = mount_fixture();
        let resolver = MountRoots::new([dir.path()]);
        let volume = resolver.resolve("om system").await.unwrap();
        assert_eq!(volume.label, "OM SYSTEM");
        assert_eq!(volume.path, dir.path().join("OM SYSTEM"));
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let dir = mount_fixture();
        let resolver = MountRoots::new([dir.path()]);
        let err = resolver.resolve("NIKON").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::VolumeNotFound(label) if label == "NIKON"));
    }

    #[tokio::test]
    async fn test_missing_roots_are_skipped() {
        let dir = mount_fixture();
        let resolver = MountRoots::new([dir.path().join("nope"), dir.path().to_path_buf()]);
        assert_eq!(resolver.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_roots_is_unsupported() {
        let resolver = MountRoots::new(Vec::<PathBuf>::new());
        let err = resolver.list_all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported));
    }

    #[tokio::test]
    async fn test_fixed_path_ignores_label() {
        let dir = mount_fixture();
        let resolver = FixedPath::new(dir.path().join("Backup"));
        let volume = resolver.resolve("OM SYSTEM").await.unwrap();
        assert_eq!(volume.label, "Backup");

        let missing = FixedPath::new(dir.path().join("gone"));
        assert!(missing.resolve("x").await.is_err());
        assert!(missing.list_all().await.unwrap().is_empty());
    }
}
