//! Filesystem access seam for collectors.
//!
//! Every collector reads kernel interfaces through the [`FileSystem`] trait so
//! that a scrape can run against the live host ([`RealFs`]) or against an
//! in-memory fixture ([`MockFs`]) in tests.

use ahash::AHashMap as HashMap;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Abstraction for the read-only filesystem operations a scrape needs.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Lists entries in a directory, sorted by path.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns true if `path` is a directory. Symlinks are not followed.
    fn is_dir(&self, path: &Path) -> bool;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(path)? {
            paths.push(entry?.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn is_dir(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

/// In-memory filesystem for tests and offline fixtures.
///
/// Parent directories are created implicitly when a file is added. Paths
/// registered with [`MockFs::deny`] fail every operation with
/// `PermissionDenied`, which is how tests simulate an inaccessible cgroup.
#[derive(Debug, Default)]
pub struct MockFs {
    files: RwLock<HashMap<PathBuf, String>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    denied: RwLock<BTreeSet<PathBuf>>,
    reads: RwLock<HashMap<PathBuf, AtomicUsize>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file and all of its parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) -> &Self {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        if let Ok(mut files) = self.files.write() {
            files.insert(path, content.into());
        }
        self
    }

    /// Adds an empty directory and its parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        if let Ok(mut dirs) = self.dirs.write() {
            dirs.insert(path);
        }
        self
    }

    /// Makes every operation on `path` fail as if permission was denied.
    pub fn deny(&self, path: impl AsRef<Path>) -> &Self {
        if let Ok(mut denied) = self.denied.write() {
            denied.insert(path.as_ref().to_path_buf());
        }
        self
    }

    /// Number of successful and failed `read_to_string` calls for `path`.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .read()
            .ok()
            .and_then(|reads| {
                reads
                    .get(path.as_ref())
                    .map(|c| c.load(Ordering::Relaxed))
            })
            .unwrap_or(0)
    }

    fn add_parents(&self, path: &Path) {
        if let Ok(mut dirs) = self.dirs.write() {
            for ancestor in path.ancestors().skip(1) {
                if ancestor.as_os_str().is_empty() {
                    break;
                }
                dirs.insert(ancestor.to_path_buf());
            }
        }
    }

    fn is_denied(&self, path: &Path) -> bool {
        self.denied
            .read()
            .map(|denied| denied.contains(path))
            .unwrap_or(false)
    }

    fn record_read(&self, path: &Path) {
        if let Ok(reads) = self.reads.read() {
            if let Some(counter) = reads.get(path) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        if let Ok(mut reads) = self.reads.write() {
            reads
                .entry(path.to_path_buf())
                .or_insert_with(|| AtomicUsize::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("permission denied: {}", path.display()),
    )
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.record_read(path);
        if self.is_denied(path) {
            return Err(denied(path));
        }
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| not_found(path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if self.is_denied(path) {
            return Err(denied(path));
        }
        if !self.is_dir(path) {
            return Err(not_found(path));
        }

        let mut entries = BTreeSet::new();
        if let Ok(dirs) = self.dirs.read() {
            entries.extend(dirs.iter().filter(|d| d.parent() == Some(path)).cloned());
        }
        if let Ok(files) = self.files.read() {
            entries.extend(files.keys().filter(|f| f.parent() == Some(path)).cloned());
        }
        Ok(entries.into_iter().collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs
            .read()
            .map(|dirs| dirs.contains(path))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_lists_files_and_dirs_sorted() {
        let fs = MockFs::new();
        fs.add_file("/root/b/file", "x");
        fs.add_file("/root/a", "y");
        fs.add_dir("/root/c");

        let entries = fs.read_dir(Path::new("/root")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/root/a"),
                PathBuf::from("/root/b"),
                PathBuf::from("/root/c")
            ]
        );
        assert!(fs.is_dir(Path::new("/root/b")));
        assert!(!fs.is_dir(Path::new("/root/a")));
    }

    #[test]
    fn test_mock_fs_denied_path_fails() {
        let fs = MockFs::new();
        fs.add_file("/secret/file", "x");
        fs.deny("/secret");

        let err = fs.read_dir(Path::new("/secret")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs.read_to_string(Path::new("/secret/file")).unwrap(), "x");
    }

    #[test]
    fn test_mock_fs_counts_reads() {
        let fs = MockFs::new();
        fs.add_file("/f", "1");
        let _ = fs.read_to_string(Path::new("/f"));
        let _ = fs.read_to_string(Path::new("/f"));
        let _ = fs.read_to_string(Path::new("/missing"));

        assert_eq!(fs.read_count("/f"), 2);
        assert_eq!(fs.read_count("/missing"), 1);
        assert_eq!(fs.read_count("/never"), 0);
    }

    #[test]
    fn test_real_fs_reads_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b"), "two").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let fs = RealFs;
        let entries = fs.read_dir(dir.path()).unwrap();
        assert_eq!(entries, vec![dir.path().join("a"), dir.path().join("b")]);
        assert!(fs.is_dir(&dir.path().join("a")));
        assert_eq!(fs.read_to_string(&dir.path().join("b")).unwrap(), "two");
    }
}
