//! Tree enumeration.
//!
//! Symlinks are never followed. Entries below the root that cannot be read are
//! logged and skipped; only an unreadable root fails the walk.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::is_temp_artifact;

/// Every regular file under `root`, in stable (per-directory, by name) order.
///
/// Temp artifacts are included; the replacer decides what to do with them.
pub fn gather_regular_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    collect(root, |entry| entry.file_type().is_file())
}

/// Every `*.balance` entry under `root` that is not a directory, symlinks
/// included.
pub fn find_temp_artifacts(root: &Path) -> io::Result<Vec<PathBuf>> {
    collect(root, |entry| {
        entry.depth() > 0 && !entry.file_type().is_dir() && is_temp_artifact(entry.path())
    })
}

fn collect(root: &Path, keep: impl Fn(&DirEntry) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                tracing::warn!(path = %path, error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if keep(&entry) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("a.txt"), b"AAAA").unwrap();
        fs::write(root.join("nested/b.txt"), b"BBBB").unwrap();
        fs::write(root.join("nested/deeper/c.bin"), b"CCCC").unwrap();
        fs::write(root.join("nested/b.txt.balance"), b"BB").unwrap();
        temp
    }

    #[test]
    fn test_gather_finds_all_regular_files() {
        let temp = tree();
        let files = gather_regular_files(temp.path()).unwrap();
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|p| p.is_file()));
        assert!(files.contains(&temp.path().join("nested/deeper/c.bin")));
    }

    #[test]
    fn test_find_temp_artifacts_only() {
        let temp = tree();
        let stale = find_temp_artifacts(temp.path()).unwrap();
        assert_eq!(stale, vec![temp.path().join("nested/b.txt.balance")]);
    }

    #[test]
    fn test_empty_dir() {
        let temp = TempDir::new().unwrap();
        assert!(gather_regular_files(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp = TempDir::new().unwrap();
        let err = gather_regular_files(&temp.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let temp = tree();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("a.txt"), temp.path().join("a.lnk")).unwrap();

        let files = gather_regular_files(temp.path()).unwrap();
        assert_eq!(files.len(), 4);
        assert!(!files.iter().any(|p| p.starts_with(temp.path().join("link"))));
    }

    #[cfg(unix)]
    #[test]
    fn test_temp_artifacts_include_symlinks_not_dirs() {
        let temp = tree();
        let root = temp.path();
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("a.txt.balance")).unwrap();
        fs::create_dir(root.join("odd.balance")).unwrap();

        let stale = find_temp_artifacts(root).unwrap();
        assert_eq!(
            stale,
            vec![root.join("a.txt.balance"), root.join("nested/b.txt.balance")]
        );
        // the symlinked one is not a rebalance target
        let files = gather_regular_files(root).unwrap();
        assert!(!files.contains(&root.join("a.txt.balance")));
    }
}
