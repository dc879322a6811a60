//! Link Inspector
//!
//! Platform-specific view of hardlink counts, inode identity and ownership.
//!
//! # Design
//!
//! - **Unix**: reads `st_nlink`, `st_dev`/`st_ino`, `st_uid`/`st_gid`; `chown` via nix
//! - **Other**: one link per file, no identity, no ownership model
//!
//! Where a concept does not exist the inspector returns `None` (or a link count
//! of 1) instead of an error, so callers degrade to "not hardlinked, nothing to
//! compare".

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

/// Owner and group of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Device + inode pair; two paths with the same identity are hardlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

// ============================================================================
// LinkInspector Trait
// ============================================================================

pub trait LinkInspector: Send + Sync {
    /// Number of directory entries pointing at this inode.
    fn link_count(&self, meta: &Metadata) -> u64;

    /// Inode identity, `None` where inodes are not exposed.
    fn identity(&self, meta: &Metadata) -> Option<FileIdentity>;

    /// Owner/group, `None` where the platform has no such model.
    fn ownership(&self, meta: &Metadata) -> Option<Ownership>;

    /// Change owner/group. Fails with `Unsupported` where there is no model.
    fn set_ownership(&self, path: &Path, owner: Ownership) -> io::Result<()>;

    /// Name of this inspector (for logging/debugging)
    fn name(&self) -> &'static str;
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
pub struct UnixInspector;

#[cfg(unix)]
impl LinkInspector for UnixInspector {
    fn link_count(&self, meta: &Metadata) -> u64 {
        use std::os::unix::fs::MetadataExt;
        meta.nlink()
    }

    fn identity(&self, meta: &Metadata) -> Option<FileIdentity> {
        use std::os::unix::fs::MetadataExt;
        Some(FileIdentity {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    fn ownership(&self, meta: &Metadata) -> Option<Ownership> {
        use std::os::unix::fs::MetadataExt;
        Some(Ownership {
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    fn set_ownership(&self, path: &Path, owner: Ownership) -> io::Result<()> {
        use nix::unistd::{chown, Gid, Uid};
        chown(
            path,
            Some(Uid::from_raw(owner.uid)),
            Some(Gid::from_raw(owner.gid)),
        )
        .map_err(io::Error::from)
    }

    fn name(&self) -> &'static str {
        "unix"
    }
}

// ============================================================================
// Fallback Implementation
// ============================================================================

#[cfg(not(unix))]
pub struct FallbackInspector;

#[cfg(not(unix))]
impl LinkInspector for FallbackInspector {
    fn link_count(&self, _meta: &Metadata) -> u64 {
        1
    }

    fn identity(&self, _meta: &Metadata) -> Option<FileIdentity> {
        None
    }

    fn ownership(&self, _meta: &Metadata) -> Option<Ownership> {
        None
    }

    fn set_ownership(&self, _path: &Path, _owner: Ownership) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "ownership not supported on this platform",
        ))
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Get the inspector for the current platform
#[cfg(unix)]
pub fn inspector() -> &'static dyn LinkInspector {
    static INSPECTOR: UnixInspector = UnixInspector;
    &INSPECTOR
}

#[cfg(not(unix))]
pub fn inspector() -> &'static dyn LinkInspector {
    static INSPECTOR: FallbackInspector = FallbackInspector;
    &INSPECTOR
}

/// Hardlink count of `path` (not following symlinks).
pub fn link_count(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    Ok(inspector().link_count(&meta))
}

/// Inode identity of `path` (not following symlinks).
pub fn identity(path: &Path) -> io::Result<Option<FileIdentity>> {
    let meta = fs::symlink_metadata(path)?;
    Ok(inspector().identity(&meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inspector_name() {
        assert!(!inspector().name().is_empty());
    }

    #[test]
    fn test_single_link() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("single.txt");
        fs::write(&path, b"link count test").unwrap();
        assert_eq!(link_count(&path).unwrap(), 1);
    }

    #[test]
    fn test_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let err = link_count(&temp.path().join("nonexistent.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_hardlinks_share_identity() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, b"shared").unwrap();
        fs::hard_link(&a, &b).unwrap();

        assert_eq!(link_count(&a).unwrap(), 2);
        assert_eq!(link_count(&b).unwrap(), 2);
        assert_eq!(identity(&a).unwrap(), identity(&b).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_ownership_matches_process() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("owned.txt");
        fs::write(&path, b"x").unwrap();

        let meta = fs::metadata(&path).unwrap();
        let owner = inspector().ownership(&meta).unwrap();
        assert_eq!(owner.uid, nix::unistd::geteuid().as_raw());

        // chown to ourselves is always permitted
        inspector().set_ownership(&path, owner).unwrap();
    }
}
