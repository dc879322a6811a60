//! Attribute Comparator
//!
//! Captures size, permission bits, ownership and timestamps of a file and
//! reports every attribute on which two snapshots disagree.

use std::fmt;
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::platform::{inspector, Ownership};

/// One attribute that differs between two files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMismatch {
    Size,
    Mode,
    Uid,
    Gid,
    ModTime,
}

impl fmt::Display for AttributeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttributeMismatch::Size => "size mismatch",
            AttributeMismatch::Mode => "mode mismatch",
            AttributeMismatch::Uid => "uid mismatch",
            AttributeMismatch::Gid => "gid mismatch",
            AttributeMismatch::ModTime => "mod time mismatch",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of the attributes the replace protocol must preserve.
#[derive(Debug, Clone)]
pub struct AttributeSnapshot {
    pub size: u64,
    pub permissions: Permissions,
    pub modified: SystemTime,
    pub accessed: Option<SystemTime>,
    pub ownership: Option<Ownership>,
}

impl AttributeSnapshot {
    /// Snapshot `path`, following symlinks.
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Self::from_metadata(&meta)
    }

    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size: meta.len(),
            permissions: meta.permissions(),
            modified: meta.modified()?,
            accessed: meta.accessed().ok(),
            ownership: inspector().ownership(meta),
        })
    }

    /// Permission bits as an octal-friendly integer (0 where not exposed).
    pub fn mode(&self) -> u32 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            self.permissions.mode() & 0o7777
        }
        #[cfg(not(unix))]
        {
            if self.permissions.readonly() {
                0o444
            } else {
                0o644
            }
        }
    }

    /// Every attribute on which `other` differs from `self`.
    ///
    /// Ownership is only compared when both sides expose it.
    pub fn diff(&self, other: &AttributeSnapshot) -> Vec<AttributeMismatch> {
        let mut mismatches = Vec::new();

        if self.size != other.size {
            mismatches.push(AttributeMismatch::Size);
        }
        if self.mode() != other.mode() {
            mismatches.push(AttributeMismatch::Mode);
        }
        if let (Some(a), Some(b)) = (self.ownership, other.ownership) {
            if a.uid != b.uid {
                mismatches.push(AttributeMismatch::Uid);
            }
            if a.gid != b.gid {
                mismatches.push(AttributeMismatch::Gid);
            }
        }
        if self.modified != other.modified {
            mismatches.push(AttributeMismatch::ModTime);
        }

        mismatches
    }
}

/// Compare the attributes of two files on disk.
pub fn compare_attributes(original: &Path, copy: &Path) -> io::Result<Vec<AttributeMismatch>> {
    let a = AttributeSnapshot::capture(original)?;
    let b = AttributeSnapshot::capture(copy)?;
    Ok(a.diff(&b))
}
