use std::io;
use std::path::{Path, PathBuf};

use restripe_fs::ChecksumError;
use restripe_ledger::LedgerError;
use thiserror::Error;

use crate::outcome::RunSummary;

/// How bad a per-file failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The original (or a verified copy under the original name) is intact.
    Recoverable,
    /// The original is gone and the data sits in a side file.
    Critical,
}

/// Failure of a single replace operation.
#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error("hardlink check failed for {}: {source}", path.display())]
    LinkCheck {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger read error for {}: {source}", path.display())]
    LedgerRead {
        path: PathBuf,
        #[source]
        source: LedgerError,
    },

    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy failed for {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{algorithm} checksum mismatch for file {}: {reason}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: String,
        reason: String,
    },

    #[error("verification failed for {}: {source}", path.display())]
    Verify {
        path: PathBuf,
        #[source]
        source: ChecksumError,
    },

    #[error("remove failed for {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "CRITICAL: rename failed for {}, data saved to {}: {source}",
        path.display(),
        saved_to.display()
    )]
    RenameFailed {
        path: PathBuf,
        /// `<path>.recovered`, or the temp file if even that rename failed
        saved_to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fix permissions for {}: {source}", path.display())]
    RestorePermissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fix timestamps for {}: {source}", path.display())]
    RestoreTimestamps {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file disappeared after rename: {}", path.display())]
    VanishedAfterRename { path: PathBuf },

    #[error("ledger update error for {}: {source}", path.display())]
    LedgerWrite {
        path: PathBuf,
        #[source]
        source: LedgerError,
    },
}

impl RebalanceError {
    pub fn path(&self) -> &Path {
        match self {
            RebalanceError::LinkCheck { path, .. }
            | RebalanceError::LedgerRead { path, .. }
            | RebalanceError::Stat { path, .. }
            | RebalanceError::Copy { path, .. }
            | RebalanceError::ChecksumMismatch { path, .. }
            | RebalanceError::Verify { path, .. }
            | RebalanceError::Remove { path, .. }
            | RebalanceError::RenameFailed { path, .. }
            | RebalanceError::RestorePermissions { path, .. }
            | RebalanceError::RestoreTimestamps { path, .. }
            | RebalanceError::VanishedAfterRename { path }
            | RebalanceError::LedgerWrite { path, .. } => path,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            RebalanceError::RenameFailed { .. } => Severity::Critical,
            _ => Severity::Recoverable,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }

    /// Content is correct; only metadata or bookkeeping lagged behind.
    pub fn content_intact(&self) -> bool {
        matches!(
            self,
            RebalanceError::RestorePermissions { .. }
                | RebalanceError::RestoreTimestamps { .. }
                | RebalanceError::LedgerWrite { .. }
        )
    }
}

/// Failure of a whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to gather files under {}: {source}", root.display())]
    GatherFiles {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "some files failed to rebalance ({} failed, {} critical)",
        summary.failed,
        summary.critical
    )]
    SomeFilesFailed { summary: RunSummary },

    #[error("failed to start worker threads: {0}")]
    WorkerSpawn(#[source] io::Error),
}

impl RunError {
    /// Summary of the work that did happen, for aggregate failures.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunError::SomeFilesFailed { summary } => Some(summary),
            _ => None,
        }
    }

    /// Fatal errors stop before (or without) processing files.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RunError::SomeFilesFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rename_failure_is_critical() {
        let rename = RebalanceError::RenameFailed {
            path: "/d/a".into(),
            saved_to: "/d/a.recovered".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(rename.is_critical());
        assert!(rename.to_string().starts_with("CRITICAL"));
        assert!(rename.to_string().contains("/d/a.recovered"));

        let mismatch = RebalanceError::ChecksumMismatch {
            path: "/d/a".into(),
            algorithm: "sha256".into(),
            reason: "x != y".into(),
        };
        assert_eq!(mismatch.severity(), Severity::Recoverable);
        assert_eq!(
            mismatch.to_string(),
            "sha256 checksum mismatch for file /d/a: x != y"
        );
        assert_eq!(mismatch.path(), Path::new("/d/a"));
    }

    #[test]
    fn test_content_intact_classification() {
        let perms = RebalanceError::RestorePermissions {
            path: "/d/a".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(perms.content_intact());

        let copy = RebalanceError::Copy {
            path: "/d/a".into(),
            source: io::Error::from(io::ErrorKind::Other),
        };
        assert!(!copy.content_intact());
    }

    #[test]
    fn test_run_error_display() {
        let summary = RunSummary {
            failed: 2,
            critical: 1,
            ..RunSummary::default()
        };
        let err = RunError::SomeFilesFailed { summary };
        assert_eq!(
            err.to_string(),
            "some files failed to rebalance (2 failed, 1 critical)"
        );
        assert!(!err.is_fatal());
        assert_eq!(err.summary().unwrap().failed, 2);
    }
}
