//! # restripe-ledger
//!
//! Maps an absolute file path to the number of verified rewrites it has had.
//!
//! Counts only ever move up by one, after a replace fully succeeds, so a
//! count of `n` means the file's current blocks were written by the `n`th
//! rewrite. Running again with a pass limit `L` touches only files below `L`.
//!
//! Two stores:
//!
//! - [`LmdbLedger`]: LMDB via heed; fresh temp directory per invocation by
//!   default, or a fixed directory that survives across invocations
//! - [`MemoryLedger`]: DashMap, for tests and dry integrations

pub mod lmdb;

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;

pub use lmdb::LmdbLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Thread-safe pass-count store.
pub trait PassLedger: Send + Sync {
    /// Completed passes for `path`; 0 when never recorded.
    fn get(&self, path: &Path) -> LedgerResult<u32>;

    /// Record `count` completed passes for `path`.
    fn set(&self, path: &Path, count: u32) -> LedgerResult<()>;

    /// Backing directory, if the store lives on disk.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// 32-byte key for `path`.
///
/// Hashed because LMDB caps keys at 511 bytes and paths do not.
pub fn path_key(path: &Path) -> [u8; 32] {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        *blake3::hash(path.as_os_str().as_bytes()).as_bytes()
    }
    #[cfg(not(unix))]
    {
        *blake3::hash(path.to_string_lossy().as_bytes()).as_bytes()
    }
}

/// In-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    counts: DashMap<PathBuf, u32>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl PassLedger for MemoryLedger {
    fn get(&self, path: &Path) -> LedgerResult<u32> {
        Ok(self.counts.get(path).map(|c| *c).unwrap_or(0))
    }

    fn set(&self, path: &Path, count: u32) -> LedgerResult<()> {
        self.counts.insert(path.to_path_buf(), count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_ledger_defaults_to_zero() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get(Path::new("/never/seen")).unwrap(), 0);
        assert!(ledger.is_empty());
        assert!(ledger.location().is_none());
    }

    #[test]
    fn test_memory_ledger_set_get() {
        let ledger = MemoryLedger::new();
        let p = Path::new("/data/a.txt");
        ledger.set(p, 1).unwrap();
        ledger.set(p, 2).unwrap();
        assert_eq!(ledger.get(p).unwrap(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_memory_ledger_concurrent_writers() {
        let ledger = Arc::new(MemoryLedger::new());
        std::thread::scope(|s| {
            for t in 0..4 {
                let ledger = Arc::clone(&ledger);
                s.spawn(move || {
                    for i in 0..100 {
                        let p = PathBuf::from(format!("/t{}/f{}", t, i));
                        ledger.set(&p, i).unwrap();
                    }
                });
            }
        });
        assert_eq!(ledger.len(), 400);
        assert_eq!(ledger.get(Path::new("/t3/f99")).unwrap(), 99);
    }

    #[test]
    fn test_path_key_distinguishes_paths() {
        let a = path_key(Path::new("/x/a"));
        let b = path_key(Path::new("/x/b"));
        assert_ne!(a, b);
        assert_eq!(a, path_key(Path::new("/x/a")));
    }
}
