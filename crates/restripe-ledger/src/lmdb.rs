//! LMDB-backed pass ledger.
//!
//! One named database, `passes`, mapping `blake3(path)` to a bincode `u32`.
//! Every `set` is its own write transaction, so a crash never loses a count
//! that was reported as written.

use std::path::{Path, PathBuf};

use heed::types::{Bytes, SerdeBincode};
use heed::{Database, Env, EnvOpenOptions};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{path_key, LedgerResult, PassLedger};

/// Prefix of the per-invocation temp directory.
pub const TEMP_DIR_PREFIX: &str = "restripe_ledger_";

pub struct LmdbLedger {
    env: Env,

    /// Path hash → completed passes
    counts_db: Database<Bytes, SerdeBincode<u32>>,

    dir: PathBuf,

    /// Set when the ledger owns a throwaway directory.
    temp: Option<TempDir>,
}

impl LmdbLedger {
    /// Default LMDB map size: 1GB (virtual; the file grows on demand)
    const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum readers; one per worker plus headroom
    const MAX_READERS: u32 = 256;

    /// Open or create a ledger in `dir`. The directory is kept on teardown.
    pub fn open<P: AsRef<Path>>(dir: P) -> LedgerResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Self::open_in(dir.to_path_buf(), None)
    }

    /// Create a ledger in a fresh `restripe_ledger_*` temp directory.
    pub fn create_temp() -> LedgerResult<Self> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()?;
        Self::open_in(temp.path().to_path_buf(), Some(temp))
    }

    fn open_in(dir: PathBuf, temp: Option<TempDir>) -> LedgerResult<Self> {
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(1)
                .open(&dir)?
        };

        let mut wtxn = env.write_txn()?;
        let counts_db = env.create_database(&mut wtxn, Some("passes"))?;
        wtxn.commit()?;

        debug!("Opened pass ledger at {:?}", dir);

        Ok(Self {
            env,
            counts_db,
            dir,
            temp,
        })
    }

    /// True when the ledger lives in its own temp directory.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Number of recorded paths.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> LedgerResult<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.counts_db.len(&rtxn)?)
    }

    /// Close the environment and release storage.
    ///
    /// With `remove_storage`, a temp directory is deleted; otherwise it is left
    /// on disk and its path returned. A directory passed to [`open`](Self::open)
    /// is never deleted.
    pub fn teardown(self, remove_storage: bool) -> LedgerResult<Option<PathBuf>> {
        let LmdbLedger { env, dir, temp, .. } = self;

        if let Err(e) = env.force_sync() {
            warn!("Ledger sync before close failed: {}", e);
        }
        env.prepare_for_closing().wait();

        match temp {
            Some(temp) if remove_storage => {
                temp.close()?;
                debug!("Removed pass ledger at {:?}", dir);
                Ok(None)
            }
            Some(temp) => Ok(Some(temp.keep())),
            None => Ok(Some(dir)),
        }
    }
}

impl PassLedger for LmdbLedger {
    fn get(&self, path: &Path) -> LedgerResult<u32> {
        let key = path_key(path);
        let rtxn = self.env.read_txn()?;
        Ok(self.counts_db.get(&rtxn, &key)?.unwrap_or(0))
    }

    fn set(&self, path: &Path, count: u32) -> LedgerResult<()> {
        let key = path_key(path);
        let mut wtxn = self.env.write_txn()?;
        self.counts_db.put(&mut wtxn, &key, &count)?;
        wtxn.commit()?;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}
