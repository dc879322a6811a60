//! Both ledger stores honor the same contract through the trait object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use restripe_ledger::{LmdbLedger, MemoryLedger, PassLedger};
use tempfile::TempDir;

fn exercise(ledger: Arc<dyn PassLedger>) {
    let files: Vec<PathBuf> = (0..20)
        .map(|i| PathBuf::from(format!("/srv/pool/file_{}.bin", i)))
        .collect();

    for f in &files {
        assert_eq!(ledger.get(f).unwrap(), 0);
    }

    // Three passes; every successful rewrite bumps by one
    for pass in 1..=3u32 {
        for f in &files {
            let current = ledger.get(f).unwrap();
            ledger.set(f, current + 1).unwrap();
        }
        for f in &files {
            assert_eq!(ledger.get(f).unwrap(), pass);
        }
    }

    assert_eq!(ledger.get(Path::new("/srv/pool/other")).unwrap(), 0);
}

#[test]
fn memory_ledger_contract() {
    exercise(Arc::new(MemoryLedger::new()));
}

#[test]
fn lmdb_ledger_contract() {
    let temp = TempDir::new().unwrap();
    exercise(Arc::new(LmdbLedger::open(temp.path()).unwrap()));
}

#[test]
fn lmdb_ledger_released_after_shared_use() {
    let ledger = Arc::new(LmdbLedger::create_temp().unwrap());
    let shared: Arc<dyn PassLedger> = ledger.clone();
    shared.set(Path::new("/a"), 1).unwrap();
    drop(shared);

    let ledger = Arc::try_unwrap(ledger).ok().unwrap();
    let dir = ledger.location().unwrap().to_path_buf();
    ledger.teardown(true).unwrap();
    assert!(!dir.exists());
}
