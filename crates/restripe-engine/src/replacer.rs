//! File Replacer
//!
//! Executes the replace protocol for one path. See the crate docs for the
//! step diagram.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use filetime::FileTime;
use restripe_config::{log_replace_debug, log_replace_error, log_replace_info, log_replace_warn};
use restripe_config::RunConfig;
use restripe_fs::checksum::compare_files;
use restripe_fs::platform::{self, inspector};
use restripe_fs::{
    copy_file, is_temp_artifact, recovery_path_for, temp_path_for, AttributeSnapshot,
    ChecksumError, Digester,
};
use restripe_ledger::PassLedger;

use crate::error::RebalanceError;
use crate::outcome::{Disposition, SkipReason};
use crate::shutdown::ShutdownSignal;

const MIB: f64 = 1024.0 * 1024.0;

pub struct FileReplacer {
    config: Arc<RunConfig>,
    ledger: Arc<dyn PassLedger>,
    shutdown: ShutdownSignal,
    digester: Arc<dyn Digester>,
}

impl FileReplacer {
    /// Replacer verifying with `config.checksum`.
    pub fn new(config: Arc<RunConfig>, ledger: Arc<dyn PassLedger>, shutdown: ShutdownSignal) -> Self {
        let digester: Arc<dyn Digester> = Arc::new(config.checksum);
        Self {
            config,
            ledger,
            shutdown,
            digester,
        }
    }

    /// Verify with a caller-supplied digest function instead.
    pub fn with_digester(mut self, digester: Arc<dyn Digester>) -> Self {
        self.digester = digester;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Rewrite `path` in place.
    ///
    /// Skips and vanished files are `Ok`. Any `Err` other than
    /// [`RebalanceError::RenameFailed`] leaves the content under `path`
    /// exactly as it was (or as a verified copy of it).
    pub fn rebalance(&self, path: &Path) -> Result<Disposition, RebalanceError> {
        let shown = self.config.display_path(path);

        // 1. Skip filters
        if is_temp_artifact(path) {
            log_replace_debug!("Skipping temporary .balance file", path = %shown);
            return Ok(Disposition::Skipped(SkipReason::TempArtifact));
        }

        if self.config.skip_hardlinks {
            match platform::link_count(path) {
                Ok(links) if links > 1 => {
                    log_replace_debug!(
                        "Skipping hard-linked file (use --process-hardlinks to include)",
                        path = %shown,
                        links = links
                    );
                    return Ok(Disposition::Skipped(SkipReason::Hardlinked));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.missing(path)),
                Err(source) => {
                    return Err(RebalanceError::LinkCheck {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }

        let limit = self.config.passes_limit;
        let old_count = if limit > 0 {
            self.ledger
                .get(path)
                .map_err(|source| RebalanceError::LedgerRead {
                    path: path.to_path_buf(),
                    source,
                })?
        } else {
            0
        };
        if limit > 0 && old_count >= limit {
            log_replace_debug!("Pass count reached, skipping", path = %shown, count = old_count);
            return Ok(Disposition::Skipped(SkipReason::PassLimitReached));
        }

        // 2. Existence and type
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.missing(path)),
            Err(source) => {
                return Err(RebalanceError::Stat {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if !meta.file_type().is_file() {
            log_replace_debug!("Skipping non-regular file", path = %shown);
            return Ok(Disposition::Skipped(SkipReason::NotRegular));
        }

        // 3. Snapshot
        let snapshot = AttributeSnapshot::from_metadata(&meta).map_err(|source| {
            RebalanceError::Stat {
                path: path.to_path_buf(),
                source,
            }
        })?;

        // 4. Copy
        let tmp = temp_path_for(path);
        log_replace_debug!("Copying", path = %shown, to = %tmp.display());
        let started = Instant::now();
        let bytes = copy_file(path, &tmp).map_err(|source| RebalanceError::Copy {
            path: path.to_path_buf(),
            source,
        })?;
        let elapsed = started.elapsed();

        // 5. Verify
        if let Err(e) = self.verify(path, &tmp) {
            let _ = fs::remove_file(&tmp);
            log_replace_error!("Verification failed, original untouched", path = %shown, error = %e);
            return Err(e);
        }

        // 6. Commit: remove original
        log_replace_debug!("Removing original", path = %shown);
        if let Err(e) = fs::remove_file(path) {
            let _ = fs::remove_file(&tmp);
            if e.kind() == io::ErrorKind::NotFound {
                return Ok(self.missing(path));
            }
            return Err(RebalanceError::Remove {
                path: path.to_path_buf(),
                source: e,
            });
        }

        // 7. Commit: rename
        log_replace_debug!("Renaming", from = %tmp.display(), to = %shown);
        if let Err(source) = fs::rename(&tmp, path) {
            let recovery = recovery_path_for(path);
            let saved_to = match fs::rename(&tmp, &recovery) {
                Ok(()) => recovery,
                Err(e) => {
                    log_replace_error!(
                        "Recovery rename failed, data left in temp file",
                        path = %tmp.display(),
                        error = %e,
                        critical = true
                    );
                    tmp
                }
            };
            return Err(RebalanceError::RenameFailed {
                path: path.to_path_buf(),
                saved_to,
                source,
            });
        }

        // 8. Metadata
        self.restore_metadata(path, &snapshot)?;

        // 9. Ledger
        if limit > 0 {
            self.ledger
                .set(path, old_count + 1)
                .map_err(|source| RebalanceError::LedgerWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        // 10. Report
        self.report_success(&shown, bytes, elapsed);

        Ok(Disposition::Rebalanced { bytes, elapsed })
    }

    /// Vanished file: not an error. Optionally stops the run.
    fn missing(&self, path: &Path) -> Disposition {
        log_replace_warn!("File no longer on disk", path = %self.config.display_path(path));
        if self.config.halt_on_missing && self.shutdown.initiate() {
            log_replace_warn!("Initiating shutdown due to missing file (halt-on-missing)");
        }
        Disposition::Skipped(SkipReason::Missing)
    }

    /// Size check first, then a full digest of both files.
    fn verify(&self, path: &Path, tmp: &Path) -> Result<(), RebalanceError> {
        let size_of = |p: &Path| {
            fs::metadata(p)
                .map(|m| m.len())
                .map_err(|source| RebalanceError::Verify {
                    path: path.to_path_buf(),
                    source: ChecksumError::Io {
                        path: p.to_path_buf(),
                        source,
                    },
                })
        };

        let original_size = size_of(path)?;
        let copy_size = size_of(tmp)?;
        if original_size != copy_size {
            return Err(RebalanceError::ChecksumMismatch {
                path: path.to_path_buf(),
                algorithm: self.digester.name().to_string(),
                reason: format!("size mismatch: {} != {} bytes", original_size, copy_size),
            });
        }

        match compare_files(path, tmp, self.digester.as_ref()) {
            Ok(_) => Ok(()),
            Err(ChecksumError::Mismatch {
                algorithm,
                original,
                copy,
            }) => Err(RebalanceError::ChecksumMismatch {
                path: path.to_path_buf(),
                algorithm,
                reason: format!("{} != {}", original, copy),
            }),
            Err(source) => Err(RebalanceError::Verify {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Put back what the rename lost: owner, mode, times.
    fn restore_metadata(&self, path: &Path, want: &AttributeSnapshot) -> Result<(), RebalanceError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RebalanceError::VanishedAfterRename {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(RebalanceError::Stat {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let have = AttributeSnapshot::from_metadata(&meta).map_err(|source| RebalanceError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        // Owner first: chown clears setuid/setgid.
        if let (Some(owner), Some(current)) = (want.ownership, have.ownership) {
            if owner != current {
                if let Err(e) = inspector().set_ownership(path, owner) {
                    log_replace_warn!(
                        "Could not restore ownership",
                        path = %path.display(),
                        uid = owner.uid,
                        gid = owner.gid,
                        error = %e
                    );
                }
            }
        }

        if have.mode() != want.mode() {
            log_replace_debug!(
                "Permission mismatch",
                path = %path.display(),
                original = format_args!("{:o}", want.mode()),
                new = format_args!("{:o}", have.mode())
            );
            fs::set_permissions(path, want.permissions.clone()).map_err(|source| {
                RebalanceError::RestorePermissions {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }

        if have.modified != want.modified {
            let mtime = FileTime::from_system_time(want.modified);
            let atime = want.accessed.map(FileTime::from_system_time).unwrap_or(mtime);
            filetime::set_file_times(path, atime, mtime).map_err(|source| {
                RebalanceError::RestoreTimestamps {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            log_replace_debug!("Fixed timestamps", path = %path.display());
        }

        match AttributeSnapshot::capture(path) {
            Ok(after) => {
                let drift = want.diff(&after);
                if !drift.is_empty() {
                    let drift: Vec<String> = drift.iter().map(|m| m.to_string()).collect();
                    log_replace_warn!(
                        "Attributes differ after rebalance",
                        path = %path.display(),
                        drift = %drift.join(", ")
                    );
                }
            }
            Err(e) => {
                log_replace_warn!("Attribute audit failed", path = %path.display(), error = %e);
            }
        }

        Ok(())
    }

    fn report_success(&self, shown: &str, bytes: u64, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let speed_mbps = if secs > 0.0 { bytes as f64 / MIB / secs } else { 0.0 };
        let speed_mbps = (speed_mbps * 100.0).round() / 100.0;

        let threshold = self.config.size_threshold_bytes();
        if threshold == 0 || bytes >= threshold {
            log_replace_info!("Successfully rebalanced", path = %shown, speed_mbps = speed_mbps, bytes = bytes);
        } else {
            log_replace_debug!("Successfully rebalanced", path = %shown, speed_mbps = speed_mbps, bytes = bytes);
        }
    }
}
