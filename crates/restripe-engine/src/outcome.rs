use std::fmt;
use std::time::Duration;

use crate::error::RebalanceError;

/// Why a file was left alone. Skips are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Our own `.balance` artifact
    TempArtifact,
    /// More than one directory entry points at the inode
    Hardlinked,
    /// Ledger count already at the pass limit
    PassLimitReached,
    /// Vanished between enumeration and processing
    Missing,
    /// Directory, symlink, device, fifo, socket
    NotRegular,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TempArtifact => "temp artifact",
            SkipReason::Hardlinked => "hardlinked",
            SkipReason::PassLimitReached => "pass limit reached",
            SkipReason::Missing => "missing",
            SkipReason::NotRegular => "not a regular file",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful result of one replace operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Rebalanced { bytes: u64, elapsed: Duration },
    Skipped(SkipReason),
}

impl Disposition {
    pub fn is_rebalanced(&self) -> bool {
        matches!(self, Disposition::Rebalanced { .. })
    }
}

/// Counts for one run (or several, after [`RunSummary::absorb`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub rebalanced: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `failed`
    pub critical: usize,
    pub bytes: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Result<Disposition, RebalanceError>) {
        self.processed += 1;
        match outcome {
            Ok(Disposition::Rebalanced { bytes, .. }) => {
                self.rebalanced += 1;
                self.bytes += bytes;
            }
            Ok(Disposition::Skipped(_)) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                if e.is_critical() {
                    self.critical += 1;
                }
            }
        }
    }

    pub fn absorb(&mut self, other: &RunSummary) {
        self.processed += other.processed;
        self.rebalanced += other.rebalanced;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.critical += other.critical;
        self.bytes += other.bytes;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Nothing was rewritten and nothing failed.
    pub fn is_idle(&self) -> bool {
        self.rebalanced == 0 && self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} rebalanced, {} skipped, {} failed",
            self.processed, self.rebalanced, self.skipped, self.failed
        )?;
        if self.critical > 0 {
            write!(f, " ({} critical)", self.critical)?;
        }
        Ok(())
    }
}

/// Which pass is running. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfo {
    pub current: u32,
    /// `None` when passes are unlimited
    pub total: Option<u32>,
}

impl PassInfo {
    /// Share of all passes already behind us, given progress in this one.
    pub fn overall_percent(&self, pass_fraction: f64) -> Option<f64> {
        let total = self.total.filter(|t| *t > 0)? as f64;
        let done = self.current.saturating_sub(1) as f64 + pass_fraction.clamp(0.0, 1.0);
        Some((done / total * 100.0).min(100.0))
    }
}

impl fmt::Display for PassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "Pass {} of {}", self.current, total),
            None => write!(f, "Pass {}", self.current),
        }
    }
}
