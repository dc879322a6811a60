//! # restripe-engine
//!
//! Rewrites every regular file under a root in place so the filesystem
//! allocates fresh blocks for it, without ever changing what the file holds.
//!
//! ## Replace Protocol (one file)
//!
//! ```text
//! skip filters ──► lstat ──► snapshot attrs ──► copy to <f>.balance (fsync)
//!        │                                           │
//!        ▼                                           ▼
//!    Skipped(..)                         verify: size, then digest
//!                                                    │
//!                       remove <f> ──► rename <f>.balance → <f>
//!                                                    │ (fails: → <f>.recovered, CRITICAL)
//!                                                    ▼
//!                          restore mode/mtime/owner ──► ledger count + 1
//! ```
//!
//! Until the original is removed a failure leaves it untouched. After that,
//! the verified copy always survives under either the original name or
//! `<f>.recovered`.
//!
//! ## Scheduling
//!
//! [`Coordinator::run`] fans a (shuffled) file list out to a fixed pool of
//! named worker threads over a bounded channel. [`ShutdownSignal`] is checked
//! before each enqueue and before each pull, never mid-file. [`run_passes`]
//! repeats whole runs until every file has reached the pass limit.

pub mod coordinator;
pub mod error;
pub mod outcome;
pub mod passes;
pub mod progress;
pub mod replacer;
pub mod shutdown;

pub use coordinator::Coordinator;
pub use error::{RebalanceError, RunError, Severity};
pub use outcome::{Disposition, PassInfo, RunSummary, SkipReason};
pub use passes::run_passes;
pub use progress::ProgressSink;
pub use replacer::FileReplacer;
pub use shutdown::ShutdownSignal;

pub use restripe_config::RunConfig;
pub use restripe_ledger::{LmdbLedger, MemoryLedger, PassLedger};
