//! Scheduler / Coordinator
//!
//! One run = cleanup → enumerate → shuffle → fan out → join → aggregate.
//!
//! ```text
//!   feeder (caller thread) ──► bounded(len) ──► restripe-worker-0 ─┐
//!                                        ├────► restripe-worker-1 ─┼─► RunSummary
//!                                        └────► restripe-worker-N ─┘
//! ```
//!
//! All files are attempted even when some fail; failures are folded into
//! [`RunError::SomeFilesFailed`] at the end.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use rand::seq::SliceRandom;
use restripe_config::{log_sched_debug, log_sched_error, log_sched_info, log_sched_warn};
use restripe_config::RunConfig;
use restripe_fs::{find_temp_artifacts, gather_regular_files, Digester};
use restripe_ledger::PassLedger;

use crate::error::RunError;
use crate::outcome::{PassInfo, RunSummary};
use crate::progress::ProgressSink;
use crate::replacer::FileReplacer;
use crate::shutdown::ShutdownSignal;

pub struct Coordinator {
    config: Arc<RunConfig>,
    ledger: Arc<dyn PassLedger>,
    shutdown: ShutdownSignal,
    replacer: FileReplacer,
}

impl Coordinator {
    pub fn new(config: RunConfig, ledger: Arc<dyn PassLedger>) -> Self {
        Self::with_shutdown(config, ledger, ShutdownSignal::new())
    }

    /// Share an existing shutdown signal (e.g. one wired to process signals).
    pub fn with_shutdown(config: RunConfig, ledger: Arc<dyn PassLedger>, shutdown: ShutdownSignal) -> Self {
        let config = Arc::new(config);
        let replacer = FileReplacer::new(Arc::clone(&config), Arc::clone(&ledger), shutdown.clone());
        Self {
            config,
            ledger,
            shutdown,
            replacer,
        }
    }

    /// Verify copies with `digester` instead of the configured algorithm.
    pub fn with_digester(mut self, digester: Arc<dyn Digester>) -> Self {
        self.replacer = self.replacer.with_digester(digester);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn replacer(&self) -> &FileReplacer {
        &self.replacer
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Stop dispatching new files. Returns `true` for the call that triggered it.
    pub fn initiate_shutdown(&self) -> bool {
        let first = self.shutdown.initiate();
        if first {
            log_sched_info!("Initiating graceful shutdown, waiting for in-progress files to complete");
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Regular files under the root, in enumeration order.
    pub fn files(&self) -> Result<Vec<PathBuf>, RunError> {
        log_sched_debug!("Scanning directory", root = %self.config.root.display());
        gather_regular_files(&self.config.root).map_err(|source| RunError::GatherFiles {
            root: self.config.root.clone(),
            source,
        })
    }

    /// Estimate of the pass about to run over `files`, from the first file's
    /// ledger count.
    pub fn pass_info(&self, files: &[PathBuf]) -> PassInfo {
        let total = (self.config.passes_limit > 0).then_some(self.config.passes_limit);

        let current = files
            .first()
            .and_then(|first| self.ledger.get(first).ok())
            .map(|count| count.saturating_add(1))
            .unwrap_or(1);

        let current = match total {
            Some(total) => current.min(total),
            None => current,
        };
        PassInfo { current, total }
    }

    /// Stale-artifact cleanup (if enabled) followed by enumeration: the file
    /// list one pass works on.
    pub fn prepare_pass(&self) -> Result<Vec<PathBuf>, RunError> {
        if self.config.cleanup_balance_files {
            self.cleanup_temp_artifacts();
        }
        self.files()
    }

    /// Delete every `.balance` file under the root. Failures are logged.
    ///
    /// Returns the number of files removed.
    pub fn cleanup_temp_artifacts(&self) -> usize {
        let stale = match find_temp_artifacts(&self.config.root) {
            Ok(stale) => stale,
            Err(e) => {
                log_sched_warn!("Cannot scan for .balance files", error = %e);
                return 0;
            }
        };

        log_sched_info!("Found .balance files to clean up", count = stale.len());
        let mut removed = 0;
        for path in stale {
            log_sched_debug!("Removing stale balance file", path = %self.config.display_path(&path));
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    log_sched_warn!("Failed to remove stale file", path = %path.display(), error = %e)
                }
            }
        }
        removed
    }

    /// One pass over every regular file under the root.
    pub fn run(&self, progress: Option<&dyn ProgressSink>) -> Result<RunSummary, RunError> {
        let files = self.prepare_pass()?;
        self.run_files(files, progress)
    }

    /// One pass over `files`, as returned by [`prepare_pass`](Self::prepare_pass).
    pub fn run_files(
        &self,
        mut files: Vec<PathBuf>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<RunSummary, RunError> {
        log_sched_info!("File count", count = files.len());

        if files.is_empty() {
            log_sched_info!("No files to process");
            return Ok(RunSummary::default());
        }

        if self.config.random_order {
            log_sched_debug!("Randomizing file processing order");
            files.shuffle(&mut rand::thread_rng());
        }

        let processed = Mutex::new(0usize);
        let (mut summary, panicked) = self.dispatch(files, &processed, progress)?;

        if self.is_shutting_down() {
            log_sched_info!("Performing final cleanup of .balance files during shutdown");
            self.cleanup_temp_artifacts();
        }

        if panicked > 0 {
            log_sched_error!("Worker threads panicked", count = panicked);
            summary.failed += panicked;
        }

        if let Some(sink) = progress {
            let count = *processed.lock().unwrap_or_else(|e| e.into_inner());
            sink.publish(count);
        }

        if summary.has_failures() {
            return Err(RunError::SomeFilesFailed { summary });
        }

        log_sched_info!("All files processed successfully", summary = %summary);
        Ok(summary)
    }

    /// Feed `files` to the worker pool and join it.
    ///
    /// Returns the merged per-worker summaries and the number of workers that
    /// panicked.
    fn dispatch(
        &self,
        files: Vec<PathBuf>,
        processed: &Mutex<usize>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<(RunSummary, usize), RunError> {
        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(files.len());

        thread::scope(|s| {
            let mut workers = Vec::with_capacity(self.config.concurrency);
            let mut spawn_error = None;

            for id in 0..self.config.concurrency {
                let rx = rx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("restripe-worker-{}", id))
                    .spawn_scoped(s, move || self.worker(id, rx, processed, progress));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        log_sched_error!("Failed to spawn worker", worker = id, error = %e);
                        spawn_error = Some(e);
                    }
                }
            }
            drop(rx);

            if workers.is_empty() {
                let e = spawn_error
                    .unwrap_or_else(|| std::io::Error::other("concurrency is zero"));
                return Err(RunError::WorkerSpawn(e));
            }
            log_sched_info!("Started workers", count = workers.len());

            for path in files {
                if self.is_shutting_down() {
                    log_sched_info!("Shutdown requested, no longer queueing files");
                    break;
                }
                if tx.send(path).is_err() {
                    break;
                }
            }
            drop(tx);

            let mut summary = RunSummary::default();
            let mut panicked = 0;
            for handle in workers {
                match handle.join() {
                    Ok(worker_summary) => summary.absorb(&worker_summary),
                    Err(_) => panicked += 1,
                }
            }
            Ok((summary, panicked))
        })
    }

    fn worker(
        &self,
        id: usize,
        rx: Receiver<PathBuf>,
        processed: &Mutex<usize>,
        progress: Option<&dyn ProgressSink>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        loop {
            if self.is_shutting_down() {
                log_sched_debug!("Worker stopping for shutdown", worker = id);
                break;
            }
            let Ok(path) = rx.recv() else { break };

            log_sched_debug!("Processing file", worker = id, path = %self.config.display_path(&path));
            let outcome = self.replacer.rebalance(&path);

            if let Err(e) = &outcome {
                let shown = self.config.display_path(&path);
                if e.is_critical() {
                    log_sched_error!("Failed to rebalance", path = %shown, error = %e, critical = true);
                } else if e.content_intact() {
                    log_sched_warn!("Rebalanced with stale metadata or pass count", path = %shown, error = %e);
                } else {
                    log_sched_error!("Failed to rebalance", path = %shown, error = %e);
                }
            }
            summary.record(&outcome);

            let mut count = processed.lock().unwrap_or_else(|e| e.into_inner());
            *count += 1;
            if let Some(sink) = progress {
                sink.publish(*count);
            }
        }

        summary
    }
}
