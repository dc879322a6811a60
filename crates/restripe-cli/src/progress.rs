//! Periodic progress lines on stdout.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use console::style;
use crossbeam_channel::{select, tick, Sender};
use restripe_config::log_cli_warn;
use restripe_engine::{PassInfo, ProgressSink};

#[derive(Debug, Clone, Copy)]
struct PassState {
    info: PassInfo,
    processed: usize,
    total_files: usize,
}

/// Shared view of the running pass. Workers publish into it, the reporter
/// thread reads it.
#[derive(Clone)]
pub struct PassProgress {
    state: Arc<Mutex<PassState>>,
}

impl PassProgress {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PassState {
                info: PassInfo {
                    current: 1,
                    total: None,
                },
                processed: 0,
                total_files: 0,
            })),
        }
    }

    /// Reset counters for a new pass over `total_files` files.
    pub fn begin_pass(&self, info: PassInfo, total_files: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.info = info;
        state.processed = 0;
        state.total_files = total_files;
    }

    fn snapshot(&self) -> PassState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current progress line, without the timestamp.
    pub fn line(&self) -> String {
        format_line(&self.snapshot())
    }
}

impl ProgressSink for PassProgress {
    fn publish(&self, processed: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.processed = processed;
    }
}

fn format_line(state: &PassState) -> String {
    let fraction = if state.total_files == 0 {
        1.0
    } else {
        state.processed as f64 / state.total_files as f64
    };

    let mut line = format!(
        "{}: {}/{} files ({:.1}% of pass",
        state.info,
        state.processed,
        state.total_files,
        fraction * 100.0
    );
    if let Some(overall) = state.info.overall_percent(fraction) {
        line.push_str(&format!(", {:.1}% overall", overall));
    }
    line.push(')');
    line
}

fn print_line(progress: &PassProgress) {
    let now = chrono::Local::now().format("%H:%M:%S");
    println!("{} {}", style(now).dim(), style(progress.line()).cyan());
}

/// Background thread printing a progress line every `interval`.
pub struct Reporter {
    progress: PassProgress,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reporter {
    pub fn spawn(progress: PassProgress, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let shared = progress.clone();
        let handle = thread::Builder::new()
            .name("restripe-progress".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => print_line(&shared),
                        recv(stopped) -> _ => break,
                    }
                }
            })?;

        Ok(Self {
            progress,
            stop,
            handle,
        })
    }

    /// Stop the thread and print one last line.
    pub fn finish(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            log_cli_warn!("Progress reporter panicked");
        }
        print_line(&self.progress);
    }
}
