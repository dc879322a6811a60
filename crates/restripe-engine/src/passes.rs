//! Multi-pass driver.
//!
//! With a pass limit `L > 0` the driver runs up to `L` whole passes; each pass
//! rewrites only files whose ledger count is still below `L`. A pass with
//! per-file failures does not stop the next one, so a file that failed in
//! pass 1 gets another chance in pass 2. Fatal errors and shutdown do stop it.

use restripe_config::{log_sched_info, log_sched_warn};

use crate::coordinator::Coordinator;
use crate::error::RunError;
use crate::outcome::{PassInfo, RunSummary};
use crate::progress::ProgressSink;

/// Run passes until the limit is reached, nothing is left to do, or shutdown.
///
/// `on_pass` is called before each pass with the pass about to run and the
/// number of files it covers. The returned summary covers every pass; any
/// per-file failure in any pass turns it into [`RunError::SomeFilesFailed`].
pub fn run_passes(
    coordinator: &Coordinator,
    progress: Option<&dyn ProgressSink>,
    mut on_pass: impl FnMut(PassInfo, usize),
) -> Result<RunSummary, RunError> {
    let max_passes = coordinator.config().passes_limit.max(1);
    let mut total = RunSummary::default();

    for pass in 1..=max_passes {
        if coordinator.is_shutting_down() {
            break;
        }

        let files = coordinator.prepare_pass()?;
        let info = coordinator.pass_info(&files);
        log_sched_info!("Starting pass", pass = pass, info = %info);
        on_pass(info, files.len());

        let this_pass = match coordinator.run_files(files, progress) {
            Ok(summary) => summary,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let summary = e.summary().cloned().unwrap_or_default();
                log_sched_warn!(
                    "Pass finished with failures, continuing",
                    pass = pass,
                    failed = summary.failed
                );
                summary
            }
        };
        total.absorb(&this_pass);

        if this_pass.is_idle() {
            log_sched_info!("Every file has reached the pass limit", pass = pass);
            break;
        }
    }

    if total.has_failures() {
        return Err(RunError::SomeFilesFailed { summary: total });
    }
    Ok(total)
}
