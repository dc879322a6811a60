//! Progress publishing.
//!
//! Workers publish the running processed count after every file. Publishing
//! never blocks: a slow or full sink just misses intermediate values, and the
//! coordinator publishes the final count once more after joining.

use crossbeam_channel::Sender;

pub trait ProgressSink: Send + Sync {
    /// Files processed so far in the current run.
    fn publish(&self, processed: usize);
}

impl ProgressSink for Sender<usize> {
    fn publish(&self, processed: usize) {
        let _ = self.try_send(processed);
    }
}
