//! Structured logging utilities for restripe components.
//!
//! Every engine event carries a `component` field so one subsystem can be
//! filtered out of a busy log.
//!
//! # Usage
//!
//! ```ignore
//! use restripe_config::{log_replace_info, log_sched_warn};
//!
//! log_replace_info!("Rebalanced", path = %path.display(), speed_mbps = 112.4);
//! log_sched_warn!("Shutdown requested");
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const REPLACE: &'static str = "REPLACE";
    pub const SCHED: &'static str = "SCHED";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === REPLACE logging macros ===

#[macro_export]
macro_rules! log_replace_error {
    ($msg:literal $(,)?) => {
        tracing::error!(component = $crate::logging::Component::REPLACE, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::error!(component = $crate::logging::Component::REPLACE, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_replace_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::REPLACE, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = $crate::logging::Component::REPLACE, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_replace_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = $crate::logging::Component::REPLACE, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = $crate::logging::Component::REPLACE, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_replace_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::REPLACE, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = $crate::logging::Component::REPLACE, $($field)+, $msg)
    };
}

// === SCHED logging macros ===

#[macro_export]
macro_rules! log_sched_error {
    ($msg:literal $(,)?) => {
        tracing::error!(component = $crate::logging::Component::SCHED, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::error!(component = $crate::logging::Component::SCHED, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_sched_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::SCHED, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = $crate::logging::Component::SCHED, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_sched_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = $crate::logging::Component::SCHED, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = $crate::logging::Component::SCHED, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_sched_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::SCHED, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = $crate::logging::Component::SCHED, $($field)+, $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = $crate::logging::Component::CLI, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = $crate::logging::Component::CLI, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_cli_error {
    ($msg:literal $(,)?) => {
        tracing::error!(component = $crate::logging::Component::CLI, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::error!(component = $crate::logging::Component::CLI, $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_cli_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CLI, $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = $crate::logging::Component::CLI, $($field)+, $msg)
    };
}

/// Filter directive for the subscriber.
///
/// `RESTRIPE_LOG` wins over `RUST_LOG`; with neither set, `level` applies.
pub fn filter_directive(level: LogLevel, lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("RESTRIPE_LOG")
        .or_else(|| lookup("RUST_LOG"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| level.as_filter().to_string())
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; later calls are ignored.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let directive = filter_directive(level, |var| std::env::var(var).ok());
    let env_filter =
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::REPLACE, "REPLACE");
        assert_eq!(Component::SCHED, "SCHED");
    }

    #[test]
    fn test_filter_precedence() {
        let none = |_: &str| None;
        assert_eq!(filter_directive(LogLevel::Info, none), "info");
        assert_eq!(filter_directive(LogLevel::Debug, none), "debug");

        let rust_only = |k: &str| (k == "RUST_LOG").then(|| "warn".to_string());
        assert_eq!(filter_directive(LogLevel::Info, rust_only), "warn");

        let both = |k: &str| match k {
            "RESTRIPE_LOG" => Some("restripe=trace".to_string()),
            "RUST_LOG" => Some("warn".to_string()),
            _ => None,
        };
        assert_eq!(filter_directive(LogLevel::Info, both), "restripe=trace");
    }

    #[test]
    fn test_macros_expand() {
        let path = std::path::Path::new("/tmp/x");
        crate::log_replace_debug!("plain");
        crate::log_replace_info!("with fields", path = %path.display(), bytes = 4u64);
        crate::log_sched_warn!("sched", workers = 2);
        init_logging(LogLevel::Warn);
        init_logging(LogLevel::Warn);
    }
}
