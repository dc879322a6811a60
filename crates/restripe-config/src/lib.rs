//! # restripe-config
//!
//! Configuration management for restripe.
//!
//! [`Settings`] are loaded from:
//! 1. `~/.restripe/config.toml` (global)
//! 2. `.restripe/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary, after which
//! [`RunConfig::from_settings`] validates everything into the immutable
//! snapshot the engine runs with.

pub mod logging;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use restripe_fs::{ChecksumAlgorithm, ChecksumError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Upper bound on worker threads.
pub const MAX_CONCURRENCY: usize = 128;

/// Floor for automatic concurrency.
pub const MIN_AUTO_CONCURRENCY: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("TOML render error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{0}")]
    Checksum(#[from] ChecksumError),

    #[error("path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("cannot read directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Settings (file + env layer)
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rebalance: RebalanceSettings,
    pub ledger: LedgerSettings,
    pub runtime: RuntimeSettings,
}

impl Settings {
    /// Load settings from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut settings = Self::load_from(global.as_deref(), Path::new(".restripe/config.toml"))?;
        settings.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    /// Load from explicit file locations, without environment overrides.
    ///
    /// Missing files are skipped. Keys set in `project` replace the same keys
    /// from `global`; everything else falls through.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in global.into_iter().chain(std::iter::once(project)) {
            if !path.exists() {
                continue;
            }
            debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)?;
            let table: toml::Table = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            merge_tables(&mut merged, table);
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|source| ConfigError::Toml {
                path: project.to_path_buf(),
                source,
            })
    }

    /// Global config path: ~/.restripe/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".restripe/config.toml"))
    }

    /// Apply `RESTRIPE_*` overrides read through `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("RESTRIPE_CONCURRENCY") {
            self.rebalance.concurrency = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "RESTRIPE_CONCURRENCY",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("RESTRIPE_PASSES") {
            self.rebalance.passes = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "RESTRIPE_PASSES",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("RESTRIPE_CHECKSUM") {
            self.rebalance.checksum = v;
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Settings::default())?)
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// `[rebalance]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceSettings {
    /// Times a file may be rewritten; 0 = unlimited
    pub passes: u32,
    /// Worker threads; 0 = auto (half the CPUs, minimum 2)
    pub concurrency: usize,
    /// sha256, md5 or blake3
    pub checksum: String,
    pub process_hardlinks: bool,
    pub random_order: bool,
    /// Remove stale `.balance` files before (and after an interrupted) run
    pub cleanup_balance: bool,
    pub halt_on_missing: bool,
    /// Successes below this size (MiB) are logged at debug; 0 = log all
    pub size_threshold_mb: u64,
    pub filename_only: bool,
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            passes: 1,
            concurrency: 0,
            checksum: ChecksumAlgorithm::default().to_string(),
            process_hardlinks: false,
            random_order: true,
            cleanup_balance: true,
            halt_on_missing: false,
            size_threshold_mb: 0,
            filename_only: false,
        }
    }
}

/// `[ledger]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Persistent ledger directory; unset = fresh temp dir per invocation
    pub dir: Option<PathBuf>,
    /// Keep the temp ledger directory at exit
    pub keep: bool,
}

/// `[runtime]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Seconds between the shutdown request and a forced exit
    pub shutdown_grace_secs: u64,
    /// Seconds between progress lines
    pub progress_interval_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 90,
            progress_interval_secs: 60,
        }
    }
}

// ============================================================================
// RunConfig (validated snapshot)
// ============================================================================

/// Immutable configuration for one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Canonical, absolute root directory
    pub root: PathBuf,
    pub concurrency: usize,
    /// 0 = unlimited
    pub passes_limit: u32,
    pub skip_hardlinks: bool,
    pub random_order: bool,
    pub checksum: ChecksumAlgorithm,
    pub size_threshold_mb: u64,
    pub halt_on_missing: bool,
    pub show_full_paths: bool,
    pub cleanup_balance_files: bool,
}

impl RunConfig {
    /// Validate `settings` against `root`.
    pub fn from_settings(root: &Path, settings: &Settings) -> Result<Self, ConfigError> {
        let root = validate_root(root)?;
        let r = &settings.rebalance;

        Ok(Self {
            root,
            concurrency: resolve_concurrency(r.concurrency),
            passes_limit: r.passes,
            skip_hardlinks: !r.process_hardlinks,
            random_order: r.random_order,
            checksum: ChecksumAlgorithm::from_str(&r.checksum)?,
            size_threshold_mb: r.size_threshold_mb,
            halt_on_missing: r.halt_on_missing,
            show_full_paths: !r.filename_only,
            cleanup_balance_files: r.cleanup_balance,
        })
    }

    /// Defaults for `root`.
    pub fn new(root: &Path) -> Result<Self, ConfigError> {
        Self::from_settings(root, &Settings::default())
    }

    /// `path` as it should appear in logs.
    pub fn display_path<'a>(&self, path: &'a Path) -> Cow<'a, str> {
        if self.show_full_paths {
            return path.to_string_lossy();
        }
        match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => path.to_string_lossy(),
        }
    }

    /// Successes of at least this many bytes are logged at info.
    pub fn size_threshold_bytes(&self) -> u64 {
        self.size_threshold_mb.saturating_mul(1024 * 1024)
    }
}

/// 0 → half the CPUs (minimum 2); otherwise clamp to `1..=MAX_CONCURRENCY`.
pub fn resolve_concurrency(requested: usize) -> usize {
    if requested == 0 {
        return (num_cpus::get() / 2).max(MIN_AUTO_CONCURRENCY);
    }
    if requested > MAX_CONCURRENCY {
        warn!(
            "Concurrency {} exceeds maximum, clamping to {}",
            requested, MAX_CONCURRENCY
        );
        return MAX_CONCURRENCY;
    }
    requested
}

fn validate_root(root: &Path) -> Result<PathBuf, ConfigError> {
    let canonical = match root.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::RootNotFound(root.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::RootUnreadable {
                path: root.to_path_buf(),
                source: e,
            })
        }
    };

    if !canonical.is_dir() {
        return Err(ConfigError::RootNotDirectory(canonical));
    }

    std::fs::read_dir(&canonical).map_err(|source| ConfigError::RootUnreadable {
        path: canonical.clone(),
        source,
    })?;

    Ok(canonical)
}
