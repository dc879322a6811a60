//! # restripe CLI
//!
//! Rewrites every regular file under a directory in place so the filesystem
//! lays its blocks out again across the current set of devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use restripe_config::logging::{init_logging, LogLevel};
use restripe_config::{log_cli_error, log_cli_info, log_cli_warn, RunConfig, Settings};
use restripe_engine::{run_passes, Coordinator, PassLedger, RunSummary, ShutdownSignal};
use restripe_ledger::LmdbLedger;

mod progress;

use progress::{PassProgress, Reporter};

/// Rebalance files across storage devices by rewriting them in place
#[derive(Parser, Debug)]
#[command(name = "restripe")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Directory to rebalance
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Rewrite files with more than one hard link
    #[arg(long)]
    process_hardlinks: bool,

    /// Times each file may be rewritten (0 = unlimited)
    #[arg(long, value_name = "N")]
    passes: Option<u32>,

    /// Number of worker threads (0 = half the CPUs)
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Leave stale .balance files alone
    #[arg(long)]
    no_cleanup_balance: bool,

    /// Process files in path order instead of shuffling
    #[arg(long)]
    no_random: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Only log files at least this large (MiB) at info level
    #[arg(long, value_name = "MIB")]
    size_threshold: Option<u64>,

    /// Verification digest: md5, sha256 or blake3
    #[arg(long, value_name = "TYPE")]
    checksum: Option<String>,

    /// Stop the run when a file vanishes mid-flight
    #[arg(long)]
    halt_on_missing: bool,

    /// Log file names only, not full paths
    #[arg(long)]
    filename_only: bool,

    /// Keep the pass ledger in this directory (resumable across runs)
    #[arg(long, value_name = "DIR")]
    ledger_dir: Option<PathBuf>,

    /// Do not delete a temporary ledger on exit
    #[arg(long)]
    keep_ledger: bool,

    /// Seconds to wait for in-flight files after a signal before forcing exit
    #[arg(long, value_name = "SECS")]
    grace_period: Option<u64>,

    /// Seconds between progress lines
    #[arg(long, value_name = "SECS")]
    progress_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show {
        /// Print built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
    /// Print configuration file locations
    Path,
}

impl Cli {
    /// Fold command-line flags over file and env settings.
    fn apply_to(&self, settings: &mut Settings) {
        let rebalance = &mut settings.rebalance;
        if self.process_hardlinks {
            rebalance.process_hardlinks = true;
        }
        if let Some(passes) = self.passes {
            rebalance.passes = passes;
        }
        if let Some(concurrency) = self.concurrency {
            rebalance.concurrency = concurrency;
        }
        if self.no_cleanup_balance {
            rebalance.cleanup_balance = false;
        }
        if self.no_random {
            rebalance.random_order = false;
        }
        if let Some(mb) = self.size_threshold {
            rebalance.size_threshold_mb = mb;
        }
        if let Some(checksum) = &self.checksum {
            rebalance.checksum = checksum.clone();
        }
        if self.halt_on_missing {
            rebalance.halt_on_missing = true;
        }
        if self.filename_only {
            rebalance.filename_only = true;
        }
        if let Some(dir) = &self.ledger_dir {
            settings.ledger.dir = Some(dir.clone());
        }
        if self.keep_ledger {
            settings.ledger.keep = true;
        }
        if let Some(secs) = self.grace_period {
            settings.runtime.shutdown_grace_secs = secs;
        }
        if let Some(secs) = self.progress_interval {
            settings.runtime.progress_interval_secs = secs;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    if let Some(Commands::Config { command }) = &cli.command {
        return cmd_config(command);
    }

    let Some(root) = cli.path.clone() else {
        bail!("missing <PATH> to rebalance (see --help)");
    };

    let mut settings = Settings::load().context("failed to load configuration")?;
    cli.apply_to(&mut settings);
    let config = RunConfig::from_settings(&root, &settings)?;

    print_banner(&config, &settings);

    let ledger = match &settings.ledger.dir {
        Some(dir) => LmdbLedger::open(dir)
            .with_context(|| format!("failed to open pass ledger at {}", dir.display()))?,
        None => LmdbLedger::create_temp().context("failed to create pass ledger")?,
    };
    if let Some(dir) = ledger.location() {
        log_cli_info!("Pass ledger ready", path = %dir.display(), temporary = ledger.is_temporary());
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let outcome = rt.block_on(async_main(config, settings, Arc::new(ledger)));
    drop(rt);

    let summary = outcome?;
    println!(
        "{} {}",
        style("Done:").bold().green(),
        style(summary).bold()
    );
    Ok(())
}

async fn async_main(
    config: RunConfig,
    settings: Settings,
    ledger: Arc<LmdbLedger>,
) -> Result<RunSummary> {
    let shutdown = ShutdownSignal::new();
    let coordinator = Arc::new(Coordinator::with_shutdown(
        config,
        ledger.clone(),
        shutdown.clone(),
    ));

    let grace = Duration::from_secs(settings.runtime.shutdown_grace_secs);
    tokio::spawn(watch_signals(shutdown.clone(), grace));

    let progress = PassProgress::new();
    let interval = Duration::from_secs(settings.runtime.progress_interval_secs.max(1));
    let reporter = Reporter::spawn(progress.clone(), interval)?;

    let worker = coordinator.clone();
    let result = tokio::task::spawn_blocking(move || {
        run_passes(&worker, Some(&progress), |info, total_files| {
            progress.begin_pass(info, total_files)
        })
    })
    .await;

    reporter.finish();
    drop(coordinator);
    release_ledger(ledger, !settings.ledger.keep);

    let summary = result.context("rebalance task panicked")??;
    if shutdown.is_triggered() {
        log_cli_warn!("Stopped before every file was processed", summary = %summary);
    } else {
        log_cli_info!("All files processed successfully", summary = %summary);
    }
    Ok(summary)
}

/// Close the ledger; a temporary one is deleted when `remove` is set.
fn release_ledger(ledger: Arc<LmdbLedger>, remove: bool) {
    let ledger = match Arc::try_unwrap(ledger) {
        Ok(ledger) => ledger,
        Err(_) => {
            log_cli_warn!("Pass ledger still referenced, leaving it open");
            return;
        }
    };

    match ledger.len() {
        Ok(entries) => log_cli_info!("Closing pass ledger", entries = entries),
        Err(e) => log_cli_warn!("Cannot count pass ledger entries", error = %e),
    }

    match ledger.teardown(remove) {
        Ok(Some(dir)) => log_cli_info!("Pass ledger kept", path = %dir.display()),
        Ok(None) => {}
        Err(e) => log_cli_warn!("Failed to close pass ledger", error = %e),
    }
}

/// First SIGINT/SIGTERM asks workers to stop after their current file. If
/// they are not done within `grace`, the process exits hard.
async fn watch_signals(shutdown: ShutdownSignal, grace: Duration) {
    wait_for_signal().await;
    if shutdown.initiate() {
        log_cli_warn!(
            "Received termination signal, finishing in-flight files",
            grace_secs = grace.as_secs()
        );
    }

    tokio::time::sleep(grace).await;
    log_cli_error!("Forced exit: rebalance did not complete gracefully in time");
    std::process::exit(1);
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log_cli_warn!("Cannot listen for Ctrl-C", error = %e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log_cli_warn!("Cannot listen for SIGTERM", error = %e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_banner(config: &RunConfig, settings: &Settings) {
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let passes = match config.passes_limit {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };

    println!("{}", style("restripe").bold().cyan());
    println!("  {} {}", style("Started:").dim(), started);
    println!("  {} {}", style("Path:").dim(), config.root.display());
    println!("  {} {}", style("Passes:").dim(), passes);
    println!("  {} {}", style("Workers:").dim(), config.concurrency);
    println!("  {} {}", style("Checksum:").dim(), config.checksum);
    println!(
        "  {} {}",
        style("Hardlinks:").dim(),
        if config.skip_hardlinks { "skip" } else { "process" }
    );
    println!(
        "  {} {}",
        style("Order:").dim(),
        if config.random_order { "random" } else { "sorted" }
    );
    match &settings.ledger.dir {
        Some(dir) => println!("  {} {}", style("Ledger:").dim(), dir.display()),
        None => println!("  {} temporary", style("Ledger:").dim()),
    }
    if config.size_threshold_mb > 0 {
        println!(
            "  {} {} MiB",
            style("Log threshold:").dim(),
            config.size_threshold_mb
        );
    }
    if config.halt_on_missing {
        println!("  {} on", style("Halt on missing:").dim());
    }
}

fn cmd_config(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show { defaults: true } => {
            print!("{}", Settings::default_toml()?);
        }
        ConfigCommands::Show { defaults: false } => {
            let settings = Settings::load()?;
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        ConfigCommands::Path => {
            match Settings::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no config directory)"),
            }
            println!("Project: .restripe/config.toml");
        }
    }
    Ok(())
}
