//! End-to-end runs of the restripe binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run restripe isolated from the caller's config files and log settings.
fn restripe(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_restripe"))
        .args(args)
        .current_dir(cwd)
        .env("HOME", cwd)
        .env_remove("RESTRIPE_LOG")
        .env_remove("RUST_LOG")
        .env_remove("RESTRIPE_PASSES")
        .env_remove("RESTRIPE_CONCURRENCY")
        .env_remove("RESTRIPE_CHECKSUM")
        .output()
        .expect("failed to execute restripe")
}

#[test]
fn test_config_path() {
    let temp = TempDir::new().unwrap();
    let output = restripe(temp.path(), &["config", "path"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Global:"));
    assert!(stdout.contains("Project:"));
}

#[test]
fn test_config_show_defaults() {
    let temp = TempDir::new().unwrap();
    let output = restripe(temp.path(), &["config", "show", "--defaults"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[rebalance]"));
    assert!(stdout.contains("[runtime]"));
    assert!(stdout.contains("checksum = \"sha256\""));
}

#[test]
fn test_config_show_reads_project_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(".restripe")).unwrap();
    fs::write(
        temp.path().join(".restripe/config.toml"),
        "[rebalance]\npasses = 5\n",
    )
    .unwrap();

    let output = restripe(temp.path(), &["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("passes = 5"));
}

#[test]
fn test_rebalance_directory() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    fs::create_dir_all(data.join("nested")).unwrap();
    fs::write(data.join("a.bin"), vec![7u8; 200_000]).unwrap();
    fs::write(data.join("nested/b.txt"), b"hello").unwrap();
    fs::write(data.join("stale.balance"), b"junk").unwrap();
    let ledger = temp.path().join("ledger");

    let output = restripe(
        temp.path(),
        &[
            data.to_str().unwrap(),
            "--passes",
            "1",
            "-j",
            "2",
            "--ledger-dir",
            ledger.to_str().unwrap(),
            "--checksum",
            "blake3",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Done:"));
    assert!(stdout.contains("2 rebalanced"));
    assert_eq!(fs::read(data.join("a.bin")).unwrap(), vec![7u8; 200_000]);
    assert_eq!(fs::read(data.join("nested/b.txt")).unwrap(), b"hello");
    assert!(!data.join("stale.balance").exists());
    assert!(ledger.exists());
}

#[test]
fn test_missing_root_fails() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");
    let output = restripe(temp.path(), &[missing.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_bad_checksum_fails() {
    let temp = TempDir::new().unwrap();
    let output = restripe(
        temp.path(),
        &[temp.path().to_str().unwrap(), "--checksum", "crc32"],
    );
    assert!(!output.status.success());
}
