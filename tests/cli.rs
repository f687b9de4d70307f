use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use runloop::cache::{CacheOptions, HostCache, default_filename};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn runloop(data_dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("runloop").into();
    cmd.env("RUN_LOOP_DATA_DIR", data_dir);
    cmd.env_remove("RUST_LOG");
    cmd.timeout(Duration::from_secs(30));
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_cache_path_uses_default_filename() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");

    let expected = data_dir.join("host-cache").join(default_filename());
    runloop(&data_dir)
        .args(["cache", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().into_owned()));
    assert!(data_dir.join("host-cache").is_dir());
}

#[test]
fn test_cache_show_empty() {
    let dir = TempDir::new().unwrap();
    let output = runloop(dir.path())
        .args(["cache", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({}));
}

#[test]
fn test_cache_show_then_clear() {
    let dir = TempDir::new().unwrap();
    let cache = HostCache::new(dir.path().join("host-cache"), CacheOptions::default()).unwrap();
    cache.write(&json!({"number": 1, "word": "word"})).unwrap();

    let output = runloop(dir.path())
        .args(["cache", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({"number": 1, "word": "word"}));

    runloop(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache cleared"));
    assert!(!cache.path().exists());

    // Clearing again is still a success
    runloop(dir.path()).args(["cache", "clear"]).assert().success();
}

#[test]
fn test_cache_show_corrupt_file_fails() {
    let dir = TempDir::new().unwrap();
    let cache = HostCache::new(dir.path().join("host-cache"), CacheOptions::default()).unwrap();
    std::fs::write(cache.path(), "{not json").unwrap();

    runloop(dir.path())
        .args(["cache", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}

#[test]
fn test_cache_directory_is_file_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("host-cache"), "oops").unwrap();

    runloop(dir.path())
        .args(["cache", "path"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_devices_unknown_format_fails() {
    let dir = TempDir::new().unwrap();
    runloop(dir.path())
        .args(["devices", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no device listing format"));
}

#[test]
fn test_devices_ancient_toolchain_fails() {
    let dir = TempDir::new().unwrap();
    runloop(dir.path())
        .args(["devices", "--toolchain", "4.6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no device listing format"));
}

#[test]
fn test_kill_invalid_signal_fails() {
    let dir = TempDir::new().unwrap();
    runloop(dir.path())
        .args(["kill", "--signal", "HUP"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid signal"));
}

#[cfg(unix)]
#[test]
fn test_pids_json_is_array() {
    let dir = TempDir::new().unwrap();
    let output = runloop(dir.path()).args(["pids", "--json"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout_json(&output).is_array());
}

#[cfg(unix)]
#[test]
fn test_running_json() {
    let dir = TempDir::new().unwrap();
    let output = runloop(dir.path())
        .args(["running", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout_json(&output)["running"].is_boolean());
}

#[test]
fn test_unknown_setting_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "bogus = 1\n").unwrap();

    runloop(dir.path())
        .args(["cache", "path"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown setting `bogus`"));
}

#[cfg(unix)]
#[test]
fn test_launch_uses_configured_launcher() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "launcher = \"echo\"\n").unwrap();
    let log = dir.path().join("logs").join("instruments.log");

    let output = runloop(dir.path())
        .args(["launch", "-w", "UDID", "-t", "Automation", "-e", "A=B", "app.bundle", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout_json(&output)["pid"].as_u64().unwrap() > 0);

    let mut contents = String::new();
    for _ in 0..100 {
        contents = std::fs::read_to_string(&log).unwrap_or_default();
        if !contents.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(
        contents.trim(),
        "instruments -w UDID -t Automation app.bundle -e A B"
    );
}

#[test]
fn test_no_subcommand_prints_help() {
    let dir = TempDir::new().unwrap();
    runloop(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}
