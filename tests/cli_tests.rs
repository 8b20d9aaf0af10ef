use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_foldersync");

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

fn log_contains(path: &Path, needle: &str) -> bool {
    fs::read_to_string(path)
        .map(|log| log.contains(needle))
        .unwrap_or(false)
}

#[test]
fn test_cli_missing_source_exits_nonzero() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("sync.log");

    let output = Command::new(BIN)
        .args([
            tmp.path().join("missing").to_str().unwrap(),
            tmp.path().join("replica").to_str().unwrap(),
            "1",
            log.to_str().unwrap(),
        ])
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run foldersync");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Source directory"), "Unexpected stderr: {}", stderr);
    assert!(!tmp.path().join("replica").exists());
}

#[test]
fn test_cli_unwritable_log_exits_nonzero() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("source")).unwrap();

    let output = Command::new(BIN)
        .args([
            tmp.path().join("source").to_str().unwrap(),
            tmp.path().join("replica").to_str().unwrap(),
            "1",
            tmp.path().join("no/such/dir/sync.log").to_str().unwrap(),
        ])
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run foldersync");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("log file"), "Unexpected stderr: {}", stderr);
}

#[test]
fn test_cli_rejects_bad_interval() {
    let tmp = TempDir::new().unwrap();
    let status = Command::new(BIN)
        .args(["src", "dst", "soon", "log.txt"])
        .current_dir(tmp.path())
        .stderr(Stdio::null())
        .status()
        .expect("Failed to run foldersync");
    assert!(!status.success());
}

#[test]
fn test_cli_mirrors_and_logs() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    let replica = tmp.path().join("replica");
    let log = tmp.path().join("sync.log");
    fs::create_dir_all(source.join("dir")).unwrap();
    fs::write(source.join("a.txt"), "hello").unwrap();
    fs::write(source.join("dir/c.txt"), "x").unwrap();

    let mut child = Command::new(BIN)
        .args([
            source.to_str().unwrap(),
            replica.to_str().unwrap(),
            "1",
            log.to_str().unwrap(),
        ])
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start foldersync");

    let synced = wait_for(Duration::from_secs(15), || {
        log_contains(&log, "Synchronization complete. Waiting for next interval...")
    });

    // Pick up a change on a later cycle
    fs::write(source.join("a.txt"), "changed").unwrap();
    let updated = wait_for(Duration::from_secs(15), || log_contains(&log, "File updated: "));

    child.kill().ok();
    child.wait().ok();

    assert!(synced, "first cycle never completed");
    assert!(updated, "change was never mirrored");
    assert_eq!(fs::read_to_string(replica.join("a.txt")).unwrap(), "changed");
    assert_eq!(fs::read_to_string(replica.join("dir/c.txt")).unwrap(), "x");

    let contents = fs::read_to_string(&log).unwrap();
    let first = contents.lines().next().unwrap();
    assert!(first.contains(" - "), "Unexpected log line: {}", first);
    assert!(contents.contains(" - Starting synchronization..."));
    assert!(contents.contains(&format!("Directory created: {}", replica.display())));
    assert!(contents.contains(&format!(
        "File copied: {} -> {}",
        source.join("a.txt").display(),
        replica.join("a.txt").display()
    )));
}
