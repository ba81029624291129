//! CLI and environment handling for the resmon_agent binary.
use assert_cmd::Command;
use std::fs;

fn agent() -> Command {
    let mut cmd = Command::cargo_bin("resmon_agent").expect("binary built");
    cmd.env_remove("LOG_DIR")
        .env_remove("MONITOR_MODE")
        .env_remove("MONITOR_INTERVAL")
        .env_remove("LOG_FORMAT")
        .env("CONSOLE_OUTPUT", "false")
        .env("PING_HOST", "127.0.0.1")
        .env("PING_TIMEOUT_MS", "100");
    cmd
}

#[test]
fn help_prints_usage() {
    let out = agent().arg("--help").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage: resmon_agent"));
}

#[test]
fn bad_format_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    agent()
        .env("LOG_DIR", dir.path())
        .env("LOG_FORMAT", "json")
        .arg("--once")
        .assert()
        .code(2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn unknown_flag_exits_with_config_error() {
    agent().arg("--port").arg("3000").assert().code(2);
}

#[test]
fn unusable_log_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();
    agent()
        .env("LOG_DIR", file.join("logs"))
        .arg("--once")
        .assert()
        .code(1);
}

#[test]
fn once_writes_every_category_file() {
    let dir = tempfile::tempdir().unwrap();
    agent()
        .args(["--once", "--mode", "it", "--format", "both", "-d"])
        .arg(dir.path())
        .assert()
        .success();

    for name in ["cpu", "memory", "disk", "network"] {
        assert!(dir.path().join(format!("{name}-it.log")).exists(), "{name} log");
        let csv = fs::read_to_string(dir.path().join(format!("{name}-it.csv"))).unwrap();
        assert!(csv.starts_with("timestamp,level,"), "{name} header: {csv}");
    }
    assert!(!dir.path().join("main-it.csv").exists());

    let main = fs::read_to_string(dir.path().join("main-it.log")).unwrap();
    assert!(main.contains("Starting monitor in it mode"));
    assert!(main.contains("Monitor stopped"));

    // network rows are written even when the probe cannot run
    let net = fs::read_to_string(dir.path().join("network-it.csv")).unwrap();
    assert_eq!(net.lines().count(), 2);
    assert!(net.lines().nth(1).unwrap().ends_with(",127.0.0.1"));
}

#[cfg(target_os = "linux")]
#[test]
fn once_samples_cpu_and_memory() {
    let dir = tempfile::tempdir().unwrap();
    agent()
        .env("LOG_DIR", dir.path())
        .env("MONITOR_MODE", "lin")
        .env("LOG_FORMAT", "csv")
        .arg("--once")
        .assert()
        .success();
    for name in ["cpu", "memory"] {
        let csv = fs::read_to_string(dir.path().join(format!("{name}-lin.csv"))).unwrap();
        assert_eq!(csv.lines().count(), 2, "{name}: {csv}");
        assert!(csv.lines().nth(1).unwrap().contains(",INFO,"));
    }
    assert!(!dir.path().join("cpu-lin.log").exists());
    assert!(!dir.path().join("main-lin.log").exists());
}
