use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// duct isolated from the caller's config files and DUCT_* variables
fn duct(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("duct").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("HOME", dir.path());
    for (key, _) in std::env::vars() {
        if key.starts_with("DUCT_") || key == "RUST_LOG" {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_sample_interval_above_report_interval_is_rejected() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["--s-i", "2", "--r-i", "1", "-p", "logs/run_", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("report-interval"));
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn test_exit_code_is_mirrored() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["--f-t", "0", "-p", "logs/run_", "sh", "-c", "exit 5"])
        .assert()
        .code(5);
}

#[test]
fn test_missing_command() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["-p", "logs/run_", "nonexistent_command_12345"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains("command not found"));
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn test_quick_failure_logs_are_removed() {
    let dir = TempDir::new().unwrap();
    duct(&dir).args(["-p", "logs/run_", "false"]).assert().code(1);
    assert!(!dir.path().join("logs/run_info.json").exists());
    assert!(!dir.path().join("logs/run_usage.jsonl").exists());

    duct(&dir)
        .args(["--f-t", "0", "-p", "kept/run_", "false"])
        .assert()
        .code(1);
    assert!(dir.path().join("kept/run_info.json").exists());
}

#[test]
fn test_quick_success_logs_are_kept() {
    let dir = TempDir::new().unwrap();
    duct(&dir).args(["-p", "logs/run_", "true"]).assert().success();
    assert!(dir.path().join("logs/run_info.json").exists());
}

#[test]
fn test_capture_stdout_only() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["-c", "stdout", "-o", "none", "-p", "logs/"])
        .args(["sh", "-c", "echo out; echo err >&2"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_eq!(fs::read_to_string(dir.path().join("logs/stdout")).unwrap(), "out\n");
    assert!(!dir.path().join("logs/stderr").exists());
}

#[test]
fn test_output_is_teed() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["-p", "logs/run_", "echo", "hello"])
        .assert()
        .success()
        .stdout("hello\n");
    assert_eq!(fs::read_to_string(dir.path().join("logs/run_stdout")).unwrap(), "hello\n");
}

#[test]
fn test_usage_and_info_records() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["--s-i", "0.1", "--r-i", "0.3", "-m", "probe", "-p", "logs/run_", "sleep", "1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Exit Code: 0"));

    let info = read_json(&dir.path().join("logs/run_info.json"));
    assert_eq!(info["command"], "sleep 1");
    assert_eq!(info["message"], "probe");
    assert_eq!(info["schema_version"], "0.2.2");
    assert!(info["system"]["cpu_total"].as_u64().unwrap() >= 1);
    let summary = &info["execution_summary"];
    assert_eq!(summary["exit_code"], 0);
    assert!(summary["wall_clock_time"].as_f64().unwrap() >= 1.0);

    let usage = fs::read_to_string(dir.path().join("logs/run_usage.jsonl")).unwrap();
    let reports: Vec<Value> = usage.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert!(reports.len() >= 2);
    let sampled: u64 = reports.iter().map(|r| r["num_samples"].as_u64().unwrap()).sum();
    assert_eq!(sampled, summary["num_samples"].as_u64().unwrap());
    assert_eq!(reports.len() as u64, summary["num_reports"].as_u64().unwrap());

    let first = &reports[0];
    let (_, process) = first["processes"].as_object().unwrap().iter().next().unwrap();
    for key in ["pcpu", "pmem", "rss", "vsz", "timestamp", "etime", "stat", "cmd"] {
        assert!(process.get(key).is_some(), "missing {key}");
    }
    for key in ["pmem", "pcpu", "rss", "vsz"] {
        assert!(first["totals"].get(key).is_some(), "missing totals.{key}");
    }
}

#[test]
fn test_quiet_silences_summary() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["-q", "-p", "logs/run_", "true"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_clobber_protection() {
    let dir = TempDir::new().unwrap();
    duct(&dir).args(["-p", "logs/run_", "true"]).assert().success();
    duct(&dir)
        .args(["-p", "logs/run_", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--clobber"));
    duct(&dir)
        .args(["--clobber", "-p", "logs/run_", "true"])
        .assert()
        .success();
}

#[test]
fn test_config_file_and_environment_precedence() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("duct.toml");
    fs::write(&config, "output-prefix = \"fromfile/\"\nfail-time = 0.0\n").unwrap();

    duct(&dir)
        .arg("--config")
        .arg(&config)
        .args(["sh", "-c", "exit 3"])
        .assert()
        .code(3);
    assert!(dir.path().join("fromfile/info.json").exists());

    duct(&dir)
        .env("DUCT_CONFIG", &config)
        .env("DUCT_OUTPUT_PREFIX", "fromenv/")
        .args(["sh", "-c", "exit 3"])
        .assert()
        .code(3);
    assert!(dir.path().join("fromenv/info.json").exists());

    duct(&dir)
        .env("DUCT_CONFIG", &config)
        .env("DUCT_OUTPUT_PREFIX", "fromenv/")
        .args(["-p", "fromflag/", "sh", "-c", "exit 3"])
        .assert()
        .code(3);
    assert!(dir.path().join("fromflag/info.json").exists());
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    duct(&dir)
        .args(["--config", "nope.toml", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn test_dotenv_config_paths() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("duct.env");
    fs::write(&env_file, "DUCT_OUTPUT_PREFIX=dotenv/\nDUCT_FAIL_TIME=0\n").unwrap();

    duct(&dir)
        .env("DUCT_CONFIG_PATHS", &env_file)
        .arg("false")
        .assert()
        .code(1);
    assert!(dir.path().join("dotenv/info.json").exists());
}

#[test]
fn test_interrupt_is_forwarded() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let dir = TempDir::new().unwrap();
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("duct"))
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .args(["-q", "-p", "logs/run_", "sleep", "30"])
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_secs(1));
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));
}
