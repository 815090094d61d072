use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
iter_period_us = 1000
pc_actuation = "voltage_ref"
field_reg_enabled = false
current_reg_enabled = true

[load]
ohms_ser = 0.1
ohms_par = 1000.0
ohms_mag = 0.05
henrys_nominal = 0.5
henrys_sat = 0.2
i_sat_start = 100.0
i_sat_end = 200.0

[ireg.operational]
period_iters = 1
closed_loop_bandwidth_hz = 50.0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Validate the JSONL schema emitted by `run --stats` for a short current-regulation run.
#[rstest]
fn jsonl_stats_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("regconv_cli").unwrap();
    cmd.arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--signal")
        .arg("current")
        .arg("--reference")
        .arg("5.0")
        .arg("--duration-ms")
        .arg("20")
        .arg("--stats");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"iteration\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSONL telemetry line found; stdout was: {stdout}"
    );

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");

    assert!(v.get("iteration").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("reference").and_then(|x| x.as_f64()).is_some());
    assert!(v.get("actuation").and_then(|x| x.as_f64()).is_some());
    assert!(v.get("meas").and_then(|x| x.as_f64()).is_some());
    assert!(v.get("error_warning").and_then(|x| x.as_bool()).is_some());
    assert!(v.get("error_fault").and_then(|x| x.as_bool()).is_some());
    assert!(v.get("state").and_then(|x| x.as_str()).is_some());
}

/// A run with no `--stats` flag should print a one-line human summary, not JSONL.
#[rstest]
fn plain_run_has_no_jsonl() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("regconv_cli").unwrap();
    cmd.arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--signal")
        .arg("current")
        .arg("--reference")
        .arg("1.0")
        .arg("--duration-ms")
        .arg("10");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    assert!(!stdout.lines().any(|l| l.contains("\"iteration\"")));
    assert!(stdout.contains("ran"));
}
