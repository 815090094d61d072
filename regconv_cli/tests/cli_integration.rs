use assert_cmd::prelude::*;
use predicates::prelude::*;
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

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check OK", "stdout")]
#[case(&["run", "--signal", "current", "--reference", "1.0", "--duration-ms", "20"], 0, "ran", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("regconv_cli").unwrap();
    cmd.arg("--config").arg(&cfg);

    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn cli_reports_invalid_config() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("cfg.toml");
    fs::write(&bad, "iter_period_us = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("regconv_cli").unwrap();
    cmd.arg("--config").arg(&bad).arg("self-check");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("How to fix"));
}
