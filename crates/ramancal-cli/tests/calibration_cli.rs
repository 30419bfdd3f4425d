use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn run_command(subcommand: &str, config: &Path, base_dir: &Path) -> Output {
    let binary_path = env!("CARGO_BIN_EXE_ramancal");
    Command::new(binary_path)
        .arg(subcommand)
        .arg("--config")
        .arg(config)
        .arg("--base-dir")
        .arg(base_dir)
        .output()
        .expect("command should spawn")
}

fn write_flat_response_run(dir: &Path) {
    // experimental areas equal theoretical intensities, so the fitted
    // correction is flat and every degree converges to ~zero coefficients
    write_file(
        &dir.join("areas.txt"),
        "1.0 0.01\n2.0 0.02\n3.0 0.03\n4.0 0.04\n",
    );
    write_file(
        &dir.join("lines.txt"),
        "300.0 1.0\n500.0 2.0\n700.0 3.0\n900.0 4.0\n",
    );
    write_file(
        &dir.join("run.json"),
        r#"{
            "temperature": { "mode": "fixed", "value": 298.0 },
            "fits": [
                { "degree": "linear", "initialCoefficients": [-0.5] },
                { "degree": "quadratic", "initialCoefficients": [-0.5, 0.1] }
            ],
            "species": [
                {
                    "name": "H2",
                    "experimental": "areas.txt",
                    "theoretical": { "fixed": { "table": "lines.txt" } }
                }
            ],
            "axis": { "start": 200.0, "end": 1000.0, "count": 9 },
            "outputDir": "out"
        }"#,
    );
}

#[test]
fn fit_command_emits_curves_and_report() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_flat_response_run(temp.path());

    let output = run_command("fit", &temp.path().join("run.json"), temp.path());
    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("linear"));
    assert!(stdout.contains("best fit:"));

    for artifact in ["corrn_curve_1.txt", "corrn_curve_2.txt"] {
        let content = fs::read_to_string(temp.path().join("out").join(artifact))
            .expect("curve artifact should exist");
        assert!(content.starts_with("corrn_curve_"));
        assert_eq!(content.lines().count(), 10);
    }

    let report: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("out/fit_report.json"))
            .expect("report should be readable"),
    )
    .expect("report JSON should parse");
    assert_eq!(report["fits"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["fits"][0]["converged"], Value::Bool(true));
}

#[test]
fn validate_command_checks_tables_without_fitting() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_flat_response_run(temp.path());

    let output = run_command("validate", &temp.path().join("run.json"), temp.path());
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("run config OK"));
    assert!(
        !temp.path().join("out").exists(),
        "validate must not create outputs"
    );
}

#[test]
fn missing_config_exits_with_io_diagnostic() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_command("fit", &temp.path().join("absent.json"), temp.path());
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("IO.RUN_CONFIG"), "stderr: {stderr}");
}

#[test]
fn misaligned_tables_exit_with_input_diagnostic() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_flat_response_run(temp.path());
    // drop one theoretical line so the tables no longer align
    write_file(&temp.path().join("lines.txt"), "300.0 1.0\n500.0 2.0\n700.0 3.0\n");

    let output = run_command("fit", &temp.path().join("run.json"), temp.path());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("INPUT.SPECIES_ALIGNMENT"), "stderr: {stderr}");
    assert!(stderr.contains("H2"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let binary_path = env!("CARGO_BIN_EXE_ramancal");
    let output = Command::new(binary_path)
        .arg("frobnicate")
        .output()
        .expect("command should spawn");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("INPUT.CLI_USAGE"));
}
