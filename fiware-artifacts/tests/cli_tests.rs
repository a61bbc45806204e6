//! Runs the built binary and checks where its output goes.

use std::process::{Command, Output};

use rstest::rstest;

const MISSING_CONFIG: &str = "/nonexistent/fiware-artifacts.json";

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fiware-artifacts"))
        .args(args)
        .env("FIWARE_LOG_LEVEL", "info")
        .env_remove("FIWARE_LOG_TARGET")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run fiware-artifacts")
}

#[rstest]
#[case("development")]
#[case("debug")]
#[case("json")]
#[case("silent")]
fn fatal_error_is_reported_once_on_stderr(#[case] log_mode: &str) {
    let output = run(&["subscribe", "--config", MISSING_CONFIG, "--log-mode", log_mode]);

    assert!(!output.status.success());
    assert!(
        output.stdout.is_empty(),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Failed to read configuration file").count(),
        1,
        "stderr: {stderr}"
    );
}

#[test]
fn invalid_arguments_fail_before_running() {
    let output = run(&[
        "subscribe",
        "--config",
        MISSING_CONFIG,
        "--port-start",
        "9000",
        "--port-end",
        "8000",
    ]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid arguments"), "stderr: {stderr}");
    assert!(!stderr.contains("Failed to read configuration file"));
}
