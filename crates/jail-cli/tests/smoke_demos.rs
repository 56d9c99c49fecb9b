use std::path::PathBuf;
use std::process::Command;

fn demos_root() -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
}

fn run_jail(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_jail"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("jail should execute")
}

fn demo_file(name: &str) -> String {
    demos_root().join(name).to_string_lossy().into_owned()
}

fn line_value<'a>(stdout: &'a str, prefix: &str) -> Option<&'a str> {
    stdout.lines().find_map(|line| line.strip_prefix(prefix))
}

#[test]
fn init_prints_demo_catalog() {
    let script = demo_file("wallet.rhai");
    let config = demo_file("jail.toml");
    let output = run_jail(&[
        "init",
        "--script",
        script.as_str(),
        "--config",
        config.as_str(),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout:\n{}", stdout);
    assert!(stdout.contains("RESULT:OK"));

    let catalog: serde_json::Value =
        serde_json::from_str(line_value(&stdout, "CATALOG_JSON:").expect("catalog line"))
            .expect("catalog json");
    assert!(catalog["commands"]["send"].is_object());
}

#[test]
fn invoke_runs_balance_command_and_drains_timers() {
    let script = demo_file("wallet.rhai");
    let config = demo_file("jail.toml");
    let output = run_jail(&[
        "invoke",
        "--script",
        script.as_str(),
        "--config",
        config.as_str(),
        "--call",
        "commands.balance",
        "--args",
        r#"{"address":"0x01"}"#,
        "--wait-ms",
        "2000",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(line_value(&stdout, "INVOKE_JSON:"), Some("\"0x38d7ea4c68000\""));
    assert_eq!(line_value(&stdout, "RPC_CALL:"), Some("\"eth_getBalance\""));
    assert_eq!(line_value(&stdout, "TIMERS:"), Some("IDLE"));
    assert_eq!(
        stdout.lines().filter(|line| line.starts_with("SIGNAL_JSON:")).count(),
        2
    );
}

#[test]
fn unknown_command_is_reported_as_invoke_error() {
    let script = demo_file("wallet.rhai");
    let config = demo_file("jail.toml");
    let output = run_jail(&[
        "invoke",
        "--script",
        script.as_str(),
        "--config",
        config.as_str(),
        "--call",
        "commands.unknown",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("RESULT:ERROR"));
    assert_eq!(line_value(&stdout, "ERROR_CODE:"), Some("JAIL_INVOKE"));
}
