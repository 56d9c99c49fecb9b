use super::*;
use crate::cli_test_support::*;

#[test]
fn run_cli_rejects_unknown_subcommands() {
    assert_ne!(run_cli_from_args(["jail", "explode"]), 0);
}

#[test]
fn run_cli_reports_missing_script_with_error_code() {
    let missing = temp_path("missing-script").join("main.rhai");
    let code = run_cli_from_args([
        "jail".to_string(),
        "init".to_string(),
        "--script".to_string(),
        missing.to_string_lossy().to_string(),
    ]);
    assert_eq!(code, 1);
}

#[test]
fn init_parses_defaults() {
    let cli = Cli::try_parse_from(["jail", "init", "--script", "a.rhai"]).expect("parse");
    let Mode::Init(args) = cli.command else {
        panic!("expected init");
    };
    assert_eq!(args.cell, "main");
    assert_eq!(args.wait_ms, 0);
    assert!(args.config.is_none());
}

#[test]
fn invoke_parses_call_and_args() {
    let cli = Cli::try_parse_from([
        "jail",
        "invoke",
        "--script",
        "a.rhai",
        "--cell",
        "wallet",
        "--call",
        "commands.balance",
        "--args",
        r#"{"address":"0x01"}"#,
        "--wait-ms",
        "50",
    ])
    .expect("parse");
    let Mode::Invoke(args) = cli.command else {
        panic!("expected invoke");
    };
    assert_eq!(args.cell.cell, "wallet");
    assert_eq!(args.cell.wait_ms, 50);
    assert_eq!(args.function_path, "commands.balance");
    assert_eq!(args.args, r#"{"address":"0x01"}"#);
}

#[test]
fn run_init_succeeds_for_a_plain_script() {
    let root = temp_path("plain-init");
    let script = root.join("main.rhai");
    write_file(&script, "let _status_catalog = #{ ok: true };");
    let code = run_init(CellArgs {
        script: script.to_string_lossy().to_string(),
        cell: "main".to_string(),
        config: None,
        fixtures: None,
        wait_ms: 0,
    })
    .expect("init should run");
    assert_eq!(code, 0);
}

#[test]
fn run_invoke_maps_script_failures_to_jail_invoke() {
    let root = temp_path("failing-invoke");
    let script = root.join("main.rhai");
    write_file(
        &script,
        "let _status_catalog = #{}; fn dispatch(path, args) { throw \"bad \" + path; }",
    );
    let error = run_invoke(InvokeArgs {
        cell: CellArgs {
            script: script.to_string_lossy().to_string(),
            cell: "main".to_string(),
            config: None,
            fixtures: None,
            wait_ms: 0,
        },
        function_path: "commands.x".to_string(),
        args: "{}".to_string(),
    })
    .expect_err("invoke should fail");
    assert_eq!(error.code, "JAIL_INVOKE");
    assert!(error.message.contains("bad commands.x"));
}
