use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jail_api::{Jail, JailOptions, RpcClientProvider};
use jail_fixtures::{FixtureClient, FixtureProvider, RecordingSignalSink, SignalKind};
use serde_json::{json, Value};

use crate::{
    init_logging, json_string, load_config, map_cli_fixtures_invalid, map_cli_script_read,
    CellArgs, CliConfig, CliError, InvokeArgs,
};

pub(crate) struct HostSession {
    pub(crate) jail: Jail,
    pub(crate) signals: Arc<RecordingSignalSink>,
    pub(crate) client: Option<Arc<FixtureClient>>,
}

/// What one command produced, ready to be printed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunReport {
    pub(crate) catalog: Value,
    pub(crate) invoke: Option<Value>,
    pub(crate) timers_idle: bool,
    pub(crate) signals: Vec<Value>,
    pub(crate) rpc_methods: Vec<String>,
}

pub(crate) fn run_init(args: CellArgs) -> Result<i32, CliError> {
    let (session, script) = open_session(&args)?;
    let report = run_cell(&session, &args, &script, None)?;
    Ok(emit_report(&report))
}

pub(crate) fn run_invoke(args: InvokeArgs) -> Result<i32, CliError> {
    let (session, script) = open_session(&args.cell)?;
    let report = run_cell(
        &session,
        &args.cell,
        &script,
        Some((args.function_path.as_str(), args.args.as_str())),
    )?;
    Ok(emit_report(&report))
}

fn open_session(args: &CellArgs) -> Result<(HostSession, String), CliError> {
    let config = load_config(args.config.as_deref().map(Path::new))?;
    init_logging(config.log_level());
    let script = fs::read_to_string(&args.script).map_err(map_cli_script_read)?;
    let session = build_session(&config, args.fixtures.as_deref().map(Path::new))?;
    Ok((session, script))
}

/// Fixtures given on the command line override the ones named in the
/// config. Without any, the cell runs against a node that is not started.
pub(crate) fn build_session(
    config: &CliConfig,
    fixtures: Option<&Path>,
) -> Result<HostSession, CliError> {
    let fixtures = fixtures.or(config.fixtures.as_deref());
    let client = match fixtures {
        Some(path) => Some(Arc::new(
            FixtureClient::from_file(path).map_err(map_cli_fixtures_invalid)?,
        )),
        None => None,
    };
    let provider: Arc<dyn RpcClientProvider> = match &client {
        Some(client) => Arc::new(FixtureProvider::shared(Arc::clone(client))),
        None => Arc::new(FixtureProvider::unavailable()),
    };

    let signals = Arc::new(RecordingSignalSink::new());
    let jail = Jail::new(JailOptions {
        config: config.jail.clone(),
        transactions: None,
        signals: Some(signals.clone()),
        provider,
    });
    Ok(HostSession {
        jail,
        signals,
        client,
    })
}

pub(crate) fn run_cell(
    session: &HostSession,
    args: &CellArgs,
    script: &str,
    call: Option<(&str, &str)>,
) -> Result<RunReport, CliError> {
    let catalog = envelope_result(
        &session.jail.initialize(&args.cell, script),
        "JAIL_INITIALIZE",
    )?;
    let invoke = match call {
        Some((function_path, call_args)) => Some(envelope_result(
            &session.jail.invoke(&args.cell, function_path, call_args),
            "JAIL_INVOKE",
        )?),
        None => None,
    };

    let cell = session.jail.get_cell(&args.cell)?;
    let timers_idle = if args.wait_ms > 0 {
        cell.run_event_loop_for(Duration::from_millis(args.wait_ms))
    } else {
        cell.event_loop().pending() == 0
    };

    Ok(RunReport {
        catalog,
        invoke,
        timers_idle,
        signals: session
            .signals
            .signals()
            .into_iter()
            .map(|signal| {
                let kind = match signal.kind {
                    SignalKind::SendMessage => "sendMessage",
                    SignalKind::ShowSuggestions => "showSuggestions",
                };
                json!({"kind": kind, "payload": signal.payload})
            })
            .collect(),
        rpc_methods: session
            .client
            .as_ref()
            .map(|client| client.methods())
            .unwrap_or_default(),
    })
}

/// Unwraps a `{"result": ...}` envelope. `{"error": ...}` becomes a
/// [`CliError`] under `code`.
pub(crate) fn envelope_result(envelope: &str, code: &'static str) -> Result<Value, CliError> {
    let mut value: Value = serde_json::from_str(envelope)
        .map_err(|error| CliError::new(code, format!("malformed envelope: {}", error)))?;
    if let Some(message) = value.get("error") {
        let message = message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string());
        return Err(CliError::new(code, message));
    }
    Ok(value
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

pub(crate) fn emit_report(report: &RunReport) -> i32 {
    println!("RESULT:OK");
    println!("CATALOG_JSON:{}", report.catalog);
    if let Some(invoke) = &report.invoke {
        println!("INVOKE_JSON:{}", invoke);
    }
    for signal in &report.signals {
        println!("SIGNAL_JSON:{}", signal);
    }
    for method in &report.rpc_methods {
        println!("RPC_CALL:{}", json_string(method));
    }
    println!(
        "TIMERS:{}",
        if report.timers_idle { "IDLE" } else { "PENDING" }
    );
    0
}
