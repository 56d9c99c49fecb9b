use std::sync::Arc;

use jail_core::SignalSink;
use jail_runtime::helpers::rhai_bridge::{dynamic_to_json, runtime_error};
use jail_runtime::rhai::{Dynamic, EvalAltResult, Module};
use serde_json::Value;

pub const SIGNALS_MODULE: &str = "statusSignals";

/// Default sink: signals only show up in the log.
#[derive(Debug, Default)]
pub struct TracingSignalSink;

impl SignalSink for TracingSignalSink {
    fn send_message(&self, cell_id: &str, payload: &Value) {
        tracing::info!(cell = cell_id, %payload, "sendMessage signal");
    }

    fn show_suggestions(&self, cell_id: &str, payload: &Value) {
        tracing::info!(cell = cell_id, %payload, "showSuggestions signal");
    }
}

pub fn signals_module(sink: Arc<dyn SignalSink>, cell_id: &str) -> Module {
    let mut module = Module::new();

    let message_sink = Arc::clone(&sink);
    let message_cell = cell_id.to_string();
    module.set_native_fn(
        "sendMessage",
        move |payload: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let payload =
                dynamic_to_json(payload).map_err(|error| runtime_error(error.to_string()))?;
            message_sink.send_message(&message_cell, &payload);
            Ok(())
        },
    );

    let suggestions_cell = cell_id.to_string();
    module.set_native_fn(
        "showSuggestions",
        move |payload: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let payload =
                dynamic_to_json(payload).map_err(|error| runtime_error(error.to_string()))?;
            sink.show_suggestions(&suggestions_cell, &payload);
            Ok(())
        },
    );

    module
}
