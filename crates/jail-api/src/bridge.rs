//! The `jeth` module: the single path from script code to the RPC node.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use jail_core::{decode_calls, JailError, RpcResponse};
use jail_runtime::helpers::rhai_bridge::{json_to_dynamic, runtime_error, stringify_dynamic};
use jail_runtime::rhai::{Dynamic, EvalAltResult, FnPtr, Module, NativeCallContext, INT};
use serde_json::Value;

use crate::request_manager::RequestManager;

pub const BRIDGE_MODULE: &str = "jeth";

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Single(RpcResponse),
    Batch(Vec<RpcResponse>),
}

impl BridgeReply {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Single(response) => response.to_value(),
            Self::Batch(responses) => {
                Value::Array(responses.iter().map(RpcResponse::to_value).collect())
            }
        }
    }
}

pub struct RpcBridge {
    manager: Arc<RequestManager>,
}

impl RpcBridge {
    pub fn new(manager: Arc<RequestManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<RequestManager> {
        &self.manager
    }

    /// Routes a serialized payload (one request or a batch) and answers in
    /// request order. Only an undecodable payload is an `Err`; every other
    /// failure is carried as response data.
    pub fn send_raw(&self, cell_id: &str, raw: &[u8]) -> Result<BridgeReply, JailError> {
        let client = match self.manager.rpc_client() {
            Ok(client) => client,
            Err(error) => {
                tracing::warn!(cell = cell_id, %error, "no RPC client for bridge call");
                return Ok(BridgeReply::Single(RpcResponse::internal_error(
                    Value::Null,
                    error.to_string(),
                )));
            }
        };

        let (calls, batch) = decode_calls(raw)
            .map_err(|error| JailError::script(format!("invalid JSON-RPC payload: {}", error)))?;

        let mut responses = Vec::with_capacity(calls.len());
        for call in &calls {
            if call.is_send_transaction() {
                responses.push(self.manager.dispatch_send_transaction(cell_id, call));
                continue;
            }

            let pending = match self.manager.pre_process(cell_id, call) {
                Ok(pending) => pending,
                Err(error) => {
                    tracing::warn!(cell = cell_id, %error, "aborting bridge call");
                    return Ok(BridgeReply::Single(RpcResponse::internal_error(
                        Value::Null,
                        error.to_string(),
                    )));
                }
            };
            let response = self.manager.call(&client, call);
            self.manager.post_process(cell_id, call, pending);
            responses.push(response);
        }

        if batch {
            return Ok(BridgeReply::Batch(responses));
        }
        Ok(responses
            .into_iter()
            .next()
            .map(BridgeReply::Single)
            .unwrap_or_else(|| BridgeReply::Batch(Vec::new())))
    }
}

struct BridgeHandler {
    bridge: Arc<RpcBridge>,
    cell_id: String,
    next_id: AtomicI64,
}

impl BridgeHandler {
    fn dispatch(&self, payload: Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
        let text = stringify_dynamic(payload).map_err(|error| runtime_error(error.to_string()))?;
        let reply = self
            .bridge
            .send_raw(&self.cell_id, text.as_bytes())
            .map_err(|error| runtime_error(error.to_string()))?;
        Ok(json_to_dynamic(&reply.to_value()))
    }

    /// Node-style delivery: a callable second argument receives
    /// `(null, response)` and the call itself returns unit. Short-circuit
    /// replies (no client, aborted pre-processing) take the same path, so a
    /// callback always sees exactly one response.
    fn dispatch_with_callback(
        &self,
        context: &NativeCallContext,
        payload: Dynamic,
        callback: Dynamic,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let response = self.dispatch(payload)?;
        match callback.try_cast::<FnPtr>() {
            Some(callback) => {
                let _ = callback
                    .call_within_context::<Dynamic>(context, (Dynamic::UNIT, response))?;
                Ok(Dynamic::UNIT)
            }
            None => Ok(response),
        }
    }
}

/// Builds the `jeth` module bound into one cell.
pub fn bridge_module(bridge: Arc<RpcBridge>, cell_id: &str) -> Module {
    let handler = Arc::new(BridgeHandler {
        bridge,
        cell_id: cell_id.to_string(),
        next_id: AtomicI64::new(0),
    });

    let mut module = Module::new();
    for name in ["send", "sendAsync"] {
        let single = Arc::clone(&handler);
        module.set_native_fn(name, move |payload: Dynamic| single.dispatch(payload));
        let with_callback = Arc::clone(&handler);
        module.set_native_fn(
            name,
            move |context: NativeCallContext, payload: Dynamic, callback: Dynamic| {
                with_callback.dispatch_with_callback(&context, payload, callback)
            },
        );
    }
    let ids = Arc::clone(&handler);
    module.set_native_fn("next_id", move || -> Result<INT, Box<EvalAltResult>> {
        Ok(ids.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    });
    module
}
