use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use jail_core::{
    JailError, RpcCall, RpcClient, RpcClientError, RpcClientProvider, RpcResponse,
    TransactionProcessor,
};
use serde_json::Value;
use uuid::Uuid;

/// Context token linking pre- and post-processing of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub message_id: String,
    pub cell_id: String,
    pub method: String,
}

#[derive(Debug, Default)]
struct CellGate {
    busy: Mutex<bool>,
    released: Condvar,
}

impl CellGate {
    fn acquire(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while *busy {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *busy = true;
    }

    fn release(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        *busy = false;
        drop(busy);
        self.released.notify_one();
    }
}

/// Owns the RPC client provider and serializes requests per cell.
pub struct RequestManager {
    provider: Arc<dyn RpcClientProvider>,
    transactions: Arc<dyn TransactionProcessor>,
    rpc_timeout: Option<Duration>,
    gates: Mutex<HashMap<String, Arc<CellGate>>>,
    contexts: Mutex<HashMap<String, PendingRequest>>,
}

impl RequestManager {
    pub fn new(
        provider: Arc<dyn RpcClientProvider>,
        transactions: Arc<dyn TransactionProcessor>,
        rpc_timeout: Option<Duration>,
    ) -> Self {
        Self {
            provider,
            transactions,
            rpc_timeout,
            gates: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn rpc_client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        self.provider.rpc_client()
    }

    fn gate(&self, cell_id: &str) -> Arc<CellGate> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(cell_id.to_string()).or_default())
    }

    fn contexts(&self) -> Result<MutexGuard<'_, HashMap<String, PendingRequest>>, JailError> {
        self.contexts
            .lock()
            .map_err(|_| JailError::PreProcessing("request context store is poisoned".to_string()))
    }

    /// Waits until no other request of `cell_id` is in flight, then records
    /// a fresh context for `request`.
    pub fn pre_process(
        &self,
        cell_id: &str,
        request: &RpcCall,
    ) -> Result<PendingRequest, JailError> {
        let gate = self.gate(cell_id);
        gate.acquire();

        let pending = PendingRequest {
            message_id: Uuid::new_v4().to_string(),
            cell_id: cell_id.to_string(),
            method: request.method.clone(),
        };
        let recorded = self.contexts().and_then(|mut contexts| {
            if contexts.contains_key(&pending.message_id) {
                return Err(JailError::PreProcessing(format!(
                    "message id {} is already in use",
                    pending.message_id
                )));
            }
            contexts.insert(pending.message_id.clone(), pending.clone());
            Ok(())
        });
        if let Err(error) = recorded {
            gate.release();
            return Err(error);
        }

        tracing::trace!(
            cell = cell_id,
            message_id = %pending.message_id,
            method = %request.method,
            "request pre-processed"
        );
        Ok(pending)
    }

    /// Clears the context recorded by [`Self::pre_process`] and lets the next
    /// request of the cell through.
    pub fn post_process(&self, cell_id: &str, request: &RpcCall, pending: PendingRequest) {
        match self.contexts() {
            Ok(mut contexts) => {
                contexts.remove(&pending.message_id);
            }
            Err(error) => tracing::warn!(cell = cell_id, %error, "cannot clear request context"),
        }
        tracing::trace!(
            cell = cell_id,
            message_id = %pending.message_id,
            method = %request.method,
            "request post-processed"
        );
        self.gate(cell_id).release();
    }

    pub fn pending_contexts(&self) -> usize {
        self.contexts().map(|contexts| contexts.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn poison_contexts(&self) {
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.contexts.lock();
                    panic!("poisoning request contexts");
                })
                .join();
        });
    }

    /// Handles `eth_sendTransaction` without going through the RPC client.
    pub fn dispatch_send_transaction(&self, cell_id: &str, request: &RpcCall) -> RpcResponse {
        match self.transactions.process_send_transaction(cell_id, request) {
            Ok(hash) => {
                tracing::debug!(cell = cell_id, %hash, "transaction queued");
                RpcResponse::result(request.id.clone(), Value::String(hash.to_hex()))
            }
            Err(error) => {
                tracing::warn!(cell = cell_id, %error, "send transaction failed");
                RpcResponse::internal_error(request.id.clone(), error.to_string())
            }
        }
    }

    /// Dispatches `request` to the node and folds the outcome into a response.
    pub fn call(&self, client: &Arc<dyn RpcClient>, request: &RpcCall) -> RpcResponse {
        let id = request.id.clone();
        match self.call_client(client, request) {
            Ok(None) => RpcResponse::result(id, Value::Null),
            Ok(Some(raw)) if raw.trim().is_empty() => RpcResponse::result(id, Value::Null),
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(result) => RpcResponse::result(id, result),
                Err(error) => RpcResponse::internal_error(id, error.to_string()),
            },
            Err(RpcClientError::Protocol { code, message }) => {
                RpcResponse::error(id, code, message)
            }
            Err(error) => RpcResponse::internal_error(id, error.to_string()),
        }
    }

    fn call_client(
        &self,
        client: &Arc<dyn RpcClient>,
        request: &RpcCall,
    ) -> Result<Option<String>, RpcClientError> {
        tracing::debug!(method = %request.method, "dispatching RPC request");
        let Some(timeout) = self.rpc_timeout else {
            return client.call(&request.method, request.params());
        };

        let (sender, receiver) = mpsc::channel();
        let worker_client = Arc::clone(client);
        let method = request.method.clone();
        let params = request.params().to_vec();
        thread::Builder::new()
            .name("rpc-call".to_string())
            .spawn(move || {
                let _ = sender.send(worker_client.call(&method, &params));
            })
            .map_err(|error| RpcClientError::Transport(error.to_string()))?;

        match receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(RpcClientError::Transport(format!(
                "request {} timed out after {}ms",
                request.method,
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(RpcClientError::Transport(format!(
                "request {} was aborted",
                request.method
            ))),
        }
    }
}

#[cfg(test)]
mod request_manager_tests {
    use super::*;
    use jail_core::{NoTransactionProcessor, TxHash, INTERNAL_ERROR_CODE};
    use jail_fixtures::{FixedTransactionProcessor, FixtureClient, FixtureProvider, FixtureReply};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn fixture_manager(client: FixtureClient) -> RequestManager {
        RequestManager::new(
            Arc::new(FixtureProvider::new(client)),
            Arc::new(NoTransactionProcessor),
            None,
        )
    }

    fn dispatch(manager: &RequestManager, request: &RpcCall) -> RpcResponse {
        let client = manager.rpc_client().expect("client");
        manager.call(&client, request)
    }

    #[test]
    fn call_embeds_parsed_result() {
        let manager = fixture_manager(
            FixtureClient::new().with("eth_blockNumber", FixtureReply::result(json!("0x10"))),
        );
        let response = dispatch(&manager, &RpcCall::new(1, "eth_blockNumber", vec![]));
        assert_eq!(response, RpcResponse::result(json!(1), json!("0x10")));
    }

    #[test]
    fn call_turns_missing_result_into_explicit_null() {
        let manager = fixture_manager(
            FixtureClient::new().with("eth_getTransactionReceipt", FixtureReply::Null),
        );
        let response = dispatch(&manager, &RpcCall::new(3, "eth_getTransactionReceipt", vec![]));
        assert_eq!(
            response.to_value(),
            json!({"jsonrpc": "2.0", "id": 3, "result": null})
        );
    }

    #[test]
    fn call_keeps_protocol_error_code_and_message() {
        let manager = fixture_manager(
            FixtureClient::new().with("eth_call", FixtureReply::error(-32000, "execution reverted")),
        );
        let response = dispatch(&manager, &RpcCall::new(4, "eth_call", vec![]));
        assert_eq!(response, RpcResponse::error(json!(4), -32000, "execution reverted"));
    }

    #[test]
    fn call_maps_transport_and_parse_failures_to_internal_error() {
        let manager = fixture_manager(
            FixtureClient::new()
                .with("net_version", FixtureReply::Transport("connection refused".to_string()))
                .with("eth_chainId", FixtureReply::Raw("{not json".to_string())),
        );
        let transport = dispatch(&manager, &RpcCall::new(5, "net_version", vec![]));
        assert_eq!(
            transport,
            RpcResponse::error(json!(5), INTERNAL_ERROR_CODE, "connection refused")
        );
        let parse = dispatch(&manager, &RpcCall::new(6, "eth_chainId", vec![]));
        assert!(parse.is_error());
        assert_eq!(parse.id, json!(6));
    }

    #[test]
    fn call_times_out_when_configured() {
        let client = FixtureClient::new().with(
            "eth_syncing",
            FixtureReply::result(json!(false)).delayed(Duration::from_millis(500)),
        );
        let manager = RequestManager::new(
            Arc::new(FixtureProvider::new(client)),
            Arc::new(NoTransactionProcessor),
            Some(Duration::from_millis(20)),
        );
        let started = Instant::now();
        let response = dispatch(&manager, &RpcCall::new(7, "eth_syncing", vec![]));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(
            response.outcome,
            jail_core::RpcOutcome::Error(ref error) if error.message.contains("timed out")
        ));
    }

    #[test]
    fn send_transaction_embeds_hash_or_internal_error() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xde;
        let manager = RequestManager::new(
            Arc::new(FixtureProvider::unavailable()),
            Arc::new(FixedTransactionProcessor::succeeding(TxHash(bytes))),
            None,
        );
        let request = RpcCall::new(9, "eth_sendTransaction", vec![json!({"to": "0x01"})]);
        let response = manager.dispatch_send_transaction("chat", &request);
        assert_eq!(response.id, json!(9));
        assert_eq!(
            response.to_value()["result"].as_str().map(|hash| hash.starts_with("0xde")),
            Some(true)
        );

        let manager = fixture_manager(FixtureClient::new());
        let failed = manager.dispatch_send_transaction("chat", &request);
        assert_eq!(failed.id, json!(9));
        assert!(failed.is_error());
    }

    #[test]
    fn pre_and_post_processing_never_overlap_within_a_cell() {
        let manager = Arc::new(fixture_manager(FixtureClient::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers = (0..8)
            .map(|index| {
                let manager = Arc::clone(&manager);
                let in_flight = Arc::clone(&in_flight);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    let request = RpcCall::new(index, "eth_blockNumber", vec![]);
                    let pending = manager.pre_process("same-cell", &request).expect("pre");
                    if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    manager.post_process("same-cell", &request, pending);
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().expect("worker should finish");
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_contexts(), 0);
    }

    #[test]
    fn unrecordable_context_fails_and_releases_the_cell() {
        let manager = fixture_manager(FixtureClient::new());
        manager.poison_contexts();
        let request = RpcCall::new(1, "eth_blockNumber", vec![]);
        let error = manager.pre_process("chat", &request).expect_err("poisoned store");
        assert!(matches!(error, JailError::PreProcessing(_)));
        // a second attempt must not block on a gate left held by the first
        let error = manager.pre_process("chat", &request).expect_err("still poisoned");
        assert!(matches!(error, JailError::PreProcessing(_)));
    }

    #[test]
    fn distinct_cells_do_not_wait_on_each_other() {
        let manager = fixture_manager(FixtureClient::new());
        let first = RpcCall::new(1, "a", vec![]);
        let second = RpcCall::new(2, "b", vec![]);
        let pending_a = manager.pre_process("cell-a", &first).expect("pre a");
        let pending_b = manager.pre_process("cell-b", &second).expect("pre b");
        assert_ne!(pending_a.message_id, pending_b.message_id);
        assert_eq!(manager.pending_contexts(), 2);
        manager.post_process("cell-a", &first, pending_a);
        manager.post_process("cell-b", &second, pending_b);
        assert_eq!(manager.pending_contexts(), 0);
    }
}
