use std::sync::{Mutex, PoisonError};

use jail_core::{JailError, RpcCall, SignalSink, TransactionProcessor, TxHash};
use serde_json::Value;

#[derive(Debug)]
pub struct FixedTransactionProcessor {
    outcome: Result<TxHash, JailError>,
    requests: Mutex<Vec<(String, RpcCall)>>,
}

impl FixedTransactionProcessor {
    pub fn succeeding(hash: TxHash) -> Self {
        Self {
            outcome: Ok(hash),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(JailError::internal(message)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(cell_id, request)` pairs in the order they were processed.
    pub fn requests(&self) -> Vec<(String, RpcCall)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TransactionProcessor for FixedTransactionProcessor {
    fn process_send_transaction(
        &self,
        cell_id: &str,
        request: &RpcCall,
    ) -> Result<TxHash, JailError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((cell_id.to_string(), request.clone()));
        self.outcome.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    SendMessage,
    ShowSuggestions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSignal {
    pub cell_id: String,
    pub kind: SignalKind,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct RecordingSignalSink {
    signals: Mutex<Vec<RecordedSignal>>,
}

impl RecordingSignalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<RecordedSignal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, cell_id: &str, kind: SignalKind, payload: &Value) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedSignal {
                cell_id: cell_id.to_string(),
                kind,
                payload: payload.clone(),
            });
    }
}

impl SignalSink for RecordingSignalSink {
    fn send_message(&self, cell_id: &str, payload: &Value) {
        self.record(cell_id, SignalKind::SendMessage, payload);
    }

    fn show_suggestions(&self, cell_id: &str, payload: &Value) {
        self.record(cell_id, SignalKind::ShowSuggestions, payload);
    }
}

#[cfg(test)]
mod host_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_processor_records_requests() {
        let processor = FixedTransactionProcessor::succeeding(TxHash([7u8; 32]));
        let request = RpcCall::new(1, "eth_sendTransaction", vec![json!({"to": "0x02"})]);
        assert_eq!(
            processor.process_send_transaction("wallet", &request),
            Ok(TxHash([7u8; 32]))
        );
        assert_eq!(processor.requests(), vec![("wallet".to_string(), request)]);

        let failing = FixedTransactionProcessor::failing("signing rejected");
        let error = failing
            .process_send_transaction("wallet", &RpcCall::default())
            .expect_err("configured to fail");
        assert_eq!(error.to_string(), "signing rejected");
    }

    #[test]
    fn signal_sink_keeps_order_and_kind() {
        let sink = RecordingSignalSink::new();
        sink.send_message("chat", &json!("hello"));
        sink.show_suggestions("chat", &json!({"items": []}));
        let kinds = sink
            .signals()
            .into_iter()
            .map(|signal| signal.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![SignalKind::SendMessage, SignalKind::ShowSuggestions]);
    }
}
