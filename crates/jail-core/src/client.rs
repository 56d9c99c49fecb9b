use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::error::JailError;
use crate::rpc::{RpcCall, TxHash};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcClientError {
    /// Structured error reported by the node.
    #[error("{message}")]
    Protocol { code: i64, message: String },
    #[error("{0}")]
    Transport(String),
}

/// Connected client able to execute a named remote method.
///
/// `Ok(None)` means the node answered without a result payload (JSON `null`);
/// `Ok(Some(text))` carries the raw JSON text of the result.
pub trait RpcClient: Send + Sync {
    fn call(&self, method: &str, params: &[Value]) -> Result<Option<String>, RpcClientError>;
}

pub trait RpcClientProvider: Send + Sync {
    fn rpc_client(&self) -> Result<Arc<dyn RpcClient>, JailError>;
}

pub trait TransactionProcessor: Send + Sync {
    fn process_send_transaction(
        &self,
        cell_id: &str,
        request: &RpcCall,
    ) -> Result<TxHash, JailError>;
}

/// Receives chat signals raised from script code.
pub trait SignalSink: Send + Sync {
    fn send_message(&self, cell_id: &str, payload: &Value);
    fn show_suggestions(&self, cell_id: &str, payload: &Value);
}

#[derive(Debug, Default)]
pub struct UnavailableProvider;

impl RpcClientProvider for UnavailableProvider {
    fn rpc_client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        Err(JailError::ClientUnavailable(
            "node is not started".to_string(),
        ))
    }
}

#[derive(Debug, Default)]
pub struct NoTransactionProcessor;

impl TransactionProcessor for NoTransactionProcessor {
    fn process_send_transaction(
        &self,
        _cell_id: &str,
        _request: &RpcCall,
    ) -> Result<TxHash, JailError> {
        Err(JailError::internal(
            "transaction processing is not configured",
        ))
    }
}
