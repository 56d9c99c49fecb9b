use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JailError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const INTERNAL_ERROR_CODE: i64 = -32603;
pub const SEND_TRANSACTION_METHOD: &str = "eth_sendTransaction";

/// One JSON-RPC request as decoded from a bridge payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcCall {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

impl RpcCall {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn params(&self) -> &[Value] {
        self.params.as_deref().unwrap_or(&[])
    }

    pub fn is_send_transaction(&self) -> bool {
        self.method == SEND_TRANSACTION_METHOD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcErrorObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: RpcOutcome::Error(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn internal_error(id: Value, message: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR_CODE, message)
    }

    pub fn from_error(id: Value, error: &JailError) -> Self {
        Self::error(id, error.rpc_code(), error.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }

    /// Wire form of the response. Every field is already JSON, so
    /// serialization cannot fail.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// 32-byte transaction hash returned by the send-transaction path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(2 + self.0.len() * 2);
        out.push_str("0x");
        for byte in self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Decodes a bridge payload. A leading `[` (after whitespace) marks a batch.
pub fn decode_calls(raw: &[u8]) -> Result<(Vec<RpcCall>, bool), serde_json::Error> {
    let batch = raw
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .is_some_and(|byte| *byte == b'[');
    if batch {
        Ok((serde_json::from_slice(raw)?, true))
    } else {
        Ok((vec![serde_json::from_slice(raw)?], false))
    }
}
