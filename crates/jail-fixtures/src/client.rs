use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use jail_core::{JailError, RpcClient, RpcClientError, RpcClientProvider};
use serde_json::{Map, Value};
use thiserror::Error;

pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("cannot read fixture file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("fixture file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fixture for {method} is invalid: {reason}")]
    InvalidEntry { method: String, reason: String },
}

/// What the fixture client answers for one method.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureReply {
    Result(Value),
    /// The node answered without a result payload.
    Null,
    Error { code: i64, message: String },
    Transport(String),
    /// Raw result text handed back unparsed.
    Raw(String),
}

impl FixtureReply {
    pub fn result(value: Value) -> Self {
        Self::Result(value)
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn delayed(self, delay: Duration) -> FixtureEntry {
        FixtureEntry {
            reply: self,
            delay: Some(delay),
        }
    }

    fn outcome(&self) -> Result<Option<String>, RpcClientError> {
        match self {
            Self::Result(value) => Ok(Some(value.to_string())),
            Self::Null => Ok(None),
            Self::Error { code, message } => Err(RpcClientError::Protocol {
                code: *code,
                message: message.clone(),
            }),
            Self::Transport(message) => Err(RpcClientError::Transport(message.clone())),
            Self::Raw(text) => Ok(Some(text.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureEntry {
    pub reply: FixtureReply,
    pub delay: Option<Duration>,
}

impl From<FixtureReply> for FixtureEntry {
    fn from(reply: FixtureReply) -> Self {
        Self { reply, delay: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// RPC client answering from a method → reply table.
#[derive(Debug, Default)]
pub struct FixtureClient {
    entries: HashMap<String, FixtureEntry>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: impl Into<String>, entry: impl Into<FixtureEntry>) -> Self {
        self.entries.insert(method.into(), entry.into());
        self
    }

    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let text = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses a fixture table such as
    /// `{"eth_blockNumber": {"result": "0x10", "delay_ms": 5}}`. Each entry
    /// carries exactly one of `result`, `error`, `transport` or `raw`.
    pub fn from_json_str(text: &str) -> Result<Self, FixtureError> {
        let table: Map<String, Value> = serde_json::from_str(text)?;
        let mut client = Self::new();
        for (method, raw_entry) in table {
            let entry = parse_entry(&method, &raw_entry)?;
            client.entries.insert(method, entry);
        }
        Ok(client)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.method).collect()
    }

    /// Highest number of calls that were ever executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl RpcClient for FixtureClient {
    fn call(&self, method: &str, params: &[Value]) -> Result<Option<String>, RpcClientError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method: method.to_string(),
                params: params.to_vec(),
            });

        let outcome = match self.entries.get(method) {
            Some(entry) => {
                if let Some(delay) = entry.delay {
                    thread::sleep(delay);
                }
                entry.reply.outcome()
            }
            None => Err(RpcClientError::Protocol {
                code: METHOD_NOT_FOUND_CODE,
                message: format!("the method {} does not exist/is not available", method),
            }),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn parse_entry(method: &str, raw_entry: &Value) -> Result<FixtureEntry, FixtureError> {
    let invalid = |reason: &str| FixtureError::InvalidEntry {
        method: method.to_string(),
        reason: reason.to_string(),
    };
    let Value::Object(fields) = raw_entry else {
        return Err(invalid("entry must be an object"));
    };

    let reply = if let Some(error) = fields.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("error.code must be an integer"))?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        FixtureReply::error(code, message)
    } else if let Some(message) = fields.get("transport") {
        FixtureReply::Transport(message.as_str().unwrap_or_default().to_string())
    } else if let Some(raw) = fields.get("raw") {
        let raw = raw.as_str().ok_or_else(|| invalid("raw must be a string"))?;
        FixtureReply::Raw(raw.to_string())
    } else {
        match fields.get("result") {
            Some(Value::Null) => FixtureReply::Null,
            Some(value) => FixtureReply::Result(value.clone()),
            None => return Err(invalid("expected one of result, error, transport, raw")),
        }
    };

    let delay = match fields.get("delay_ms") {
        None => None,
        Some(value) => Some(Duration::from_millis(
            value
                .as_u64()
                .ok_or_else(|| invalid("delay_ms must be a non-negative integer"))?,
        )),
    };
    Ok(FixtureEntry { reply, delay })
}

/// Hands out one shared [`FixtureClient`], or none to simulate a node that
/// is not running.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    client: Option<Arc<FixtureClient>>,
}

impl FixtureProvider {
    pub fn new(client: FixtureClient) -> Self {
        Self::shared(Arc::new(client))
    }

    pub fn shared(client: Arc<FixtureClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn unavailable() -> Self {
        Self { client: None }
    }

    pub fn client(&self) -> Option<&Arc<FixtureClient>> {
        self.client.as_ref()
    }
}

impl RpcClientProvider for FixtureProvider {
    fn rpc_client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        match &self.client {
            Some(client) => Ok(Arc::clone(client) as Arc<dyn RpcClient>),
            None => Err(JailError::ClientUnavailable(
                "fixture node is not started".to_string(),
            )),
        }
    }
}
