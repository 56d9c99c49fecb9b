use std::time::Duration;

use jail_runtime::CellOptions;
use serde::Deserialize;

/// Settings shared by every cell of a [`Jail`](crate::Jail).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JailConfig {
    /// Script run in every cell before the bootstrap prelude.
    pub base_script: String,
    /// Per-request limit for calls into the RPC client. `None` waits forever.
    pub rpc_timeout_ms: Option<u64>,
    pub max_operations: Option<u64>,
    pub max_call_levels: Option<usize>,
}

impl JailConfig {
    pub fn with_base_script(base_script: impl Into<String>) -> Self {
        Self {
            base_script: base_script.into(),
            ..Self::default()
        }
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout_ms.map(Duration::from_millis)
    }

    pub fn cell_options(&self) -> CellOptions {
        CellOptions {
            max_operations: self.max_operations,
            max_call_levels: self.max_call_levels,
        }
    }
}
