//! Scripted stand-ins for the host collaborators of a jail: an RPC client
//! answering from a fixture table, a transaction processor with a fixed
//! outcome, and a signal sink that records what scripts raised.

mod client;
mod host;

pub use client::{
    FixtureClient, FixtureEntry, FixtureError, FixtureProvider, FixtureReply, RecordedCall,
};
pub use host::{FixedTransactionProcessor, RecordedSignal, RecordingSignalSink, SignalKind};

use std::path::PathBuf;

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

pub fn demos_root() -> PathBuf {
    workspace_root().join("demos")
}

pub fn demo_path(name: &str) -> PathBuf {
    demos_root().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_root_points_to_workspace() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }

    #[test]
    fn demo_path_joins_name() {
        assert!(demo_path("wallet.rhai").ends_with("demos/wallet.rhai"));
    }
}
