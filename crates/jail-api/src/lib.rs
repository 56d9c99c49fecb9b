pub mod bootstrap;
pub mod bridge;
pub mod config;
mod jail;
pub mod request_manager;
pub mod signals;

pub use bridge::{bridge_module, BridgeReply, RpcBridge, BRIDGE_MODULE};
pub use config::JailConfig;
pub use jail::{Jail, JailOptions};
pub use request_manager::{PendingRequest, RequestManager};
pub use signals::{signals_module, TracingSignalSink, SIGNALS_MODULE};

pub use jail_core::*;
pub use jail_runtime::{Cell, CellStatus};
