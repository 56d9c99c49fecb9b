pub mod client;
pub mod envelope;
pub mod error;
pub mod rpc;

pub use client::*;
pub use envelope::{make_error, make_result, make_result_text};
pub use error::JailError;
pub use rpc::*;
