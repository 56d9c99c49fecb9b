use thiserror::Error;

use crate::rpc::INTERNAL_ERROR_CODE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JailError {
    #[error("cell[{0}] doesn't exist")]
    NotFound(String),
    #[error("jail environment is not properly initialized: {0}")]
    InvalidEnvironment(String),
    #[error("RPC client is unavailable: {0}")]
    ClientUnavailable(String),
    #[error("request pre-processing failed: {0}")]
    PreProcessing(String),
    #[error("{0}")]
    ScriptExecution(String),
    #[error("{message}")]
    Protocol { code: i64, message: String },
    #[error("{0}")]
    Internal(String),
}

impl JailError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "JAIL_CELL_NOT_FOUND",
            Self::InvalidEnvironment(_) => "JAIL_INVALID_ENVIRONMENT",
            Self::ClientUnavailable(_) => "JAIL_CLIENT_UNAVAILABLE",
            Self::PreProcessing(_) => "JAIL_PRE_PROCESSING",
            Self::ScriptExecution(_) => "JAIL_SCRIPT_EXECUTION",
            Self::Protocol { .. } => "JAIL_PROTOCOL",
            Self::Internal(_) => "JAIL_INTERNAL",
        }
    }

    /// JSON-RPC error code used when this error is embedded into a response.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::Protocol { code, .. } => *code,
            _ => INTERNAL_ERROR_CODE,
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::ScriptExecution(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_cell() {
        let error = JailError::NotFound("chat-1".to_string());
        assert_eq!(error.to_string(), "cell[chat-1] doesn't exist");
        assert_eq!(error.code(), "JAIL_CELL_NOT_FOUND");
    }

    #[test]
    fn protocol_errors_keep_their_rpc_code() {
        let error = JailError::Protocol {
            code: -32000,
            message: "execution reverted".to_string(),
        };
        assert_eq!(error.rpc_code(), -32000);
        assert_eq!(error.to_string(), "execution reverted");
        assert_eq!(JailError::internal("boom").rpc_code(), INTERNAL_ERROR_CODE);
    }
}
