use std::fmt::{self, Display};

use jail_api::JailError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliError {
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl CliError {
    pub(crate) fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<JailError> for CliError {
    fn from(error: JailError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub(crate) fn map_cli_config_read(error: std::io::Error) -> CliError {
    map_error("CLI_CONFIG_READ", error)
}

pub(crate) fn map_cli_config_invalid(error: toml::de::Error) -> CliError {
    map_error("CLI_CONFIG_INVALID", error)
}

pub(crate) fn map_cli_base_script_read(error: std::io::Error) -> CliError {
    map_error("CLI_BASE_SCRIPT_READ", error)
}

pub(crate) fn map_cli_script_read(error: std::io::Error) -> CliError {
    map_error("CLI_SCRIPT_READ", error)
}

pub(crate) fn map_cli_fixtures_invalid(error: jail_fixtures::FixtureError) -> CliError {
    map_error("CLI_FIXTURES_INVALID", error)
}
