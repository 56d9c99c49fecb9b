use std::fs;
use std::path::{Path, PathBuf};

use jail_api::JailConfig;
use serde::Deserialize;

use crate::{map_cli_base_script_read, map_cli_config_invalid, map_cli_config_read, CliError};

pub(crate) const DEFAULT_LOG_LEVEL: &str = "warn";

/// Contents of the `--config` TOML file.
///
/// ```toml
/// log_level = "debug"
/// base_script_path = "base.rhai"
/// fixtures = "wallet.fixtures.json"
///
/// [jail]
/// rpc_timeout_ms = 2000
/// max_operations = 1000000
/// ```
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct CliConfig {
    pub(crate) log_level: Option<String>,
    pub(crate) base_script_path: Option<PathBuf>,
    pub(crate) fixtures: Option<PathBuf>,
    pub(crate) jail: JailConfig,
}

impl CliConfig {
    pub(crate) fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<CliConfig, CliError> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = fs::read_to_string(path).map_err(map_cli_config_read)?;
    let mut config = parse_config(&text)?;

    let root = path.parent().unwrap_or_else(|| Path::new("."));
    config.base_script_path = config.base_script_path.map(|file| root.join(file));
    config.fixtures = config.fixtures.map(|file| root.join(file));

    if config.jail.base_script.trim().is_empty() {
        if let Some(base_script_path) = &config.base_script_path {
            config.jail.base_script =
                fs::read_to_string(base_script_path).map_err(map_cli_base_script_read)?;
        }
    }
    Ok(config)
}

pub(crate) fn parse_config(text: &str) -> Result<CliConfig, CliError> {
    toml::from_str(text).map_err(map_cli_config_invalid)
}
