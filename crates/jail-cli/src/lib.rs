use std::ffi::OsString;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod config;
mod error_map;
mod runner;

pub(crate) use cli_args::{CellArgs, Cli, InvokeArgs, Mode};
pub(crate) use config::{load_config, CliConfig};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_base_script_read, map_cli_config_invalid,
    map_cli_config_read, map_cli_fixtures_invalid, map_cli_script_read, CliError,
};
pub(crate) use runner::{run_init, run_invoke};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Init(args) => run_init(args),
        Mode::Invoke(args) => run_invoke(args),
    }
}

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG` wins over
/// the configured level.
pub(crate) fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
pub(crate) mod cli_test_support {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("jail-rs-{}-{}", name, nanos))
    }

    pub(crate) fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent should be created");
        }
        fs::write(path, content).expect("file should be written");
    }

    pub(crate) fn demo_path(name: &str) -> PathBuf {
        jail_fixtures::demo_path(name)
    }
}

#[cfg(test)]
mod tests;
