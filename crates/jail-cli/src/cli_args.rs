use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "jail")]
#[command(about = "Load status scripts into an isolated cell and call into them")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Initialize a cell and print its command catalog.
    Init(CellArgs),
    /// Initialize a cell, then call one function of it.
    Invoke(InvokeArgs),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct CellArgs {
    #[arg(long = "script")]
    pub(crate) script: String,
    #[arg(long = "cell", default_value = "main")]
    pub(crate) cell: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
    #[arg(long = "fixtures")]
    pub(crate) fixtures: Option<String>,
    /// How long to let timers registered by the script keep firing.
    #[arg(long = "wait-ms", default_value_t = 0)]
    pub(crate) wait_ms: u64,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct InvokeArgs {
    #[command(flatten)]
    pub(crate) cell: CellArgs,
    #[arg(long = "call")]
    pub(crate) function_path: String,
    #[arg(long = "args", default_value = "{}")]
    pub(crate) args: String,
}
