use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "runloop",
    about = "Supervise instruments, list devices and manage the host cache",
    version
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report whether instruments is running
    Running,
    /// List running instruments processes
    #[command(visible_alias = "ps")]
    Pids,
    /// Terminate every running instruments process
    Kill {
        /// Signal to try before KILL (QUIT, TERM or KILL)
        #[arg(long)]
        signal: Option<String>,
        /// Toolchain version used to pick the signal, e.g. 7.3.1
        #[arg(long)]
        toolchain: Option<String>,
    },
    /// List simulators or physical devices
    Devices {
        #[arg(long)]
        physical: bool,
        /// Listing format: legacy or modern
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        toolchain: Option<String>,
    },
    /// Launch instruments against a device, detached
    Launch {
        /// Device or simulator identifier
        #[arg(short = 'w', long)]
        device: String,
        /// Template path or name
        #[arg(short, long)]
        template: String,
        /// Trace output directory
        #[arg(short = 'D', long)]
        trace_dir: Option<PathBuf>,
        /// Environment for the target, KEY=VALUE
        #[arg(short, long = "env")]
        env: Vec<String>,
        /// Extra arguments, shell quoted
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
        /// Log file for the tool's output
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Bundle path or identifier
        bundle: String,
    },
    /// Inspect or clear the host cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print the backing file path
    Path,
    /// Print the cached mapping
    Show,
    /// Delete the backing file
    Clear,
}
