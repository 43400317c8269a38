//! # CLI Interface
//!
//! Defines the command-line argument structure for `custody-node` using
//! `clap` derive. Supports three subcommands: `run`, `inspect`, and
//! `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Custody ledger node.
///
/// Replays JSON scenarios against the custody ledger on a simulated chain,
/// and inspects saved ledger state.
#[derive(Parser, Debug)]
#[command(
    name = "custody-node",
    about = "Custody ledger scenario runner",
    version,
    propagate_version = true
)]
pub struct CustodyNodeCli {
    /// Default log filter when `RUST_LOG` is not set.
    #[arg(
        long,
        global = true,
        env = "CUSTODY_LOG",
        default_value = "custody_node=info,custody_ledger=info"
    )]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the custody node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a scenario's operations and print each outcome as a JSON line.
    Run(RunArgs),
    /// Summarize a saved ledger state.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's')]
    pub scenario: PathBuf,

    /// Reattach this saved state instead of initializing a fresh ledger.
    #[arg(long)]
    pub state_in: Option<PathBuf>,

    /// Write the final ledger state here.
    #[arg(long, env = "CUSTODY_STATE")]
    pub state_out: Option<PathBuf>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Path to a saved ledger state.
    #[arg(long, env = "CUSTODY_STATE")]
    pub state: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
