// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Node
//!
//! Entry point for the `custody-node` binary. Parses CLI arguments,
//! initializes logging, and drives the custody ledger.
//!
//! The binary supports three subcommands:
//!
//! - `run`: apply a scenario file against a fresh or reattached ledger
//! - `inspect`: summarize a saved ledger state
//! - `version`: print build version information

mod cli;
mod logging;
mod scenario;

use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;

use custody_ledger::config::STATE_FORMAT_VERSION;
use custody_ledger::{format_units, CustodyLedger, Role};

use cli::{Commands, CustodyNodeCli};

fn main() -> Result<()> {
    let cli = CustodyNodeCli::parse();
    logging::init_logging(&cli.log_level, cli.log_format.into());

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Inspect(args) => inspect_state(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Applies every operation in the scenario and prints one JSON line per outcome.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    let scenario = scenario::load_scenario(&args.scenario)?;
    let state = args
        .state_in
        .as_deref()
        .map(scenario::load_state)
        .transpose()?;

    tracing::info!(
        scenario = %args.scenario.display(),
        operations = scenario.operations.len(),
        reattached = state.is_some(),
        "starting scenario"
    );

    let run = scenario::run(&scenario, state)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for outcome in &run.outcomes {
        serde_json::to_writer(&mut out, outcome).context("failed to encode outcome")?;
        writeln!(out)?;
    }
    out.flush()?;

    if let Some(path) = &args.state_out {
        scenario::save_state(path, &run.ledger.snapshot())?;
        tracing::info!(path = %path.display(), "state written");
    }

    tracing::info!(
        operations = run.outcomes.len(),
        rejected = run.failures(),
        total_custodied = %format_units(run.ledger.total_custodied()),
        "scenario finished"
    );
    Ok(())
}

/// Prints a human-readable summary of a saved state.
fn inspect_state(args: cli::InspectArgs) -> Result<()> {
    let state = scenario::load_state(&args.state)?;
    let ledger = CustodyLedger::from_state(state)
        .with_context(|| format!("cannot reattach {}", args.state.display()))?;

    let admin = ledger
        .admin()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "(none)".into());
    let last_event = ledger
        .events()
        .last()
        .map(|r| {
            format!(
                "#{} {} at {}",
                r.seq,
                r.event.name(),
                r.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
            )
        })
        .unwrap_or_else(|| "(none)".into());

    println!("Ledger           : {}", ledger.address());
    println!("  Initialized    : {}", ledger.is_initialized());
    println!("  Paused         : {}", ledger.is_paused());
    println!("  Admin          : {}", admin);
    println!("  Operators      : {}", ledger.role_member_count(Role::Operator));
    for op in ledger.role_members(Role::Operator) {
        println!("    - {}", op);
    }
    println!("  Threshold      : {}", ledger.operator_threshold());
    println!("  User limit     : {}", format_units(ledger.global_user_limit()));
    println!("  Auth limit     : {}", format_units(ledger.global_user_auth_limit()));
    println!("  Custodied      : {}", format_units(ledger.total_custodied()));
    println!("  Held           : {}", format_units(ledger.native_held()));
    println!("  Events         : {}", ledger.events().len());
    println!("  Last event     : {}", last_event);
    println!("Balances:");
    for (account, balance) in ledger.balances().filter(|(_, b)| *b > 0) {
        println!("  {}  {}", account, format_units(balance));
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("custody-node  {}", env!("CARGO_PKG_VERSION"));
    println!("state format  {}", STATE_FORMAT_VERSION);
}
