#![warn(missing_docs)]

//! Entry point for the `vdesk` binary.

mod cli;
mod commands;
mod error;

use std::process;

use clap::Parser;
use tracing::error;

use crate::{cli::Cli, error::Result};

fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen command.
fn run() -> Result<()> {
    let Cli {
        log,
        config,
        command,
    } = Cli::parse();
    logging::init_stderr(&log.spec());
    commands::run(config.as_deref(), command)
}
