//! chatvault - chat workspace intelligence cache
//!
//! Fetch messages from a chat workspace, persist them to a partitioned
//! Parquet dataset, and read them back as threaded conversation views or
//! via SQL.

mod cli;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use cli::{Cli, Command};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE_ERROR: i32 = 1;
const EXIT_RUNTIME_ERROR: i32 = 2;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };

    match execute(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            classify_runtime_error(&error)
        }
    }
}

#[tokio::main]
async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Cache(args) => cli::cache::run(args).await,
        Command::View(args) => cli::view::run(args),
        Command::Stats(args) => cli::stats::run(args),
        Command::Query(args) => cli::query::run(args).await,
    }
}

/// Config mistakes are the user's to fix (exit 1); everything else is a
/// runtime failure (exit 2).
fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<chatvault_core::Error>() {
        Some(chatvault_core::Error::Config(_)) => EXIT_USAGE_ERROR,
        _ => EXIT_RUNTIME_ERROR,
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}
