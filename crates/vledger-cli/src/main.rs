//! # vledger CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vledger_cli::journal::{run_journal, JournalArgs};

/// Vendor ledger operator CLI.
#[derive(Parser, Debug)]
#[command(name = "vledger", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify and inspect a journal file.
    Journal(JournalArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Journal(args) => run_journal(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use vledger_cli::journal::JournalCommand;

    #[test]
    fn cli_parse_journal_verify() {
        let cli = Cli::try_parse_from(["vledger", "journal", "verify", "data/journal.jsonl"]).unwrap();
        let Commands::Journal(args) = cli.command;
        match args.command {
            JournalCommand::Verify { path } => {
                assert_eq!(path, PathBuf::from("data/journal.jsonl"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parse_journal_ledger_with_options() {
        let cli = Cli::try_parse_from([
            "vledger", "-vv", "journal", "ledger", "j.jsonl", "plumber-1", "--limit", "5", "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Journal(args) = cli.command;
        match args.command {
            JournalCommand::Ledger {
                vendor_id,
                limit,
                json,
                ..
            } => {
                assert_eq!(vendor_id, "plumber-1");
                assert_eq!(limit, Some(5));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parse_ledger_requires_vendor() {
        assert!(Cli::try_parse_from(["vledger", "journal", "ledger", "j.jsonl"]).is_err());
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["vledger"]).is_err());
    }
}
