//! MFA Session Rotator CLI
//!
//! This is the main entry point for the CLI application.

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use mfa_session_rotator::cli::{self, Cli};
use tracing::{subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG overrides the verbosity flag
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // Progress lines own stdout
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_file(verbose >= 3)
        .with_line_number(verbose >= 3)
        .compact()
        .finish();

    subscriber::set_global_default(subscriber)?;

    Ok(())
}
