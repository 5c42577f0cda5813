//! Main entry point for the mtar CLI app

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use mtar::cli::Args;
use mtar::cli_runner::run_command;

fn main() -> ExitCode {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run_command(&args.command, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command execution failed: {:?}", e);
            eprintln!("Error: {}", e);
            if e.is_corruption() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
