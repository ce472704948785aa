use std::io;
use std::process::ExitCode;

use clap::Parser;
use smap::cli::{Cli, run};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn initialize_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    initialize_logging();

    let cli = Cli::parse();
    let config = cli.config();
    tracing::debug!("running with {config:?}");

    let stdin = io::stdin();
    let stdout = io::stdout();
    match run(&cli, &config, &mut stdin.lock(), &mut stdout.lock()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
