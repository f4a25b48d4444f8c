//! Hubstaff command-line client
//!
//! Single binary that:
//! 1. Loads `hubstaff.toml` and the token state file
//! 2. Refreshes the personal access token when it is about to expire
//! 3. Calls the Hubstaff API and prints the JSON response to stdout
//!
//! Logs are JSON on stderr so stdout stays machine-readable.

mod cli;
mod commands;
mod config;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let phase = err.downcast_ref::<error::Error>();
            let code = phase.map(error::Error::exit_code).unwrap_or(1);
            error!(
                phase = phase.map(error::Error::phase).unwrap_or("run"),
                error = %format!("{err:#}"),
                "command failed"
            );
            eprintln!("hubstaff: {err:#}");
            if phase.is_some_and(error::Error::requires_reauthorization) {
                eprintln!(
                    "hubstaff: create a new personal access token and install it with `hubstaff set-token`"
                );
            }
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let location = Config::resolve_path(cli.config.as_deref());
    debug!(path = %location.path.display(), explicit = location.explicit, "loading configuration");

    let config = Config::load(&location).map_err(|e| error::Error::Config(e.to_string()))?;
    let app = App::build(&config).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::execute(&app, cli.command, &mut out).await
}
