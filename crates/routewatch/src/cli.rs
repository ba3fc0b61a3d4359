//! Exposes the command line application.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use routewatch_service::config::Config;
use routewatch_service::metrics;
use routewatch_service::types::Coordinate;

use crate::logging;
use crate::replay;

/// Routewatch commands.
#[derive(Subcommand)]
enum Command {
    /// Replay a recorded push event stream and print the resulting map overlay as JSON.
    Replay {
        /// Newline-delimited JSON file with one `{"event": ..., "data": ...}` object per line.
        #[arg(long, value_name = "FILE")]
        events: PathBuf,

        /// Milliseconds to wait between events.
        ///
        /// Without a pace, every event is fully resolved before the next one is applied.
        #[arg(long, value_name = "MILLIS")]
        pace: Option<u64>,
    },

    /// Resolve a single route and print it as JSON.
    Resolve {
        /// Origin as `lat,lon`.
        #[arg(allow_hyphen_values = true)]
        origin: Coordinate,
        /// Destination as `lat,lon`.
        #[arg(allow_hyphen_values = true)]
        destination: Coordinate,
    },

    /// Load the configuration and print it with all defaults filled in.
    CheckConfig,
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "routewatch", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: We're still single-threaded at this point, no runtime has been started.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let tags = config.metrics.custom_tags.clone();
        if let Err(err) = metrics::configure_statsd(&config.metrics.prefix, statsd, tags) {
            tracing::warn!(error = &err as &dyn std::error::Error, "Failed to configure statsd");
        }
    }

    match cli.command {
        Command::Replay { events, pace } => {
            let pace = pace.map(Duration::from_millis);
            replay::run(&config, &events, pace).context("failed to replay events")?
        }
        Command::Resolve {
            origin,
            destination,
        } => replay::resolve_one(&config, origin, destination)
            .context("failed to resolve route")?,
        Command::CheckConfig => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
    }

    Ok(())
}
