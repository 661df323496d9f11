use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use listing_pilot::EngineConfig;

mod cli;

use cli::{dispatch, CliArgs, CliContext};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    // Held until exit so buffered file logs get flushed
    let _log_guard = init_logging(&cli)?;

    info!("Starting ListingPilot v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    let ctx = CliContext::new(config, cli.output);

    match dispatch(cli.command, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr (or `--log-file`) so structured output on stdout stays
/// parseable.
fn init_logging(cli: &CliArgs) -> Result<Option<WorkerGuard>> {
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        cli.log_level.parse().context("Invalid log level")?
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let (writer, guard, ansi) = match &cli.log_file {
        Some(path) => {
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or_else(|| std::path::Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let layer = if cli.log_json {
        tracing_subscriber::fmt::layer().json().with_writer(writer).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_ansi(ansi).with_writer(writer).boxed()
    };

    tracing_subscriber::registry().with(layer.with_filter(filter)).init();

    Ok(guard)
}
