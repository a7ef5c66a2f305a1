mod analytics;
mod app;
mod cache;
mod clock;
mod commands;
mod config;
mod db;
mod http;
mod notify;
#[cfg(test)]
mod testing;
mod worker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "vplan-worker")]
#[command(about = "Offline cache and push notification worker for a substitution schedule app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vplan-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to this file
  #[arg(long, value_name = "FILE")]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

/// Log to stderr, filtered by RUST_LOG, and optionally to a file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = || {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vplan_worker=info"))
  };

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_filter(filter());

  let (file, guard) = match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(stderr)
    .with(file)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config, &args.command)?;
  app.run(args.command).await?;

  Ok(())
}
