//! CLI subcommands, each delivering one event to the worker or inspecting
//! its state.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use url::Url;

use crate::notify::NotificationId;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Prefetch the plans into the cache
  Install,

  /// Evict stale cache entries and start intercepting fetches
  Activate,

  /// Fetch a URL or path through the worker
  #[command(visible_alias = "f")]
  Fetch {
    /// Absolute URL or path relative to the origin
    target: String,

    /// Behave as if the network were down
    #[arg(long)]
    offline: bool,

    /// Write the response body to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
  },

  /// Deliver a push message; without --data or --file it carries no payload
  Push {
    /// Payload as a JSON string
    #[arg(long, conflicts_with = "file")]
    data: Option<String>,

    /// Read the payload from a file
    #[arg(long)]
    file: Option<PathBuf>,
  },

  /// Click a notification
  Click {
    id: NotificationId,

    /// URL of an open window (repeatable)
    #[arg(long = "client", value_name = "URL")]
    clients: Vec<String>,
  },

  /// List visible notifications
  #[command(visible_alias = "n")]
  Notifications,

  /// List cached entries of all caches
  Cache,
}

impl Command {
  /// Whether the worker should run without network access.
  pub fn offline(&self) -> bool {
    matches!(self, Command::Fetch { offline: true, .. })
  }

  /// Window URLs given on the command line, resolved against `origin`.
  pub fn client_urls(&self, origin: &Url) -> Result<Vec<Url>> {
    match self {
      Command::Click { clients, .. } => clients.iter().map(|c| resolve(origin, c)).collect(),
      _ => Ok(Vec::new()),
    }
  }
}

/// Resolve a URL or a path against the origin.
pub fn resolve(origin: &Url, target: &str) -> Result<Url> {
  origin
    .join(target)
    .map_err(|e| eyre!("Invalid URL or path '{}': {}", target, e))
}

/// Raw push data from --data or --file.
pub fn read_push_data(data: Option<String>, file: Option<PathBuf>) -> Result<Option<Vec<u8>>> {
  if let Some(data) = data {
    return Ok(Some(data.into_bytes()));
  }

  match file {
    Some(path) => std::fs::read(&path)
      .map(Some)
      .map_err(|e| eyre!("Failed to read push data from {}: {}", path.display(), e)),
    None => Ok(None),
  }
}
