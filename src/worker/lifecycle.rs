use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::str::FromStr;

use crate::db::Database;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, no install event handled yet
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Active and intercepting fetches
  Activated,
  /// Replaced by another version or failed to install
  Redundant,
}

impl WorkerState {
  /// Check if this state allows fetch interception
  pub fn can_intercept_fetch(&self) -> bool {
    matches!(self, WorkerState::Activated)
  }

  /// Installing is a no-op once the version is (being) activated
  pub fn can_install(&self) -> bool {
    !matches!(self, WorkerState::Activating | WorkerState::Activated)
  }

  pub fn can_activate(&self) -> bool {
    matches!(self, WorkerState::Installed | WorkerState::Activated)
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

impl FromStr for WorkerState {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "parsed" => Ok(WorkerState::Parsed),
      "installing" => Ok(WorkerState::Installing),
      "installed" => Ok(WorkerState::Installed),
      "activating" => Ok(WorkerState::Activating),
      "activated" => Ok(WorkerState::Activated),
      "redundant" => Ok(WorkerState::Redundant),
      other => Err(eyre!("Unknown worker state '{}'", other)),
    }
  }
}

/// Persists the lifecycle state of each worker version.
pub trait LifecycleStore: Send + Sync {
  /// State of `version`, `Parsed` if it was never stored.
  fn load(&self, version: &str) -> Result<WorkerState>;

  fn store(&self, version: &str, state: WorkerState) -> Result<()>;

  /// Mark every version other than `version` redundant.
  fn retire_others(&self, version: &str) -> Result<usize>;
}

impl LifecycleStore for Database {
  fn load(&self, version: &str) -> Result<WorkerState> {
    let conn = self.conn()?;

    let state: Option<String> = conn
      .query_row(
        "SELECT state FROM worker_state WHERE version = ?",
        params![version],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load worker state: {}", e))?;

    state.map_or(Ok(WorkerState::Parsed), |s| s.parse())
  }

  fn store(&self, version: &str, state: WorkerState) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO worker_state (version, state, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![version, state.to_string()],
      )
      .map_err(|e| eyre!("Failed to store worker state: {}", e))?;

    Ok(())
  }

  fn retire_others(&self, version: &str) -> Result<usize> {
    let conn = self.conn()?;

    conn
      .execute(
        "UPDATE worker_state SET state = ?, updated_at = datetime('now')
         WHERE version != ? AND state != ?",
        params![
          WorkerState::Redundant.to_string(),
          version,
          WorkerState::Redundant.to_string()
        ],
      )
      .map_err(|e| eyre!("Failed to retire old workers: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_round_trips_through_database() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.load("v1").unwrap(), WorkerState::Parsed);

    db.store("v1", WorkerState::Installed).unwrap();
    assert_eq!(db.load("v1").unwrap(), WorkerState::Installed);

    db.store("v1", WorkerState::Activated).unwrap();
    assert_eq!(db.load("v1").unwrap(), WorkerState::Activated);
  }

  #[test]
  fn test_retire_others() {
    let db = Database::open_in_memory().unwrap();
    db.store("v0", WorkerState::Activated).unwrap();
    db.store("v1", WorkerState::Activated).unwrap();

    assert_eq!(db.retire_others("v1").unwrap(), 1);
    assert_eq!(db.load("v0").unwrap(), WorkerState::Redundant);
    assert_eq!(db.load("v1").unwrap(), WorkerState::Activated);
  }

  #[test]
  fn test_only_installed_workers_activate() {
    assert!(WorkerState::Installed.can_activate());
    assert!(WorkerState::Activated.can_activate());
    assert!(!WorkerState::Parsed.can_activate());
    assert!(!WorkerState::Installing.can_activate());
    assert!(WorkerState::Activated.can_intercept_fetch());
    assert!(!WorkerState::Installed.can_intercept_fetch());
    assert!(WorkerState::Redundant.can_install());
    assert!(WorkerState::Parsed.can_install());
    assert!(!WorkerState::Activated.can_install());
  }
}
