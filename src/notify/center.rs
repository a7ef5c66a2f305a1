use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;
use tracing::warn;

use super::{Notification, NotificationId, NotificationOptions};
use crate::db::{parse_datetime, Database};

/// Port to the platform's notification tray.
pub trait NotificationCenter: Send + Sync {
  /// Display a notification and return its id.
  fn show(&self, title: &str, options: &NotificationOptions) -> Result<NotificationId>;

  /// Currently visible notifications, oldest first.
  fn get_notifications(&self) -> Result<Vec<Notification>>;

  /// Dismiss a notification. Returns false if it was not visible.
  fn close(&self, id: NotificationId) -> Result<bool>;
}

/// Notification tray persisted in SQLite, so notifications outlive the
/// process that showed them.
pub struct SqliteNotificationCenter {
  db: Arc<Database>,
}

impl SqliteNotificationCenter {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl NotificationCenter for SqliteNotificationCenter {
  fn show(&self, title: &str, options: &NotificationOptions) -> Result<NotificationId> {
    let conn = self.db.conn()?;
    let options = serde_json::to_string(options)
      .map_err(|e| eyre!("Failed to serialize notification options: {}", e))?;

    conn
      .execute(
        "INSERT INTO notifications (title, options, shown_at) VALUES (?, ?, datetime('now'))",
        params![title, options],
      )
      .map_err(|e| eyre!("Failed to show notification: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn get_notifications(&self) -> Result<Vec<Notification>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT id, title, options, shown_at FROM notifications ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(NotificationId, String, String, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
      .map_err(|e| eyre!("Failed to query notifications: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut notifications = Vec::with_capacity(rows.len());
    for (id, title, options, shown_at) in rows {
      let options: NotificationOptions = match serde_json::from_str(&options) {
        Ok(options) => options,
        Err(e) => {
          // treat unreadable data like a notification without data
          warn!("notification {}: unreadable options: {}", id, e);
          NotificationOptions::default()
        }
      };
      notifications.push(Notification {
        id,
        title,
        options,
        shown_at: parse_datetime(&shown_at)?,
      });
    }

    Ok(notifications)
  }

  fn close(&self, id: NotificationId) -> Result<bool> {
    let conn = self.db.conn()?;

    let removed = conn
      .execute("DELETE FROM notifications WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to close notification {}: {}", id, e))?;

    Ok(removed > 0)
  }
}
