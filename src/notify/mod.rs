//! Push notifications: payload decoding, merging per plan, click handling.

mod center;
mod clients;
mod handler;
mod merge;
mod payload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub use center::{NotificationCenter, SqliteNotificationCenter};
pub use clients::WindowList;
pub use handler::{ClickAction, ClickOutcome, NotificationHandler, PushOutcome};
pub use payload::{AffectedDay, AffectedGroupsByDay, Expiry};

pub type NotificationId = i64;

/// Data attached to a shown notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationData {
  SubsUpdate(SubsUpdateData),
  GenericMessage,
}

/// Consolidated substitution update for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsUpdateData {
  pub plan_id: String,
  /// Page opened when the notification is clicked
  pub url: Url,
  pub affected_groups_by_day: AffectedGroupsByDay,
  /// Number of pushes merged into this notification
  #[serde(default)]
  pub notification_count: u32,
}

/// Options of a system notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
  #[serde(default)]
  pub body: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub badge: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lang: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub vibrate: Vec<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<NotificationData>,
}

/// A visible system notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub id: NotificationId,
  pub title: String,
  pub options: NotificationOptions,
  pub shown_at: DateTime<Utc>,
}

impl Notification {
  pub fn subs_update(&self) -> Option<&SubsUpdateData> {
    match &self.options.data {
      Some(NotificationData::SubsUpdate(data)) => Some(data),
      _ => None,
    }
  }

  /// Plan this notification belongs to, if it is a substitution update.
  pub fn plan_id(&self) -> Option<&str> {
    self.subs_update().map(|data| data.plan_id.as_str())
  }
}
