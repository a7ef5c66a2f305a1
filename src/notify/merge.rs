//! Merging a new substitution push with the notifications still open for
//! the same plan.

use super::payload::{AffectedDay, AffectedGroupsByDay, SubsUpdatePayload};
use super::{Notification, NotificationId};

const TITLE_SUFFIX: &str = "Neue Vertretungen";

/// Result of merging a push into the open notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedUpdate {
  pub plan_id: String,
  pub affected_groups_by_day: AffectedGroupsByDay,
  /// Open notifications replaced by the merged one
  pub superseded: Vec<NotificationId>,
  pub notification_count: u32,
}

/// Merge `payload` with every open notification of the same plan.
///
/// Days of old notifications are carried over only while their expiry is
/// after `now` (unix seconds). Notifications without substitution data are
/// ignored.
pub fn merge_open_notifications(
  payload: SubsUpdatePayload,
  open: &[Notification],
  now: i64,
) -> MergedUpdate {
  let SubsUpdatePayload {
    plan_id,
    mut affected_groups_by_day,
  } = payload;

  let mut superseded = Vec::new();
  let mut notification_count: u32 = 1;

  for notification in open {
    let Some(data) = notification.subs_update() else {
      continue;
    };
    if data.plan_id != plan_id {
      continue;
    }

    for (expiry, day) in &data.affected_groups_by_day {
      if !expiry.is_after(now) {
        continue;
      }
      affected_groups_by_day
        .entry(*expiry)
        .or_insert_with(|| AffectedDay::new(day.name.clone(), Vec::<String>::new()))
        .groups
        .extend(day.groups.iter().cloned());
    }

    superseded.push(notification.id);
    notification_count = notification_count.saturating_add(data.notification_count);
  }

  MergedUpdate {
    plan_id,
    affected_groups_by_day,
    superseded,
    notification_count,
  }
}

/// Title and body for the merged notification.
pub fn compose(affected: &AffectedGroupsByDay) -> (String, String) {
  let mut days = affected.values();
  if let (Some(day), None) = (days.next(), days.next()) {
    return (
      format!("{}: {}", day.name, TITLE_SUFFIX),
      day.groups_display(),
    );
  }

  let body = affected
    .values()
    .map(|day| format!("{}: {}", day.name, day.groups_display()))
    .collect::<Vec<_>>()
    .join("\n");
  (TITLE_SUFFIX.to_string(), body)
}
