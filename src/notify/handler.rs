use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use super::clients::{same_page, ClientId, Clients};
use super::merge::{compose, merge_open_notifications};
use super::payload::{PushPayload, SubsUpdatePayload};
use super::{
  NotificationCenter, NotificationData, NotificationId, NotificationOptions, SubsUpdateData,
};
use crate::analytics::{props, Analytics};
use crate::clock::Clock;
use crate::config::NotificationsConfig;

const FALLBACK_TITLE: &str = "Neue Benachrichtigung";
const ANALYTICS_EVENT: &str = "Notification";

/// What a push event displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
  /// Push without (usable) payload
  Fallback(NotificationId),
  GenericMessage(NotificationId),
  SubsUpdate {
    id: NotificationId,
    superseded: Vec<NotificationId>,
    notification_count: u32,
  },
}

/// How a notification click was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  /// Only the notification was closed
  Closed,
  Focused(ClientId),
  Opened(ClientId),
  /// Opening windows is not supported
  OpenUnsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
  pub action: ClickAction,
  /// Notifications closed because of the click, the clicked one first
  pub closed: Vec<NotificationId>,
}

/// Handles `push` and `notificationclick` events.
pub struct NotificationHandler {
  origin: Url,
  settings: NotificationsConfig,
  center: Arc<dyn NotificationCenter>,
  clients: Arc<dyn Clients>,
  clock: Arc<dyn Clock>,
  analytics: Arc<Analytics>,
  /// Serializes read-close-show so concurrent pushes leave one notification
  merge_guard: Mutex<()>,
}

impl NotificationHandler {
  pub fn new(
    origin: Url,
    settings: NotificationsConfig,
    center: Arc<dyn NotificationCenter>,
    clients: Arc<dyn Clients>,
    clock: Arc<dyn Clock>,
    analytics: Arc<Analytics>,
  ) -> Self {
    Self {
      origin,
      settings,
      center,
      clients,
      clock,
      analytics,
      merge_guard: Mutex::new(()),
    }
  }

  fn base_options(&self, body: String) -> NotificationOptions {
    NotificationOptions {
      body,
      icon: Some(self.settings.icon.clone()),
      badge: Some(self.settings.badge.clone()),
      lang: Some(self.settings.lang.clone()),
      ..Default::default()
    }
  }

  /// Handle a push event carrying `data` (if any).
  pub async fn on_push(&self, data: Option<&[u8]>) -> Result<PushOutcome> {
    let Some(data) = data else {
      let id = self.show_fallback()?;
      self
        .analytics
        .event(ANALYTICS_EVENT, Some(props("other", "Received, but without Payload")))
        .await;
      return Ok(PushOutcome::Fallback(id));
    };

    let payload = match PushPayload::parse(data) {
      Ok(payload) => payload,
      Err(e) => {
        warn!("push: {:#}", e);
        let id = self.show_fallback()?;
        self
          .analytics
          .event(ANALYTICS_EVENT, Some(props("other", "Received, but without Payload")))
          .await;
        return Ok(PushOutcome::Fallback(id));
      }
    };

    match payload {
      PushPayload::GenericMessage { title, body } => {
        let mut options = self.base_options(body);
        options.data = Some(NotificationData::GenericMessage);
        let id = self.center.show(&title, &options)?;
        info!("push: generic message {:?}", title);
        Ok(PushOutcome::GenericMessage(id))
      }
      PushPayload::SubsUpdate(update) => {
        let plan_id = update.plan_id.clone();
        let outcome = self.show_subs_update(update)?;
        self
          .analytics
          .event(ANALYTICS_EVENT, Some(props(plan_id, "Received")))
          .await;
        Ok(outcome)
      }
    }
  }

  fn show_fallback(&self) -> Result<NotificationId> {
    self
      .center
      .show(FALLBACK_TITLE, &self.base_options(String::new()))
  }

  fn show_subs_update(&self, update: SubsUpdatePayload) -> Result<PushOutcome> {
    let url = self
      .origin
      .join(&format!("/{}/?source=Notification", update.plan_id))
      .map_err(|e| eyre!("Invalid plan id '{}': {}", update.plan_id, e))?;

    let _guard = self
      .merge_guard
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let open = self.center.get_notifications()?;
    let merged = merge_open_notifications(update, &open, self.clock.unix_seconds());
    for id in &merged.superseded {
      self.center.close(*id)?;
    }

    let (title, body) = compose(&merged.affected_groups_by_day);
    let mut options = self.base_options(body);
    options.vibrate = self.settings.vibrate.clone();
    options.data = Some(NotificationData::SubsUpdate(SubsUpdateData {
      plan_id: merged.plan_id,
      url,
      affected_groups_by_day: merged.affected_groups_by_day,
      notification_count: merged.notification_count,
    }));

    let id = self.center.show(&title, &options)?;
    info!(
      "push: {:?} replaces {} notification(s)",
      title,
      merged.superseded.len()
    );

    Ok(PushOutcome::SubsUpdate {
      id,
      superseded: merged.superseded,
      notification_count: merged.notification_count,
    })
  }

  /// Handle a click on the notification with `id`.
  pub async fn on_click(&self, id: NotificationId) -> Result<ClickOutcome> {
    let open = self.center.get_notifications()?;
    let notification = open
      .iter()
      .find(|n| n.id == id)
      .cloned()
      .ok_or_else(|| eyre!("Notification {} is not open", id))?;

    self.center.close(id)?;
    let mut closed = vec![id];

    let Some(data) = notification.subs_update() else {
      return Ok(ClickOutcome {
        action: ClickAction::Closed,
        closed,
      });
    };

    // the user has seen the consolidated notification
    for other in &open {
      if other.id != id && other.plan_id() == Some(data.plan_id.as_str()) {
        self.center.close(other.id)?;
        closed.push(other.id);
      }
    }

    let action = self.focus_or_open(data)?;
    let how = match action {
      ClickAction::Focused(_) => "focus",
      _ => "open",
    };
    self
      .analytics
      .event(
        ANALYTICS_EVENT,
        Some(props(
          data.plan_id.clone(),
          format!("Clicked ({}, {})", data.notification_count, how),
        )),
      )
      .await;

    Ok(ClickOutcome { action, closed })
  }

  fn focus_or_open(&self, data: &SubsUpdateData) -> Result<ClickAction> {
    if let Some(client) = self
      .clients
      .match_all()?
      .into_iter()
      .find(|c| same_page(&c.url, &data.url))
    {
      debug!("click: focusing window {} at {}", client.id, client.url);
      let focused = self.clients.focus(client.id)?;
      return Ok(ClickAction::Focused(focused.id));
    }

    match self.clients.open_window(&data.url)? {
      Some(client) => {
        debug!("click: opened window {} at {}", client.id, client.url);
        Ok(ClickAction::Opened(client.id))
      }
      None => Ok(ClickAction::OpenUnsupported),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::FixedClock;
  use crate::config::AnalyticsConfig;
  use crate::db::Database;
  use crate::notify::clients::WindowClient;
  use crate::notify::{Expiry, Notification, SqliteNotificationCenter, WindowList};
  use crate::testing::StubNetwork;
  use std::sync::Condvar;
  use std::time::Duration;

  const NOW: i64 = 1_699_990_000;
  const STATS: &str = "https://stats.example/api/event";

  /// Tray that holds each reader of the open notifications until a second
  /// reader shows up or the wait times out.
  struct GatedCenter {
    inner: SqliteNotificationCenter,
    readers: Mutex<usize>,
    arrived: Condvar,
  }

  impl GatedCenter {
    fn new() -> Self {
      Self {
        inner: SqliteNotificationCenter::new(Arc::new(Database::open_in_memory().unwrap())),
        readers: Mutex::new(0),
        arrived: Condvar::new(),
      }
    }
  }

  impl NotificationCenter for GatedCenter {
    fn show(&self, title: &str, options: &NotificationOptions) -> Result<NotificationId> {
      self.inner.show(title, options)
    }

    fn get_notifications(&self) -> Result<Vec<Notification>> {
      let open = self.inner.get_notifications()?;
      let mut readers = self.readers.lock().unwrap();
      *readers += 1;
      self.arrived.notify_all();
      let _ = self
        .arrived
        .wait_timeout_while(readers, Duration::from_millis(300), |n| *n < 2)
        .unwrap();
      Ok(open)
    }

    fn close(&self, id: NotificationId) -> Result<bool> {
      self.inner.close(id)
    }
  }

  /// A window that matches every plan but cannot be focused.
  struct UnfocusableWindow;

  impl Clients for UnfocusableWindow {
    fn match_all(&self) -> Result<Vec<WindowClient>> {
      Ok(vec![WindowClient {
        id: 1,
        url: Url::parse("https://plan.example/students/").unwrap(),
        focused: false,
      }])
    }

    fn focus(&self, id: ClientId) -> Result<WindowClient> {
      Err(eyre!("Window {} is gone", id))
    }

    fn open_window(&self, _url: &Url) -> Result<Option<WindowClient>> {
      Ok(None)
    }
  }

  struct Fixture {
    handler: NotificationHandler,
    center: Arc<SqliteNotificationCenter>,
    clients: Arc<WindowList>,
    network: Arc<StubNetwork>,
  }

  fn stats_network() -> Arc<StubNetwork> {
    let network = Arc::new(StubNetwork::new());
    network.route(STATS, 202, "ok");
    network
  }

  fn handler_with(
    center: Arc<dyn NotificationCenter>,
    clients: Arc<dyn Clients>,
    network: Arc<StubNetwork>,
  ) -> NotificationHandler {
    let analytics = Analytics::new(
      &AnalyticsConfig {
        domain: Some("plan.example".to_string()),
        endpoint: STATS.to_string(),
      },
      Url::parse("https://plan.example/sw.js").unwrap(),
      network,
    )
    .unwrap();
    NotificationHandler::new(
      Url::parse("https://plan.example").unwrap(),
      NotificationsConfig::default(),
      center,
      clients,
      Arc::new(FixedClock::at_unix(NOW)),
      Arc::new(analytics),
    )
  }

  fn fixture(windows: &[&str]) -> Fixture {
    let network = stats_network();
    let center = Arc::new(SqliteNotificationCenter::new(Arc::new(
      Database::open_in_memory().unwrap(),
    )));
    let clients = Arc::new(WindowList::with_windows(
      windows.iter().map(|w| Url::parse(w).unwrap()),
    ));
    let handler = handler_with(center.clone(), clients.clone(), network.clone());
    Fixture {
      handler,
      center,
      clients,
      network,
    }
  }

  fn subs_push(plan_id: &str, expiry: i64, name: &str, groups: &[&str]) -> Vec<u8> {
    serde_json::json!({
      "plan_id": plan_id,
      "affected_groups_by_day": {
        expiry.to_string(): {"name": name, "groups": groups}
      }
    })
    .to_string()
    .into_bytes()
  }

  #[tokio::test]
  async fn test_montag_pushes_merge_into_one_notification() {
    let f = fixture(&[]);
    f.handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A", "10B"])))
      .await
      .unwrap();
    let outcome = f
      .handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10C"])))
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      PushOutcome::SubsUpdate { notification_count: 2, ref superseded, .. } if superseded.len() == 1
    ));

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Montag: Neue Vertretungen");
    assert_eq!(visible[0].options.body, "10A, 10B, 10C");

    let data = visible[0].subs_update().unwrap();
    assert_eq!(
      data.url.as_str(),
      "https://plan.example/students/?source=Notification"
    );
    assert_eq!(visible[0].options.vibrate, vec![300, 100, 400]);
    assert_eq!(visible[0].options.lang.as_deref(), Some("de"));
  }

  #[tokio::test]
  async fn test_union_over_non_overlapping_days() {
    let f = fixture(&[]);
    let days = [
      (1_700_000_000, "Montag", vec!["5A", "5B"]),
      (1_700_086_400, "Dienstag", vec!["6A"]),
      (1_700_172_800, "Mittwoch", vec!["7A", "5A"]),
    ];
    for (expiry, name, groups) in &days {
      f.handler
        .on_push(Some(&subs_push("students", *expiry, name, groups)))
        .await
        .unwrap();
    }

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Neue Vertretungen");
    assert_eq!(
      visible[0].options.body,
      "Montag: 5A, 5B\nDienstag: 6A\nMittwoch: 5A, 7A"
    );
    assert_eq!(visible[0].subs_update().unwrap().notification_count, 3);
  }

  #[tokio::test]
  async fn test_expired_day_is_not_carried_over() {
    let f = fixture(&[]);
    f.handler
      .on_push(Some(&subs_push("students", NOW - 60, "Freitag", &["9A"])))
      .await
      .unwrap();
    f.handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap();

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 1);
    let data = visible[0].subs_update().unwrap();
    assert_eq!(data.affected_groups_by_day.len(), 1);
    assert!(data.affected_groups_by_day.contains_key(&Expiry(1_700_000_000)));
    assert_eq!(visible[0].title, "Montag: Neue Vertretungen");
  }

  #[tokio::test]
  async fn test_plans_are_kept_apart() {
    let f = fixture(&[]);
    f.handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap();
    f.handler
      .on_push(Some(&subs_push("teachers", 1_700_000_000, "Montag", &["ABC"])))
      .await
      .unwrap();
    assert_eq!(f.center.get_notifications().unwrap().len(), 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_concurrent_pushes_leave_one_notification() {
    let center = Arc::new(GatedCenter::new());
    let handler = Arc::new(handler_with(
      center.clone(),
      Arc::new(WindowList::new()),
      stats_network(),
    ));

    let tasks: Vec<_> = ["10A", "10B"]
      .into_iter()
      .map(|group| {
        let handler = handler.clone();
        let data = subs_push("students", 1_700_000_000, "Montag", &[group]);
        tokio::spawn(async move { handler.on_push(Some(&data)).await })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    let visible = center.inner.get_notifications().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].options.body, "10A, 10B");
    assert_eq!(visible[0].subs_update().unwrap().notification_count, 2);
  }

  #[tokio::test]
  async fn test_generic_message_bypasses_merging() {
    let f = fixture(&[]);
    f.handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap();
    let outcome = f
      .handler
      .on_push(Some(br#"{"type":"generic_message","title":"Schulfrei","body":"Morgen"}"#))
      .await
      .unwrap();
    assert!(matches!(outcome, PushOutcome::GenericMessage(_)));

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[1].title, "Schulfrei");
    assert_eq!(visible[1].options.body, "Morgen");
    assert_eq!(visible[1].options.data, Some(NotificationData::GenericMessage));
  }

  #[tokio::test]
  async fn test_empty_and_malformed_pushes_show_fallback() {
    let f = fixture(&[]);
    let empty = f.handler.on_push(None).await.unwrap();
    let malformed = f.handler.on_push(Some(b"{\"plan_id\": 4")).await.unwrap();
    assert!(matches!(empty, PushOutcome::Fallback(_)));
    assert!(matches!(malformed, PushOutcome::Fallback(_)));

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|n| n.title == "Neue Benachrichtigung"));
    assert!(visible.iter().all(|n| n.options.data.is_none()));
    assert_eq!(f.network.bodies("https://stats.example/api/event").len(), 2);
  }

  #[tokio::test]
  async fn test_click_focuses_open_window_and_closes_plan_notifications() {
    let f = fixture(&[
      "https://plan.example/teachers/",
      "https://plan.example/students/?all",
    ]);
    let PushOutcome::SubsUpdate { id, .. } = f
      .handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap()
    else {
      panic!("expected a substitution update");
    };
    // a stale duplicate shown by another worker instance
    let stale = f
      .center
      .show(
        "old",
        &f.center.get_notifications().unwrap()[0].options.clone(),
      )
      .unwrap();
    f.handler
      .on_push(Some(&subs_push("teachers", 1_700_000_000, "Montag", &["ABC"])))
      .await
      .unwrap();

    let outcome = f.handler.on_click(id).await.unwrap();
    assert_eq!(outcome.action, ClickAction::Focused(2));
    assert_eq!(outcome.closed, vec![id, stale]);

    let visible = f.center.get_notifications().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].plan_id(), Some("teachers"));
    assert!(f.clients.windows()[1].focused);
  }

  #[tokio::test]
  async fn test_click_opens_window_when_none_matches() {
    let f = fixture(&["https://plan.example/teachers/"]);
    let PushOutcome::SubsUpdate { id, .. } = f
      .handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap()
    else {
      panic!("expected a substitution update");
    };

    let outcome = f.handler.on_click(id).await.unwrap();
    assert_eq!(outcome.action, ClickAction::Opened(2));
    let windows = f.clients.windows();
    assert_eq!(
      windows[1].url.as_str(),
      "https://plan.example/students/?source=Notification"
    );
  }

  #[tokio::test]
  async fn test_click_on_generic_message_only_closes_it() {
    let f = fixture(&[]);
    let PushOutcome::GenericMessage(id) = f
      .handler
      .on_push(Some(br#"{"type":"generic_message","title":"Hallo"}"#))
      .await
      .unwrap()
    else {
      panic!("expected a generic message");
    };

    let outcome = f.handler.on_click(id).await.unwrap();
    assert_eq!(outcome.action, ClickAction::Closed);
    assert_eq!(outcome.closed, vec![id]);
    assert!(f.center.get_notifications().unwrap().is_empty());
    assert!(f.clients.windows().is_empty());
  }

  #[tokio::test]
  async fn test_failed_focus_still_closes_plan_notifications() {
    let center = Arc::new(SqliteNotificationCenter::new(Arc::new(
      Database::open_in_memory().unwrap(),
    )));
    let handler = handler_with(center.clone(), Arc::new(UnfocusableWindow), stats_network());
    let PushOutcome::SubsUpdate { id, .. } = handler
      .on_push(Some(&subs_push("students", 1_700_000_000, "Montag", &["10A"])))
      .await
      .unwrap()
    else {
      panic!("expected a substitution update");
    };
    let options = center.get_notifications().unwrap()[0].options.clone();
    center.show("old", &options).unwrap();

    assert!(handler.on_click(id).await.is_err());
    assert!(center.get_notifications().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_click_on_unknown_notification_fails() {
    let f = fixture(&[]);
    assert!(f.handler.on_click(42).await.is_err());
  }
}
