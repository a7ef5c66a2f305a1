//! Worker lifecycle and event dispatch.

mod event;
mod lifecycle;

use color_eyre::{eyre::eyre, Report, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

pub use event::ExtendableEvent;
pub use lifecycle::{LifecycleStore, WorkerState};

use crate::analytics::Analytics;
use crate::cache::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheManager};
use crate::http::Request;
use crate::notify::{ClickOutcome, NotificationHandler, NotificationId, PushOutcome};

/// Events delivered to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Push message with its raw data, if any
  Push(Option<Vec<u8>>),
  NotificationClick(NotificationId),
}

impl WorkerEvent {
  pub fn name(&self) -> &'static str {
    match self {
      WorkerEvent::Install => "install",
      WorkerEvent::Activate => "activate",
      WorkerEvent::Fetch(_) => "fetch",
      WorkerEvent::Push(_) => "push",
      WorkerEvent::NotificationClick(_) => "notificationclick",
    }
  }
}

/// Result of a handled event.
#[derive(Debug, Clone)]
pub enum EventResult {
  Installed(InstallReport),
  /// The event left the worker in this state without doing anything
  Unchanged(WorkerState),
  Activated(ActivateReport),
  Fetch(FetchOutcome),
  Push(PushOutcome),
  Click(ClickOutcome),
}

/// One version of the worker, identified by its cache name.
pub struct ServiceWorker {
  version: String,
  cache: OfflineCacheManager,
  notifications: NotificationHandler,
  analytics: Arc<Analytics>,
  lifecycle: Arc<dyn LifecycleStore>,
}

impl ServiceWorker {
  pub fn new(
    cache: OfflineCacheManager,
    notifications: NotificationHandler,
    analytics: Arc<Analytics>,
    lifecycle: Arc<dyn LifecycleStore>,
  ) -> Self {
    Self {
      version: cache.cache_name().to_string(),
      cache,
      notifications,
      analytics,
      lifecycle,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn state(&self) -> Result<WorkerState> {
    self.lifecycle.load(&self.version)
  }

  /// Handle `event` and wait for the background work it registered.
  ///
  /// Errors are reported before they are returned. A rejected fetch is
  /// answered by the network error of the page and is only logged.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventResult> {
    let hold = ExtendableEvent::new();
    let name = event.name();
    let is_fetch = matches!(event, WorkerEvent::Fetch(_));

    let result = self.handle(event, &hold).await;
    match &result {
      Err(e) if is_fetch => debug!("fetch rejected: {:#}", e),
      Err(e) => self.report("error", name, e).await,
      Ok(_) => {}
    }
    self.finish(&hold).await;

    result
  }

  /// Run the handler for `event` without waiting for `hold`.
  pub async fn handle(&self, event: WorkerEvent, hold: &ExtendableEvent) -> Result<EventResult> {
    match event {
      WorkerEvent::Install => self.install().await,
      WorkerEvent::Activate => self.activate().map(EventResult::Activated),
      WorkerEvent::Fetch(request) => self.fetch(&request, hold).await.map(EventResult::Fetch),
      WorkerEvent::Push(data) => self
        .notifications
        .on_push(data.as_deref())
        .await
        .map(EventResult::Push),
      WorkerEvent::NotificationClick(id) => self
        .notifications
        .on_click(id)
        .await
        .map(EventResult::Click),
    }
  }

  /// Wait for the work held by an event, reporting its failures.
  pub async fn finish(&self, hold: &ExtendableEvent) {
    for e in hold.settle().await {
      self.report("unhandledrejection", "wait_until", &e).await;
    }
  }

  async fn report(&self, source: &str, event: &str, err: &Report) {
    error!("{} ({}): {:#}", source, event, err);
    self.analytics.report_error(source, err).await;
  }

  async fn install(&self) -> Result<EventResult> {
    let state = self.state()?;
    if !state.can_install() {
      info!("worker {}: already {}, install skipped", self.version, state);
      return Ok(EventResult::Unchanged(state));
    }

    self.transition(WorkerState::Installing)?;

    match self.cache.install().await {
      Ok(report) => {
        self.transition(WorkerState::Installed)?;
        Ok(EventResult::Installed(report))
      }
      Err(e) => {
        self.transition(WorkerState::Redundant)?;
        Err(e)
      }
    }
  }

  fn activate(&self) -> Result<ActivateReport> {
    let state = self.state()?;
    if !state.can_activate() {
      return Err(eyre!(
        "Cannot activate worker {} while {}, run install first",
        self.version,
        state
      ));
    }

    self.transition(WorkerState::Activating)?;
    let report = match self.cache.activate() {
      Ok(report) => report,
      Err(e) => {
        self.transition(state)?;
        return Err(e);
      }
    };
    self.transition(WorkerState::Activated)?;

    let retired = self.lifecycle.retire_others(&self.version)?;
    if retired > 0 {
      info!("worker {}: retired {} older version(s)", self.version, retired);
    }

    Ok(report)
  }

  async fn fetch(&self, request: &Request, hold: &ExtendableEvent) -> Result<FetchOutcome> {
    let state = self.state()?;
    if !state.can_intercept_fetch() {
      debug!("fetch: worker {} is {}, not intercepting {}", self.version, state, request.url);
      return Ok(FetchOutcome::PassThrough);
    }

    self.cache.fetch(request, hold).await
  }

  fn transition(&self, state: WorkerState) -> Result<()> {
    self.lifecycle.store(&self.version, state)?;
    info!("worker {}: {}", self.version, state);
    Ok(())
  }
}
