use crate::analytics::Analytics;
use crate::cache::{CacheStorage, FetchOutcome, OfflineCacheManager, SqliteStorage};
use crate::clock::SystemClock;
use crate::commands::{self, Command};
use crate::config::Config;
use crate::db::Database;
use crate::http::{Network, OfflineNetwork, Request, ReqwestNetwork};
use crate::notify::{
  ClickAction, NotificationCenter, NotificationHandler, PushOutcome, SqliteNotificationCenter,
  WindowList,
};
use crate::worker::{EventResult, ServiceWorker, WorkerEvent};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Cache storage shared with the worker, for inspection
  storage: Arc<dyn CacheStorage>,

  /// Notification tray shared with the worker, for inspection
  center: Arc<dyn NotificationCenter>,

  worker: ServiceWorker,
}

impl App {
  /// Wire up the worker for running `command`.
  pub fn new(config: Config, command: &Command) -> Result<Self> {
    let db_path = config.database_path();
    let db = Arc::new(Database::open(db_path.as_deref())?);

    let network: Arc<dyn Network> = if command.offline() {
      Arc::new(OfflineNetwork)
    } else {
      Arc::new(ReqwestNetwork::new()?)
    };
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(db.clone()));
    let center: Arc<dyn NotificationCenter> = Arc::new(SqliteNotificationCenter::new(db.clone()));
    let clients = Arc::new(WindowList::with_windows(command.client_urls(&config.origin)?));

    let analytics = Arc::new(Analytics::new(
      &config.analytics,
      config.script_url()?,
      network.clone(),
    )?);
    if !analytics.is_enabled() {
      debug!("analytics: no domain configured, reporting disabled");
    }

    let cache = OfflineCacheManager::new(
      config.cache.name.clone(),
      config.origin.clone(),
      config.manifest(),
      storage.clone(),
      network,
    );
    let notifications = NotificationHandler::new(
      config.origin.clone(),
      config.notifications.clone(),
      center.clone(),
      clients,
      Arc::new(SystemClock),
      analytics.clone(),
    );
    let worker = ServiceWorker::new(cache, notifications, analytics, db);

    Ok(Self {
      config,
      storage,
      center,
      worker,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    info!("worker {} is {}", self.worker.version(), self.worker.state()?);

    match command {
      Command::Install => match self.worker.dispatch(WorkerEvent::Install).await? {
        EventResult::Installed(report) => {
          for path in &report.cached {
            println!("cached   {}", path);
          }
          for path in &report.skipped {
            println!("skipped  {}", path);
          }
        }
        EventResult::Unchanged(state) => {
          println!("worker {} is {}, nothing to install", self.worker.version(), state)
        }
        _ => {}
      },
      Command::Activate => {
        if let EventResult::Activated(report) = self.worker.dispatch(WorkerEvent::Activate).await? {
          for url in &report.evicted_entries {
            println!("evicted  {}", url);
          }
          for name in &report.evicted_caches {
            println!("deleted  cache {}", name);
          }
          println!("worker {} activated", self.worker.version());
        }
      }
      Command::Fetch { target, output, .. } => self.fetch(&target, output).await?,
      Command::Push { data, file } => {
        let data = commands::read_push_data(data, file)?;
        if let EventResult::Push(outcome) = self.worker.dispatch(WorkerEvent::Push(data)).await? {
          match outcome {
            PushOutcome::SubsUpdate {
              id,
              superseded,
              notification_count,
            } => println!(
              "notification {} (merges {} push(es), replaces {:?})",
              id, notification_count, superseded
            ),
            PushOutcome::GenericMessage(id) | PushOutcome::Fallback(id) => {
              println!("notification {}", id)
            }
          }
        }
      }
      Command::Click { id, .. } => {
        if let EventResult::Click(outcome) =
          self.worker.dispatch(WorkerEvent::NotificationClick(id)).await?
        {
          match outcome.action {
            ClickAction::Focused(client) => println!("focused window {}", client),
            ClickAction::Opened(client) => println!("opened window {}", client),
            ClickAction::OpenUnsupported => println!("cannot open a window"),
            ClickAction::Closed => {}
          }
          println!("closed {:?}", outcome.closed);
        }
      }
      Command::Notifications => self.list_notifications()?,
      Command::Cache => self.list_cache()?,
    }

    Ok(())
  }

  async fn fetch(&self, target: &str, output: Option<std::path::PathBuf>) -> Result<()> {
    let url = commands::resolve(&self.config.origin, target)?;
    let request = Request::get(url.clone());

    let EventResult::Fetch(outcome) = self.worker.dispatch(WorkerEvent::Fetch(request)).await? else {
      return Err(eyre!("Unexpected result for fetch of {}", url));
    };

    let result = match outcome {
      FetchOutcome::Respond(result) => result,
      FetchOutcome::PassThrough => {
        println!("{} is not intercepted by worker {}", url, self.worker.version());
        return Ok(());
      }
    };

    let response = &result.response;
    match result.cached_at {
      Some(at) => eprintln!("{} {} (cached {})", response.status, result.source, at),
      None => eprintln!("{} {}", response.status, result.source),
    }
    if let Some(location) = response.header("location") {
      eprintln!("Location: {}", location);
    }

    match output {
      Some(path) => std::fs::write(&path, &response.body)
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
      None => println!("{}", response.text()),
    }

    Ok(())
  }

  fn list_notifications(&self) -> Result<()> {
    for notification in self.center.get_notifications()? {
      let plan = notification.plan_id().unwrap_or("-");
      println!(
        "{:>4}  {}  [{}]  {}",
        notification.id,
        notification.shown_at.format("%Y-%m-%d %H:%M:%S"),
        plan,
        notification.title
      );
      for line in notification.options.body.lines() {
        println!("      {}", line);
      }
    }
    Ok(())
  }

  fn list_cache(&self) -> Result<()> {
    for name in self.storage.cache_names()? {
      let current = if name == self.worker.version() { " (current)" } else { "" };
      println!("{}{}", name, current);

      for key in self.storage.keys(&name)? {
        match self.storage.match_exact(&name, &key)? {
          Some(entry) => println!(
            "  {}  {}  {}",
            entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
            entry.response.status,
            key
          ),
          None => println!("  {}", key),
        }
      }
    }
    Ok(())
  }
}
