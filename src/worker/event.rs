use color_eyre::{eyre::eyre, Report, Result};
use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinSet;
use tracing::error;

/// Keeps the worker alive until background work registered by a handler
/// has finished.
#[derive(Default)]
pub struct ExtendableEvent {
  pending: Mutex<JoinSet<Result<()>>>,
}

impl ExtendableEvent {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `future` in the background; `settle` waits for it.
  ///
  /// Must be called from within a tokio runtime.
  pub fn wait_until<F>(&self, future: F)
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    match self.pending.lock() {
      Ok(mut pending) => {
        pending.spawn(future);
      }
      Err(e) => error!("wait_until: lock poisoned: {}", e),
    }
  }

  /// Number of registered futures that have not been collected yet.
  pub fn pending(&self) -> usize {
    self.pending.lock().map(|p| p.len()).unwrap_or(0)
  }

  /// Wait for all registered futures and return their errors.
  pub async fn settle(&self) -> Vec<Report> {
    let mut pending = match self.pending.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(e) => return vec![eyre!("wait_until: lock poisoned: {}", e)],
    };

    let mut errors = Vec::new();
    while let Some(joined) = pending.join_next().await {
      match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => errors.push(e),
        Err(e) => errors.push(eyre!("Background task failed: {}", e)),
      }
    }
    errors
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_settle_waits_for_all_futures() {
    let event = ExtendableEvent::new();
    let counter = Arc::new(AtomicU32::new(0));

    for delay in [20, 5, 10] {
      let counter = counter.clone();
      event.wait_until(async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
      });
    }
    assert_eq!(event.pending(), 3);

    assert!(event.settle().await.is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(event.pending(), 0);
  }

  #[tokio::test]
  async fn test_settle_collects_errors() {
    let event = ExtendableEvent::new();
    event.wait_until(async { Ok(()) });
    event.wait_until(async { Err(eyre!("cache write failed")) });

    let errors = event.settle().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "cache write failed");
  }
}
