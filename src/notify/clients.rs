use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;
use url::Url;

pub type ClientId = u64;

/// A page window controlled by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: ClientId,
  pub url: Url,
  pub focused: bool,
}

/// Port to the page windows of the app.
pub trait Clients: Send + Sync {
  fn match_all(&self) -> Result<Vec<WindowClient>>;

  fn focus(&self, id: ClientId) -> Result<WindowClient>;

  /// Open a new window, `None` if opening windows is not supported.
  fn open_window(&self, url: &Url) -> Result<Option<WindowClient>>;
}

/// Whether two URLs point at the same page (origin + pathname).
pub fn same_page(a: &Url, b: &Url) -> bool {
  a.origin() == b.origin() && a.path() == b.path()
}

/// In-process list of windows.
pub struct WindowList {
  windows: Mutex<Vec<WindowClient>>,
  can_open: bool,
}

impl WindowList {
  pub fn new() -> Self {
    Self::with_windows(Vec::new())
  }

  pub fn with_windows(urls: impl IntoIterator<Item = Url>) -> Self {
    let windows = urls
      .into_iter()
      .enumerate()
      .map(|(i, url)| WindowClient {
        id: i as ClientId + 1,
        url,
        focused: false,
      })
      .collect();

    Self {
      windows: Mutex::new(windows),
      can_open: true,
    }
  }

  /// Disallow opening new windows.
  #[cfg(test)]
  pub fn without_open_window(mut self) -> Self {
    self.can_open = false;
    self
  }

  #[cfg(test)]
  pub fn windows(&self) -> Vec<WindowClient> {
    self.windows.lock().map(|w| w.clone()).unwrap_or_default()
  }
}

impl Default for WindowList {
  fn default() -> Self {
    Self::new()
  }
}

impl Clients for WindowList {
  fn match_all(&self) -> Result<Vec<WindowClient>> {
    let windows = self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(windows.clone())
  }

  fn focus(&self, id: ClientId) -> Result<WindowClient> {
    let mut windows = self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !windows.iter().any(|w| w.id == id) {
      return Err(eyre!("No window with id {}", id));
    }
    for window in windows.iter_mut() {
      window.focused = window.id == id;
    }

    windows
      .iter()
      .find(|w| w.id == id)
      .cloned()
      .ok_or_else(|| eyre!("No window with id {}", id))
  }

  fn open_window(&self, url: &Url) -> Result<Option<WindowClient>> {
    if !self.can_open {
      return Ok(None);
    }

    let mut windows = self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    for window in windows.iter_mut() {
      window.focused = false;
    }
    let window = WindowClient {
      id: windows.iter().map(|w| w.id).max().unwrap_or(0) + 1,
      url: url.clone(),
      focused: true,
    };
    windows.push(window.clone());

    Ok(Some(window))
  }
}
