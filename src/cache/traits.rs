//! Core types shared by the cache storage and the cache manager.

use chrono::{DateTime, Utc};
use url::Url;

use crate::http::Response;

/// A response stored in a named cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The request URL the entry is keyed by
  pub url: Url,
  /// The stored response
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Result of an intercepted fetch, including where the response came from.
#[derive(Debug, Clone)]
pub struct FetchResult {
  /// The response handed to the page
  pub response: Response,
  /// Where the response came from
  pub source: CacheSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResult {
  /// Fresh response from the network.
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Up-to-date response served straight from the cache.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: CacheSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// Possibly outdated response served because the network failed.
  pub fn fallback(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: CacheSource::CacheFallback,
      cached_at: Some(cached.cached_at),
    }
  }

  /// Redirect synthesized by the worker.
  pub fn redirect(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Redirect,
      cached_at: None,
    }
  }
}

/// Indicates where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache entry matching the exact request URL
  Cache,
  /// Network unavailable, serving the latest cache entry for the pathname
  CacheFallback,
  /// Redirect generated by the worker
  Redirect,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheSource::Network => write!(f, "network"),
      CacheSource::Cache => write!(f, "cache"),
      CacheSource::CacheFallback => write!(f, "cache (offline fallback)"),
      CacheSource::Redirect => write!(f, "redirect"),
    }
  }
}
