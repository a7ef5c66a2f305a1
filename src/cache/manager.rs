//! Cache manager that decides between cache and network per request.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::manifest::{CacheManifest, PathClass};
use super::storage::{base_url, CacheStorage};
use super::traits::FetchResult;
use crate::http::{Network, Request, Response};
use crate::worker::ExtendableEvent;

/// Query appended to plan prefetches so the server returns the full,
/// non-redirected plan.
const PREFETCH_QUERY: &str = "all&sw";

/// What the worker does with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Not intercepted, default network handling applies
  PassThrough,
  /// The worker answers the request
  Respond(FetchResult),
}

/// Plan paths cached and skipped during install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub skipped: Vec<String>,
}

/// Entries and caches removed during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub evicted_entries: Vec<Url>,
  pub evicted_caches: Vec<String>,
}

/// Offline cache for one worker version.
///
/// The manager sits between the page and the network, keeping a named cache
/// consistent with the manifest it was built with.
pub struct OfflineCacheManager {
  cache_name: String,
  origin: Url,
  manifest: CacheManifest,
  storage: Arc<dyn CacheStorage>,
  network: Arc<dyn Network>,
}

impl OfflineCacheManager {
  pub fn new(
    cache_name: impl Into<String>,
    origin: Url,
    manifest: CacheManifest,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      cache_name: cache_name.into(),
      origin,
      manifest,
      storage,
      network,
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}' for origin {}: {}", path, self.origin, e))
  }

  /// Prefetch every plan path and store it under its bare pathname.
  ///
  /// A failed prefetch only leaves that path uncached.
  pub async fn install(&self) -> Result<InstallReport> {
    let targets = self
      .manifest
      .plan_paths
      .iter()
      .map(|path| Ok((path.clone(), self.resolve(path)?)))
      .collect::<Result<Vec<_>>>()?;

    let results = join_all(
      targets
        .into_iter()
        .map(|(path, key)| async move { (self.prefetch(&key).await, path) }),
    )
    .await;

    let mut report = InstallReport::default();
    for (result, path) in results {
      match result {
        Ok(()) => report.cached.push(path),
        Err(e) => {
          warn!("install: skipping {}: {:#}", path, e);
          report.skipped.push(path);
        }
      }
    }

    info!(
      "install: cached {} plan(s), skipped {}",
      report.cached.len(),
      report.skipped.len()
    );
    Ok(report)
  }

  async fn prefetch(&self, key: &Url) -> Result<()> {
    let mut url = key.clone();
    url.set_query(Some(PREFETCH_QUERY));

    let response = self.network.fetch(Request::get(url)).await?;
    if response.redirected {
      return Err(eyre!("prefetch was redirected to {}", response.url));
    }
    if !response.is_success() {
      return Err(eyre!("prefetch returned status {}", response.status));
    }

    self.storage.put(&self.cache_name, key, &response)
  }

  /// Delete entries outside the manifest and caches of other versions.
  pub fn activate(&self) -> Result<ActivateReport> {
    let mut report = ActivateReport::default();

    for key in self.storage.keys(&self.cache_name)? {
      if !self.manifest.contains(key.path()) {
        debug!("cache: delete old {}", key);
        self.storage.delete(&self.cache_name, &key)?;
        report.evicted_entries.push(key);
      }
    }

    for name in self.storage.cache_names()? {
      if name != self.cache_name {
        let removed = self.storage.delete_cache(&name)?;
        debug!("cache: delete old cache {} ({} entries)", name, removed);
        report.evicted_caches.push(name);
      }
    }

    Ok(report)
  }

  /// Handle an intercepted request.
  ///
  /// Cache writes are registered on `event` and do not delay the response.
  /// An `Err` is a rejected fetch.
  pub async fn fetch(&self, request: &Request, event: &ExtendableEvent) -> Result<FetchOutcome> {
    if request.method != Method::GET || request.url.origin() != self.origin.origin() {
      return Ok(FetchOutcome::PassThrough);
    }

    match self.manifest.classify(request.path()) {
      PathClass::Root => self.redirect_root(request),
      PathClass::Plan => self.network_then_cache(request, event).await,
      PathClass::Asset => self.cache_then_network(request, event).await,
      PathClass::Other => Ok(FetchOutcome::PassThrough),
    }
  }

  fn redirect_root(&self, request: &Request) -> Result<FetchOutcome> {
    match &self.manifest.default_plan_path {
      Some(path) => {
        let location = self.resolve(path)?;
        Ok(FetchOutcome::Respond(FetchResult::redirect(Response::redirect(
          request.url.clone(),
          &location,
        ))))
      }
      None => Ok(FetchOutcome::PassThrough),
    }
  }

  /// Plans must be up to date: the network wins, the cache is the fallback.
  async fn network_then_cache(
    &self,
    request: &Request,
    event: &ExtendableEvent,
  ) -> Result<FetchOutcome> {
    match self.network.fetch(request.clone()).await {
      Ok(response) => {
        if response.is_success() {
          // save this version of the plan under its bare pathname
          let storage = Arc::clone(&self.storage);
          let cache = self.cache_name.clone();
          let key = base_url(&request.url);
          let stored = response.clone();
          event.wait_until(async move { storage.put(&cache, &key, &stored) });
        }
        Ok(FetchOutcome::Respond(FetchResult::from_network(response)))
      }
      Err(e) => {
        warn!("fetch: network failed for {}, trying cache: {:#}", request.url, e);
        self.offline_fallback(request, e)
      }
    }
  }

  /// Assets are served from the cache when the exact URL (including the
  /// cache-busting query) is present.
  async fn cache_then_network(
    &self,
    request: &Request,
    event: &ExtendableEvent,
  ) -> Result<FetchOutcome> {
    if let Some(cached) = self.storage.match_exact(&self.cache_name, &request.url)? {
      debug!("fetch: cache hit for {}", request.url);
      return Ok(FetchOutcome::Respond(FetchResult::from_cache(cached)));
    }

    debug!("fetch: cache miss for {}", request.url);
    match self.network.fetch(request.clone()).await {
      Ok(response) => {
        if response.is_success() {
          let storage = Arc::clone(&self.storage);
          let cache = self.cache_name.clone();
          let key = request.url.clone();
          let stored = response.clone();
          event.wait_until(async move {
            // entries with another cache-busting query are outdated
            let removed = storage.delete_ignore_search(&cache, &key)?;
            debug!("cache: deleted {} outdated entries for {}", removed, key.path());
            storage.put(&cache, &key, &stored)
          });
        }
        Ok(FetchOutcome::Respond(FetchResult::from_network(response)))
      }
      Err(e) => {
        warn!("fetch: network failed for {}, using outdated cache: {:#}", request.url, e);
        self.offline_fallback(request, e)
      }
    }
  }

  fn offline_fallback(&self, request: &Request, error: color_eyre::Report) -> Result<FetchOutcome> {
    match self
      .storage
      .match_ignore_search(&self.cache_name, &request.url)?
    {
      Some(cached) => Ok(FetchOutcome::Respond(FetchResult::fallback(cached))),
      None => Err(eyre!(
        "No cached response for {} after network failure: {}",
        request.path(),
        error
      )),
    }
  }
}
