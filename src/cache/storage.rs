//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use url::Url;

use super::traits::CachedResponse;
use crate::db::{parse_datetime, Database};
use crate::http::Response;

/// Trait for named response caches.
///
/// Every method is a single atomic operation on one cache; callers combining
/// several of them accept that concurrent fetches may interleave.
pub trait CacheStorage: Send + Sync {
  /// Store `response` under `url`, replacing an entry with the same URL.
  fn put(&self, cache: &str, url: &Url, response: &Response) -> Result<()>;

  /// Entry whose URL matches exactly, query string included.
  fn match_exact(&self, cache: &str, url: &Url) -> Result<Option<CachedResponse>>;

  /// Most recently stored entry with the same URL ignoring the query string.
  fn match_ignore_search(&self, cache: &str, url: &Url) -> Result<Option<CachedResponse>>;

  /// Delete the entry with exactly this URL.
  fn delete(&self, cache: &str, url: &Url) -> Result<bool>;

  /// Delete every entry with the same URL ignoring the query string.
  fn delete_ignore_search(&self, cache: &str, url: &Url) -> Result<usize>;

  /// All request URLs stored in a cache.
  fn keys(&self, cache: &str) -> Result<Vec<Url>>;

  /// Names of all caches that hold at least one entry.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Drop a whole cache, returning the number of removed entries.
  fn delete_cache(&self, cache: &str) -> Result<usize>;
}

/// `url` without query string and fragment.
pub fn base_url(url: &Url) -> Url {
  let mut base = url.clone();
  base.set_query(None);
  base.set_fragment(None);
  base
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

const SELECT_ENTRY: &str = "SELECT url, status, response_url, redirected, headers, body, cached_at
   FROM cache_entries";

/// url, status, response_url, redirected, headers, body, cached_at
type EntryRow = (String, u16, String, bool, String, Vec<u8>, String);

fn read_entry(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
  ))
}

fn into_cached(
  (url, status, response_url, redirected, headers, body, cached_at): EntryRow,
) -> Result<CachedResponse> {
  let url = Url::parse(&url).map_err(|e| eyre!("Invalid cached url '{}': {}", url, e))?;
  let response_url = Url::parse(&response_url)
    .map_err(|e| eyre!("Invalid cached response url '{}': {}", response_url, e))?;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers for {}: {}", url, e))?;

  Ok(CachedResponse {
    response: Response {
      status,
      url: response_url,
      redirected,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
    url,
  })
}

impl CacheStorage for SqliteStorage {
  fn put(&self, cache: &str, url: &Url, response: &Response) -> Result<()> {
    let conn = self.db.conn()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    // REPLACE assigns a fresh seq, which keeps "most recent" ordering right
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (cache_name, url, base_url, status, response_url, redirected, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          cache,
          url.as_str(),
          base_url(url).as_str(),
          response.status,
          response.url.as_str(),
          response.redirected,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", url, e))?;

    Ok(())
  }

  fn match_exact(&self, cache: &str, url: &Url) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare(&format!("{} WHERE cache_name = ? AND url = ?", SELECT_ENTRY))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row = stmt
      .query_row(params![cache, url.as_str()], read_entry)
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry {}: {}", url, e))?;

    row.map(into_cached).transpose()
  }

  fn match_ignore_search(&self, cache: &str, url: &Url) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare(&format!(
        "{} WHERE cache_name = ? AND base_url = ? ORDER BY seq DESC LIMIT 1",
        SELECT_ENTRY
      ))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row = stmt
      .query_row(params![cache, base_url(url).as_str()], read_entry)
      .optional()
      .map_err(|e| eyre!("Failed to query cache entries for {}: {}", url, e))?;

    row.map(into_cached).transpose()
  }

  fn delete(&self, cache: &str, url: &Url) -> Result<bool> {
    let conn = self.db.conn()?;

    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ? AND url = ?",
        params![cache, url.as_str()],
      )
      .map_err(|e| eyre!("Failed to delete cache entry {}: {}", url, e))?;

    Ok(removed > 0)
  }

  fn delete_ignore_search(&self, cache: &str, url: &Url) -> Result<usize> {
    let conn = self.db.conn()?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ? AND base_url = ?",
        params![cache, base_url(url).as_str()],
      )
      .map_err(|e| eyre!("Failed to delete cache entries for {}: {}", url, e))
  }

  fn keys(&self, cache: &str) -> Result<Vec<Url>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE cache_name = ? ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls: Vec<String> = stmt
      .query_map(params![cache], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    urls
      .iter()
      .map(|u| Url::parse(u).map_err(|e| eyre!("Invalid cached url '{}': {}", u, e)))
      .collect()
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_cache(&self, cache: &str) -> Result<usize> {
    let conn = self.db.conn()?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ?",
        params![cache],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache, e))
  }
}
