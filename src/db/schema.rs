/// Schema for all worker tables.
pub const SCHEMA: &str = r#"
-- Named response caches, one row per request URL
CREATE TABLE IF NOT EXISTS cache_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_name TEXT NOT NULL,
    url TEXT NOT NULL,
    -- url without query string and fragment, for ignore-search matching
    base_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_url TEXT NOT NULL,
    redirected INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (cache_name, url)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_base
    ON cache_entries(cache_name, base_url);

-- Visible system notifications
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    options TEXT NOT NULL,
    shown_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Lifecycle state per worker version
CREATE TABLE IF NOT EXISTS worker_state (
    version TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
