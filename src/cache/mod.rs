//! Offline cache for plan pages and static assets.
//!
//! This module keeps named response caches consistent with a fixed manifest:
//! - Plan paths use network-then-cache so the newest plan is always shown
//! - Asset paths use cache-then-network, honouring cache-busting queries
//! - Offline mode serves the latest cached entry for a pathname

mod manager;
mod manifest;
mod storage;
mod traits;

pub use manager::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheManager};
pub use manifest::CacheManifest;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::CacheSource;
