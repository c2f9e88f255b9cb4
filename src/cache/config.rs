//! Cache configuration.
//!
//! Controls how the optimistic mutation path treats the query cache, via the
//! `[cache]` table of `likefeed.toml`.

use serde::Deserialize;

/// Cache configuration from `likefeed.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Mark an entry stale once its mutation is confirmed, so the next read refetches it.
    pub reconcile_on_success: bool,
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            reconcile_on_success: settings.reconcile_on_success,
        }
    }
}
