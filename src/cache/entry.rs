//! Cache entries and their per-key settings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use super::key::QueryKey;
use crate::api::ApiError;

/// Fetch status of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
  /// Nothing fetched yet
  #[default]
  Idle,
  /// A request is in flight; previous data (if any) is still shown
  Fetching,
  /// Last request succeeded
  Success,
  /// Last request failed; previous data (if any) is retained
  Error,
}

/// Per-key freshness and retention settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryConfig {
  /// Age after which data is stale and refetched on the next trigger
  pub stale_after: Duration,
  /// Polling cadence, if the key is polled
  pub refetch_interval: Option<Duration>,
  /// How long an entry with no subscribers is kept
  pub gc_time: Duration,
}

impl Default for EntryConfig {
  fn default() -> Self {
    Self {
      stale_after: Duration::ZERO,
      refetch_interval: None,
      gc_time: Duration::ZERO,
    }
  }
}

/// Snapshot of one cached query.
///
/// Entries are immutable once published; every change produces a new
/// `Arc<CacheEntry>` that all subscribers of the key receive.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: QueryKey,
  pub data: Option<Value>,
  pub status: FetchStatus,
  pub error: Option<ApiError>,
  /// Monotonic time of the last successful fetch
  pub fetched_at: Option<Instant>,
  /// Wall-clock time of the last successful fetch, for display
  pub updated_at: Option<DateTime<Utc>>,
  /// Set by `invalidate`, cleared by the next successful write
  pub invalidated: bool,
  pub config: EntryConfig,
}

impl CacheEntry {
  pub fn new(key: QueryKey, config: EntryConfig) -> Self {
    Self {
      key,
      data: None,
      status: FetchStatus::Idle,
      error: None,
      fetched_at: None,
      updated_at: None,
      invalidated: false,
      config,
    }
  }

  /// Stale when invalidated, never fetched, or older than `stale_after`.
  pub fn is_stale(&self) -> bool {
    if self.invalidated {
      return true;
    }
    match self.fetched_at {
      Some(at) => at.elapsed() >= self.config.stale_after,
      None => true,
    }
  }

  pub fn is_fetching(&self) -> bool {
    self.status == FetchStatus::Fetching
  }

  pub fn has_data(&self) -> bool {
    self.data.is_some()
  }

  /// Deserialize the cached data.
  pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, ApiError>> {
    self
      .data
      .as_ref()
      .map(|value| T::deserialize(value).map_err(ApiError::from))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_new_entry_is_stale() {
    let entry = CacheEntry::new(QueryKey::unread_count(), EntryConfig::default());
    assert!(entry.is_stale());
    assert!(!entry.has_data());
    assert_eq!(entry.status, FetchStatus::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn test_staleness_follows_stale_after() {
    let mut entry = CacheEntry::new(
      QueryKey::current_user(),
      EntryConfig {
        stale_after: Duration::from_secs(30),
        ..Default::default()
      },
    );
    entry.fetched_at = Some(Instant::now());
    assert!(!entry.is_stale());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(entry.is_stale());
  }

  #[tokio::test]
  async fn test_invalidated_is_stale() {
    let mut entry = CacheEntry::new(
      QueryKey::current_user(),
      EntryConfig {
        stale_after: Duration::from_secs(300),
        ..Default::default()
      },
    );
    entry.fetched_at = Some(Instant::now());
    entry.invalidated = true;
    assert!(entry.is_stale());
  }

  #[test]
  fn test_data_as() {
    let mut entry = CacheEntry::new(QueryKey::unread_count(), EntryConfig::default());
    entry.data = Some(serde_json::json!({"count": 3}));
    let count: crate::api::types::UnreadCount = entry.data_as().unwrap().unwrap();
    assert_eq!(count.count, 3);
  }
}
