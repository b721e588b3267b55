use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::QueryClient;
use crate::api::ApiError;
use crate::cache::{CacheEntry, FetchStatus, QueryKey, SubscriberId};

/// What a view renders for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot<T> {
  pub data: Option<T>,
  /// No data yet and a request is in flight
  pub is_loading: bool,
  pub error: Option<ApiError>,
  /// Data shown while a background request is in flight
  pub is_updating: bool,
  pub last_updated: Option<DateTime<Utc>>,
}

/// A mounted query.
///
/// Receives every cache write for its key. Call [`poll`](Self::poll) from
/// the event loop tick; dropping the handle unmounts the observer.
pub struct QueryHandle<T> {
  client: QueryClient,
  key: QueryKey,
  id: SubscriberId,
  receiver: mpsc::UnboundedReceiver<Arc<CacheEntry>>,
  entry: Option<Arc<CacheEntry>>,
  data: Option<T>,
  decode_error: Option<ApiError>,
  enabled: bool,
}

impl<T: DeserializeOwned> QueryHandle<T> {
  pub(crate) fn new(
    client: QueryClient,
    key: QueryKey,
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<Arc<CacheEntry>>,
    current: Option<Arc<CacheEntry>>,
    enabled: bool,
  ) -> Self {
    let mut handle = Self {
      client,
      key,
      id,
      receiver,
      entry: None,
      data: None,
      decode_error: None,
      enabled,
    };
    if let Some(entry) = current {
      handle.apply(entry);
    }
    handle
  }

  /// Drain pending cache updates.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(entry) = self.receiver.try_recv() {
      self.apply(entry);
      changed = true;
    }
    changed
  }

  /// Wait for the next cache update, then drain any others queued behind it.
  pub async fn changed(&mut self) -> bool {
    match self.receiver.recv().await {
      Some(entry) => {
        self.apply(entry);
        self.poll();
        true
      }
      None => false,
    }
  }

  /// Wait until `pred` holds, or `timeout` passes. Returns whether it held.
  pub async fn wait_until(&mut self, timeout: Duration, pred: impl Fn(&Self) -> bool) -> bool {
    self.poll();
    if pred(self) {
      return true;
    }
    let waited = tokio::time::timeout(timeout, async {
      while self.changed().await {
        if pred(self) {
          return true;
        }
      }
      false
    })
    .await;
    waited.unwrap_or(false)
  }

  fn apply(&mut self, entry: Arc<CacheEntry>) {
    let data_changed = match &self.entry {
      Some(previous) => previous.data != entry.data,
      None => true,
    };
    if data_changed {
      match entry.data_as::<T>() {
        Some(Ok(data)) => {
          self.data = Some(data);
          self.decode_error = None;
        }
        Some(Err(error)) => {
          tracing::warn!(key = %self.key, %error, "cached data has unexpected shape");
          self.data = None;
          self.decode_error = Some(error);
        }
        None => {
          self.data = None;
          self.decode_error = None;
        }
      }
    }
    self.entry = Some(entry);
  }
}

impl<T> QueryHandle<T> {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn status(&self) -> FetchStatus {
    self.entry.as_ref().map_or(FetchStatus::Idle, |e| e.status)
  }

  /// Last fetch error, or a decode error if the cached data has the wrong shape.
  pub fn error(&self) -> Option<&ApiError> {
    self
      .entry
      .as_ref()
      .and_then(|e| e.error.as_ref())
      .or(self.decode_error.as_ref())
  }

  pub fn is_fetching(&self) -> bool {
    self.status() == FetchStatus::Fetching
  }

  /// First load: nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && (self.is_fetching() || (self.enabled && self.entry.is_none()))
  }

  /// Background refresh of data already on screen.
  pub fn is_updating(&self) -> bool {
    self.data.is_some() && self.is_fetching()
  }

  pub fn is_stale(&self) -> bool {
    self.entry.as_ref().map_or(true, |e| e.is_stale())
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn last_updated(&self) -> Option<DateTime<Utc>> {
    self.entry.as_ref().and_then(|e| e.updated_at)
  }

  /// Force a new request, superseding any in flight.
  pub fn refetch(&self) {
    if self.enabled {
      let _ = self.client.refetch(&self.key);
    }
  }

  /// Turn fetching on or off for this observer (e.g. once a credential exists).
  pub fn set_enabled(&mut self, enabled: bool) {
    if self.enabled != enabled {
      self.enabled = enabled;
      self.client.set_observer_enabled(&self.key, self.id, enabled);
    }
  }
}

impl<T: Clone> QueryHandle<T> {
  pub fn live(&self) -> LiveSnapshot<T> {
    LiveSnapshot {
      data: self.data.clone(),
      is_loading: self.is_loading(),
      error: self.error().cloned(),
      is_updating: self.is_updating(),
      last_updated: self.last_updated(),
    }
  }
}

impl<T> Drop for QueryHandle<T> {
  fn drop(&mut self) {
    self.client.unmount(&self.key, self.id);
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for QueryHandle<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryHandle")
      .field("key", &self.key)
      .field("status", &self.status())
      .field("data", &self.data)
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::UnreadCount;
  use crate::query::{fetcher, QueryOptions, RunnerConfig};
  use crate::cache::QueryCache;
  use serde_json::json;

  fn runner() -> QueryClient {
    QueryClient::new(QueryCache::new(), RunnerConfig::default())
  }

  #[tokio::test]
  async fn test_handle_loading_then_success() {
    let client = runner();
    let mut handle: QueryHandle<UnreadCount> = client.use_query(
      QueryKey::unread_count(),
      fetcher(|| async { Ok::<_, ApiError>(json!({"count": 4})) }),
      QueryOptions::default(),
    );
    assert!(handle.is_loading());
    assert!(handle.data().is_none());

    assert!(
      handle
        .wait_until(Duration::from_secs(1), |h| h.data().is_some())
        .await
    );
    assert_eq!(handle.data().map(|c| c.count), Some(4));
    assert_eq!(handle.status(), FetchStatus::Success);
    assert!(!handle.is_loading());
    assert!(handle.last_updated().is_some());
  }

  #[tokio::test]
  async fn test_handle_reports_decode_error() {
    let client = runner();
    let mut handle: QueryHandle<UnreadCount> = client.use_query(
      QueryKey::unread_count(),
      fetcher(|| async { Ok::<_, ApiError>(json!(["not", "a", "count"])) }),
      QueryOptions::default(),
    );
    handle
      .wait_until(Duration::from_secs(1), |h| h.status() == FetchStatus::Success)
      .await;

    assert!(handle.data().is_none());
    assert!(matches!(handle.error(), Some(ApiError::Decode(_))));
  }

  #[tokio::test]
  async fn test_live_snapshot_updating() {
    let client = runner();
    let key = QueryKey::unread_count();
    client.cache().set_data(&key, json!({"count": 1}));
    client.cache().mark_fetching(&key);

    let handle: QueryHandle<UnreadCount> = client.use_query(
      key,
      fetcher(|| async { Ok::<_, ApiError>(json!({"count": 2})) }),
      QueryOptions::default().enabled(false),
    );
    let live = handle.live();
    assert_eq!(live.data, Some(UnreadCount { count: 1 }));
    assert!(live.is_updating);
    assert!(!live.is_loading);
  }

  #[tokio::test]
  async fn test_drop_unmounts() {
    let client = runner();
    let key = QueryKey::notifications();
    let handle: QueryHandle<serde_json::Value> = client.use_query(
      key.clone(),
      fetcher(|| async { Ok::<_, ApiError>(json!([])) }),
      QueryOptions::default(),
    );
    assert_eq!(client.observer_count(&key), 1);
    assert_eq!(client.cache().subscriber_count(&key), 1);

    drop(handle);
    assert_eq!(client.observer_count(&key), 0);
    assert_eq!(client.cache().subscriber_count(&key), 0);
  }
}
