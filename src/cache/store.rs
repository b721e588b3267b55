//! The keyed query cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::entry::{CacheEntry, EntryConfig, FetchStatus};
use super::key::{KeyPattern, QueryKey};
use crate::api::ApiError;

/// Callback receiving every new snapshot of a subscribed key.
pub type Listener = Arc<dyn Fn(&Arc<CacheEntry>) + Send + Sync>;

/// Callback receiving the subscribed keys hit by an invalidation.
pub type InvalidationHook = Arc<dyn Fn(Vec<QueryKey>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Keyed store of query results.
///
/// One `QueryCache` is created per session and passed to whoever needs it;
/// clones share the same entries. All writes notify the key's subscribers
/// synchronously, after the internal lock has been released, so listeners
/// may read the cache again.
#[derive(Clone, Default)]
pub struct QueryCache {
  inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
  state: Mutex<CacheState>,
  on_invalidate: RwLock<Option<InvalidationHook>>,
}

#[derive(Default)]
struct CacheState {
  entries: HashMap<QueryKey, Arc<CacheEntry>>,
  configs: HashMap<QueryKey, EntryConfig>,
  subscribers: HashMap<QueryKey, Vec<(SubscriberId, Listener)>>,
  idle_since: HashMap<QueryKey, Instant>,
  next_subscriber: u64,
}

impl CacheState {
  fn config_for(&self, key: &QueryKey) -> EntryConfig {
    self.configs.get(key).copied().unwrap_or_default()
  }

  fn entry_or_new(&self, key: &QueryKey) -> CacheEntry {
    match self.entries.get(key) {
      Some(entry) => CacheEntry::clone(entry),
      None => CacheEntry::new(key.clone(), self.config_for(key)),
    }
  }

  /// Store a new snapshot and return it with the listeners to notify.
  fn publish(&mut self, entry: CacheEntry) -> (Arc<CacheEntry>, Vec<Listener>) {
    let entry = Arc::new(entry);
    self.entries.insert(entry.key.clone(), Arc::clone(&entry));
    (Arc::clone(&entry), self.listeners(&entry.key))
  }

  fn listeners(&self, key: &QueryKey) -> Vec<Listener> {
    self
      .subscribers
      .get(key)
      .map(|subs| subs.iter().map(|(_, l)| Arc::clone(l)).collect())
      .unwrap_or_default()
  }

  fn has_subscribers(&self, key: &QueryKey) -> bool {
    self.subscribers.get(key).is_some_and(|subs| !subs.is_empty())
  }

  /// Keys with an entry or a subscriber that match the pattern.
  fn matching(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self
      .entries
      .keys()
      .chain(self.subscribers.keys())
      .filter(|key| pattern.matches(key))
      .cloned()
      .collect();
    keys.sort();
    keys.dedup();
    keys
  }
}

fn notify(entry: &Arc<CacheEntry>, listeners: Vec<Listener>) {
  for listener in listeners {
    listener(entry);
  }
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Install the callback that schedules refetches after an invalidation.
  pub fn set_invalidation_hook(&self, hook: InvalidationHook) {
    let mut guard = self
      .inner
      .on_invalidate
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    *guard = Some(hook);
  }

  /// Current snapshot for a key.
  pub fn get(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
    self.lock().entries.get(key).cloned()
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self.lock().entries.keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Keys with an entry or a subscriber matching the pattern.
  pub fn matching(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    self.lock().matching(pattern)
  }

  /// Set freshness and retention for a key (applies to the current entry too).
  pub fn configure(&self, key: &QueryKey, config: EntryConfig) {
    let mut state = self.lock();
    state.configs.insert(key.clone(), config);
    if let Some(entry) = state.entries.get(key) {
      if entry.config != config {
        let mut updated = CacheEntry::clone(entry);
        updated.config = config;
        state.entries.insert(key.clone(), Arc::new(updated));
      }
    }
  }

  pub fn config_for(&self, key: &QueryKey) -> EntryConfig {
    self.lock().config_for(key)
  }

  /// Overwrite the data and status of a key.
  ///
  /// A `Success` write stamps the fetch time and clears any error or
  /// invalidation mark.
  pub fn set(&self, key: &QueryKey, data: Value, status: FetchStatus) {
    let (entry, listeners) = {
      let mut state = self.lock();
      let mut entry = state.entry_or_new(key);
      entry.data = Some(data);
      entry.status = status;
      if status == FetchStatus::Success {
        entry.fetched_at = Some(Instant::now());
        entry.updated_at = Some(Utc::now());
        entry.error = None;
        entry.invalidated = false;
      }
      state.publish(entry)
    };
    debug!(key = %key, status = ?status, "cache set");
    notify(&entry, listeners);
  }

  /// Record a successful fetch.
  pub fn set_data(&self, key: &QueryKey, data: Value) {
    self.set(key, data, FetchStatus::Success);
  }

  /// Record a failed fetch; previously cached data stays visible.
  pub fn set_error(&self, key: &QueryKey, error: ApiError) {
    let (entry, listeners) = {
      let mut state = self.lock();
      let mut entry = state.entry_or_new(key);
      entry.status = FetchStatus::Error;
      entry.error = Some(error);
      state.publish(entry)
    };
    notify(&entry, listeners);
  }

  /// Flag a key as having a request in flight.
  pub fn mark_fetching(&self, key: &QueryKey) {
    let (entry, listeners) = {
      let mut state = self.lock();
      let mut entry = state.entry_or_new(key);
      if entry.status == FetchStatus::Fetching {
        return;
      }
      entry.status = FetchStatus::Fetching;
      state.publish(entry)
    };
    notify(&entry, listeners);
  }

  /// Apply `update` to the current data of a key and store the result as a
  /// successful write. Returns false when `update` declined (returned `None`).
  pub fn update<F>(&self, key: &QueryKey, update: F) -> bool
  where
    F: FnOnce(Option<&Value>) -> Option<Value>,
  {
    let published = {
      let mut state = self.lock();
      let mut entry = state.entry_or_new(key);
      match update(entry.data.as_ref()) {
        Some(data) => {
          entry.data = Some(data);
          entry.status = FetchStatus::Success;
          entry.fetched_at = Some(Instant::now());
          entry.updated_at = Some(Utc::now());
          entry.error = None;
          entry.invalidated = false;
          Some(state.publish(entry))
        }
        None => None,
      }
    };
    match published {
      Some((entry, listeners)) => {
        notify(&entry, listeners);
        true
      }
      None => false,
    }
  }

  /// Mark matching entries stale without dropping their data.
  ///
  /// Matching keys that currently have subscribers are handed to the
  /// invalidation hook so the query runner refetches them. Returns every
  /// matched key.
  pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    let (matched, updates, subscribed) = {
      let mut state = self.lock();
      let matched = state.matching(pattern);
      let mut updates = Vec::new();
      let mut subscribed = Vec::new();
      for key in &matched {
        if let Some(existing) = state.entries.get(key) {
          if !existing.invalidated {
            let mut entry = CacheEntry::clone(existing);
            entry.invalidated = true;
            updates.push(state.publish(entry));
          }
        }
        if state.has_subscribers(key) {
          subscribed.push(key.clone());
        }
      }
      (matched, updates, subscribed)
    };

    debug!(pattern = %pattern, matched = matched.len(), "cache invalidate");
    for (entry, listeners) in updates {
      notify(&entry, listeners);
    }

    if !subscribed.is_empty() {
      let hook = self
        .inner
        .on_invalidate
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
      if let Some(hook) = hook {
        hook(subscribed);
      }
    }
    matched
  }

  /// Delete matching entries outright.
  ///
  /// Subscribers stay registered and receive an empty idle snapshot.
  /// Returns the removed keys.
  pub fn remove(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    let (removed, blanks) = {
      let mut state = self.lock();
      let removed: Vec<QueryKey> = state
        .entries
        .keys()
        .filter(|key| pattern.matches(key))
        .cloned()
        .collect();
      let mut blanks = Vec::new();
      for key in &removed {
        state.entries.remove(key);
        if state.has_subscribers(key) {
          let blank = Arc::new(CacheEntry::new(key.clone(), state.config_for(key)));
          blanks.push((blank, state.listeners(key)));
        }
      }
      (removed, blanks)
    };

    debug!(pattern = %pattern, removed = removed.len(), "cache remove");
    for (entry, listeners) in blanks {
      notify(&entry, listeners);
    }
    removed
  }

  /// Drop every entry. Subscribers receive empty snapshots.
  pub fn clear(&self) {
    let blanks = {
      let mut state = self.lock();
      let keys: Vec<QueryKey> = state.entries.keys().cloned().collect();
      state.entries.clear();
      keys
        .into_iter()
        .filter(|key| state.has_subscribers(key))
        .map(|key| {
          let blank = Arc::new(CacheEntry::new(key.clone(), state.config_for(&key)));
          (blank, state.listeners(&key))
        })
        .collect::<Vec<_>>()
    };
    debug!("cache cleared");
    for (entry, listeners) in blanks {
      notify(&entry, listeners);
    }
  }

  /// Register a listener for a key.
  pub fn subscribe(&self, key: &QueryKey, listener: Listener) -> SubscriberId {
    let mut state = self.lock();
    state.next_subscriber += 1;
    let id = SubscriberId(state.next_subscriber);
    state
      .subscribers
      .entry(key.clone())
      .or_default()
      .push((id, listener));
    state.idle_since.remove(key);
    id
  }

  /// Remove a listener; returns how many remain for the key.
  pub fn unsubscribe(&self, key: &QueryKey, id: SubscriberId) -> usize {
    let mut state = self.lock();
    let remaining = match state.subscribers.get_mut(key) {
      Some(subs) => {
        subs.retain(|(sub, _)| *sub != id);
        subs.len()
      }
      None => 0,
    };
    if remaining == 0 {
      state.subscribers.remove(key);
      state.idle_since.insert(key.clone(), Instant::now());
    }
    remaining
  }

  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    self.lock().subscribers.get(key).map_or(0, Vec::len)
  }

  /// Drop unobserved entries whose idle time reached their `gc_time`.
  ///
  /// Entries with a request in flight are kept so the response can still
  /// land for a later subscriber. Returns how many entries were dropped.
  pub fn gc(&self) -> usize {
    let mut state = self.lock();
    let now = Instant::now();
    let expired: Vec<QueryKey> = state
      .entries
      .iter()
      .filter(|(key, entry)| {
        if state.has_subscribers(key) || entry.is_fetching() {
          return false;
        }
        let idle_since = state.idle_since.get(*key).copied().or(entry.fetched_at);
        match idle_since {
          Some(since) => now.duration_since(since) >= entry.config.gc_time,
          None => true,
        }
      })
      .map(|(key, _)| key.clone())
      .collect();

    for key in &expired {
      state.entries.remove(key);
      state.idle_since.remove(key);
      state.configs.remove(key);
    }
    if !expired.is_empty() {
      debug!(collected = expired.len(), "cache gc");
    }
    expired.len()
  }
}
