//! Query runner: decides when keyed reads execute.
//!
//! Inspired by TanStack Query. Views mount a query with [`QueryClient::use_query`]
//! and get a [`QueryHandle`]; the runner then:
//! - fetches on mount when the cached entry is missing or stale
//! - shares one in-flight request between every caller of the same key
//! - applies responses in request order, discarding superseded ones
//! - polls while at least one observer asks for it, even in the background
//! - refetches mounted keys on focus, reconnect and invalidation
//! - retries a failed fetch once, keeping the last good data visible
//!
//! # Example
//!
//! ```ignore
//! let api = api.clone();
//! let mut handle: QueryHandle<Page<Ticket>> = queries.use_query(
//!     QueryKey::tickets(&filters),
//!     fetcher(move || {
//!         let api = api.clone();
//!         let filters = filters.clone();
//!         async move { api.tickets().list(&filters).await }
//!     }),
//!     QueryOptions::realtime(Duration::from_secs(5)),
//! );
//!
//! // In event loop tick
//! if handle.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

mod handle;
mod options;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use handle::{LiveSnapshot, QueryHandle};
pub use options::{QueryOptions, RunnerConfig};

use crate::api::ApiError;
use crate::cache::{KeyPattern, QueryCache, QueryKey, SubscriberId};

/// Outcome of one fetch.
pub type FetchResult = Result<Value, ApiError>;

/// Factory producing a fresh request future each time a key is (re)fetched.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// A request in flight; clones resolve to the same result.
pub type QueryFuture = Shared<BoxFuture<'static, FetchResult>>;

/// Wrap a typed async fetch function into a [`Fetcher`].
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher
where
  T: Serialize + Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  Arc::new(move || {
    let request = f();
    async move {
      let value = request.await?;
      serde_json::to_value(value).map_err(ApiError::from)
    }
    .boxed()
  })
}

/// Shared query runner. Clones drive the same cache and request table.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<ClientInner>,
}

struct ClientInner {
  cache: QueryCache,
  config: RunnerConfig,
  state: Mutex<RunnerState>,
  online: AtomicBool,
}

#[derive(Default)]
struct RunnerState {
  keys: HashMap<QueryKey, KeyState>,
}

#[derive(Default)]
struct KeyState {
  fetcher: Option<Fetcher>,
  in_flight: Option<InFlight>,
  /// Sequence number of the most recently started request
  last_started: u64,
  /// Responses at or below this sequence are discarded
  last_applied: u64,
  observers: HashMap<SubscriberId, QueryOptions>,
  poller: Option<Poller>,
}

impl KeyState {
  fn has_enabled_observer(&self) -> bool {
    self.observers.values().any(|o| o.enabled)
  }

  fn wants(&self, pred: impl Fn(&QueryOptions) -> bool) -> bool {
    self.observers.values().any(|o| o.enabled && pred(o))
  }

  /// Make every request started so far unable to overwrite the cache.
  fn supersede_in_flight(&mut self) {
    self.last_applied = self.last_started;
    self.in_flight = None;
  }
}

struct InFlight {
  seq: u64,
  future: QueryFuture,
}

struct Poller {
  period: Duration,
  task: AbortHandle,
}

impl QueryClient {
  /// Create a runner over an existing cache.
  pub fn new(cache: QueryCache, config: RunnerConfig) -> Self {
    let inner = Arc::new(ClientInner {
      cache,
      config,
      state: Mutex::new(RunnerState::default()),
      online: AtomicBool::new(true),
    });

    let weak: Weak<ClientInner> = Arc::downgrade(&inner);
    inner.cache.set_invalidation_hook(Arc::new(move |keys| {
      if let Some(inner) = weak.upgrade() {
        QueryClient { inner }.refetch_invalidated(keys);
      }
    }));

    Self { inner }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.inner.cache
  }

  /// False after a network failure, until the next successful fetch.
  pub fn is_online(&self) -> bool {
    self.inner.online.load(Ordering::SeqCst)
  }

  fn lock(&self) -> MutexGuard<'_, RunnerState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  // ---------------------------------------------------------------------------
  // Observers
  // ---------------------------------------------------------------------------

  /// Mount a query: subscribe to its key and fetch if needed.
  ///
  /// Dropping the returned handle unmounts it.
  pub fn use_query<T: DeserializeOwned>(
    &self,
    key: QueryKey,
    fetcher: Fetcher,
    options: QueryOptions,
  ) -> QueryHandle<T> {
    let cache = &self.inner.cache;
    cache.configure(&key, options.entry_config());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let id = cache.subscribe(
      &key,
      Arc::new(move |entry| {
        // Receiver may already be gone while the handle is being dropped
        let _ = tx.send(Arc::clone(entry));
      }),
    );

    {
      let mut state = self.lock();
      let ks = state.keys.entry(key.clone()).or_default();
      ks.fetcher = Some(fetcher.clone());
      ks.observers.insert(id, options.clone());
    }
    self.update_poller(&key);

    let current = cache.get(&key);
    let should_fetch = options.enabled
      && match &current {
        None => true,
        Some(entry) => !entry.has_data() || (options.refetch_on_mount && entry.is_stale()),
      };
    debug!(key = %key, fetch = should_fetch, "query mounted");

    let handle = QueryHandle::new(self.clone(), key.clone(), id, rx, current, options.enabled);
    if should_fetch {
      self.start(&key, fetcher, false);
    }
    handle
  }

  pub(crate) fn unmount(&self, key: &QueryKey, id: SubscriberId) {
    let remaining = self.inner.cache.unsubscribe(key, id);
    {
      let mut state = self.lock();
      if let Some(ks) = state.keys.get_mut(key) {
        ks.observers.remove(&id);
      }
    }
    self.update_poller(key);
    debug!(key = %key, remaining, "query unmounted");

    if remaining == 0 {
      let gc_time = self.inner.cache.config_for(key).gc_time;
      if gc_time.is_zero() {
        self.gc();
      } else if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
          tokio::time::sleep(gc_time).await;
          if let Some(inner) = weak.upgrade() {
            QueryClient { inner }.gc();
          }
        });
      }
    }
  }

  pub(crate) fn set_observer_enabled(&self, key: &QueryKey, id: SubscriberId, enabled: bool) {
    let fetcher = {
      let mut state = self.lock();
      let Some(ks) = state.keys.get_mut(key) else {
        return;
      };
      if let Some(options) = ks.observers.get_mut(&id) {
        options.enabled = enabled;
      }
      ks.fetcher.clone()
    };
    self.update_poller(key);

    if enabled {
      let stale = self
        .inner
        .cache
        .get(key)
        .map_or(true, |entry| entry.is_stale() || !entry.has_data());
      if let (true, Some(fetcher)) = (stale, fetcher) {
        self.start(key, fetcher, false);
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Fetching
  // ---------------------------------------------------------------------------

  /// Fetch a key, joining the request already in flight if there is one.
  ///
  /// `fetcher` is registered for the key when none is yet.
  pub fn fetch_query(&self, key: &QueryKey, fetcher: Fetcher) -> QueryFuture {
    self.start(key, fetcher, false)
  }

  /// Return the cached value when fresh, otherwise fetch it.
  pub async fn ensure_query_data(
    &self,
    key: &QueryKey,
    fetcher: Fetcher,
    options: QueryOptions,
  ) -> FetchResult {
    if self.inner.cache.get(key).is_none() {
      self.inner.cache.configure(key, options.entry_config());
    }
    if let Some(entry) = self.inner.cache.get(key) {
      if let (false, Some(data)) = (entry.is_stale(), &entry.data) {
        return Ok(data.clone());
      }
    }
    self.fetch_query(key, fetcher).await
  }

  /// Start a new request for a key with its registered fetcher, superseding
  /// any request in flight. Returns `None` if the key was never mounted.
  pub fn refetch(&self, key: &QueryKey) -> Option<QueryFuture> {
    let fetcher = self.registered_fetcher(key)?;
    Some(self.start(key, fetcher, true))
  }

  fn registered_fetcher(&self, key: &QueryKey) -> Option<Fetcher> {
    self.lock().keys.get(key).and_then(|ks| ks.fetcher.clone())
  }

  /// Join or start a request. `force` starts a new one even when a request
  /// is in flight; the older response is then discarded.
  fn start(&self, key: &QueryKey, fetcher: Fetcher, force: bool) -> QueryFuture {
    let (seq, future) = {
      let mut state = self.lock();
      let ks = state.keys.entry(key.clone()).or_default();
      if ks.fetcher.is_none() {
        ks.fetcher = Some(fetcher.clone());
      }
      if !force {
        if let Some(in_flight) = &ks.in_flight {
          debug!(key = %key, seq = in_flight.seq, "joining in-flight request");
          return in_flight.future.clone();
        }
      }

      ks.last_started += 1;
      let seq = ks.last_started;
      let future = fetch_with_retry(fetcher, key.clone(), self.inner.config.retry_delay)
        .boxed()
        .shared();
      ks.in_flight = Some(InFlight {
        seq,
        future: future.clone(),
      });
      // Under the runner lock so a fast response cannot settle before it
      self.inner.cache.mark_fetching(key);
      (seq, future)
    };

    debug!(key = %key, seq, force, "request started");

    let weak = Arc::downgrade(&self.inner);
    let task_key = key.clone();
    let task_future = future.clone();
    tokio::spawn(async move {
      let result = task_future.await;
      if let Some(inner) = weak.upgrade() {
        QueryClient { inner }.settle(&task_key, seq, result);
      }
    });

    future
  }

  /// Apply a finished request unless a newer one already landed.
  ///
  /// The sequence check and the cache write happen under the runner lock,
  /// so responses settling on different workers land in request order.
  fn settle(&self, key: &QueryKey, seq: u64, result: FetchResult) {
    let recovered = {
      let mut state = self.lock();
      let Some(ks) = state.keys.get_mut(key) else {
        debug!(key = %key, seq, "discarding response for forgotten key");
        return;
      };
      if ks.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
        ks.in_flight = None;
      }
      if seq <= ks.last_applied {
        debug!(key = %key, seq, "discarding superseded response");
        return;
      }
      ks.last_applied = seq;
      // A forced refetch is still running behind this response
      let newer_in_flight = ks.in_flight.is_some();

      let recovered = match result {
        Ok(data) => {
          self.inner.cache.set_data(key, data);
          true
        }
        Err(error) => {
          if error.is_network_error() {
            self.mark_offline();
          }
          warn!(key = %key, %error, "fetch failed");
          self.inner.cache.set_error(key, error);
          false
        }
      };
      if newer_in_flight {
        self.inner.cache.mark_fetching(key);
      }
      recovered
    };

    if recovered {
      self.mark_online(key);
    }
  }

  fn mark_online(&self, recovered: &QueryKey) {
    if !self.inner.online.swap(true, Ordering::SeqCst) {
      info!("connection restored");
      self.refetch_where(|o| o.refetch_on_reconnect, Some(recovered));
    }
  }

  fn mark_offline(&self) {
    if self.inner.online.swap(false, Ordering::SeqCst) {
      warn!("connection lost");
    }
  }

  // ---------------------------------------------------------------------------
  // Triggers
  // ---------------------------------------------------------------------------

  /// The terminal (or window) regained focus.
  pub fn on_focus(&self) -> usize {
    self.refetch_where(|o| o.refetch_on_window_focus, None)
  }

  /// The network came back.
  pub fn on_reconnect(&self) -> usize {
    self.refetch_where(|o| o.refetch_on_reconnect, None)
  }

  /// Refetch (de-duplicated) every mounted key with an enabled observer
  /// matching `pred`. Returns how many keys were triggered.
  fn refetch_where(&self, pred: impl Fn(&QueryOptions) -> bool, except: Option<&QueryKey>) -> usize {
    let targets: Vec<(QueryKey, Fetcher)> = {
      let state = self.lock();
      state
        .keys
        .iter()
        .filter(|(key, ks)| Some(*key) != except && ks.wants(&pred))
        .filter_map(|(key, ks)| ks.fetcher.clone().map(|f| (key.clone(), f)))
        .collect()
    };
    for (key, fetcher) in &targets {
      self.start(key, fetcher.clone(), false);
    }
    targets.len()
  }

  fn refetch_invalidated(&self, keys: Vec<QueryKey>) {
    for key in keys {
      let fetcher = {
        let state = self.lock();
        state
          .keys
          .get(&key)
          .filter(|ks| ks.has_enabled_observer())
          .and_then(|ks| ks.fetcher.clone())
      };
      if let Some(fetcher) = fetcher {
        self.start(&key, fetcher, true);
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Polling
  // ---------------------------------------------------------------------------

  /// Start, retune or stop the key's poller to match its observers.
  fn update_poller(&self, key: &QueryKey) {
    let mut state = self.lock();
    let Some(ks) = state.keys.get_mut(key) else {
      return;
    };
    let period = ks
      .observers
      .values()
      .filter(|o| o.enabled)
      .filter_map(|o| o.refetch_interval)
      .min();

    if let (Some(period), Some(poller)) = (period, &ks.poller) {
      if poller.period == period {
        return;
      }
    }
    if let Some(old) = ks.poller.take() {
      old.task.abort();
      debug!(key = %key, "polling stopped");
    }
    if let Some(period) = period {
      debug!(key = %key, ?period, "polling started");
      ks.poller = Some(Poller {
        period,
        task: self.spawn_poller(key.clone(), period),
      });
    }
  }

  fn spawn_poller(&self, key: QueryKey, period: Duration) -> AbortHandle {
    let weak = Arc::downgrade(&self.inner);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        QueryClient { inner }.poll_tick(&key);
      }
    })
    .abort_handle()
  }

  fn poll_tick(&self, key: &QueryKey) {
    let fetcher = {
      let state = self.lock();
      state
        .keys
        .get(key)
        .filter(|ks| ks.has_enabled_observer())
        .and_then(|ks| ks.fetcher.clone())
    };
    if let Some(fetcher) = fetcher {
      debug!(key = %key, "poll");
      self.start(key, fetcher, false);
    }
  }

  // ---------------------------------------------------------------------------
  // Cache policies
  // ---------------------------------------------------------------------------

  /// Mark matching keys stale; mounted ones are refetched in the background.
  pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    self.inner.cache.invalidate(pattern)
  }

  /// Delete matching entries and force a refetch of mounted ones.
  ///
  /// Requests already in flight for those keys can no longer land.
  pub fn remove(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
    let (targets, removed) = {
      let mut state = self.lock();
      let targets: Vec<(QueryKey, Option<Fetcher>)> = state
        .keys
        .iter_mut()
        .filter(|(key, _)| pattern.matches(key))
        .map(|(key, ks)| {
          ks.supersede_in_flight();
          let fetcher = if ks.has_enabled_observer() {
            ks.fetcher.clone()
          } else {
            None
          };
          (key.clone(), fetcher)
        })
        .collect();
      (targets, self.inner.cache.remove(pattern))
    };

    for (key, fetcher) in targets {
      if let Some(fetcher) = fetcher {
        self.start(&key, fetcher, true);
      }
    }
    removed
  }

  /// Write data for a key immediately (optimistic update).
  ///
  /// `update` receives the current data and returns the replacement, or
  /// `None` to leave the entry untouched. Requests already in flight for the
  /// key are superseded so they cannot overwrite the write. `update` runs
  /// while the cache is locked and must not call back into the client.
  pub fn set_query_data<F>(&self, key: &QueryKey, update: F) -> bool
  where
    F: FnOnce(Option<&Value>) -> Option<Value>,
  {
    let mut state = self.lock();
    if let Some(ks) = state.keys.get_mut(key) {
      ks.supersede_in_flight();
    }
    self.inner.cache.update(key, update)
  }

  /// Typed variant of [`set_query_data`](Self::set_query_data) that replaces the value.
  pub fn set_query_value<T: Serialize>(&self, key: &QueryKey, value: &T) -> bool {
    match serde_json::to_value(value) {
      Ok(value) => self.set_query_data(key, |_| Some(value)),
      Err(e) => {
        warn!(key = %key, error = %e, "failed to serialize query value");
        false
      }
    }
  }

  /// Typed read of the cached data for a key.
  pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
    self
      .inner
      .cache
      .get(key)
      .and_then(|entry| entry.data_as::<T>())
      .and_then(Result::ok)
  }

  /// Drop all cached data and discard every request in flight.
  pub fn clear(&self) {
    let mut state = self.lock();
    for ks in state.keys.values_mut() {
      ks.supersede_in_flight();
    }
    self.inner.cache.clear();
  }

  /// Collect idle cache entries and forget keys nobody uses any more.
  pub fn gc(&self) -> usize {
    let collected = self.inner.cache.gc();
    let cache = &self.inner.cache;
    let mut state = self.lock();
    state.keys.retain(|key, ks| {
      !ks.observers.is_empty()
        || ks.in_flight.is_some()
        || ks.poller.is_some()
        || cache.get(key).is_some()
    });
    collected
  }

  /// Number of mounted observers for a key.
  pub fn observer_count(&self, key: &QueryKey) -> usize {
    self.lock().keys.get(key).map_or(0, |ks| ks.observers.len())
  }

  pub fn is_polling(&self, key: &QueryKey) -> bool {
    self
      .lock()
      .keys
      .get(key)
      .is_some_and(|ks| ks.poller.is_some())
  }
}

/// Run a fetch, retrying once on a retryable failure.
async fn fetch_with_retry(fetcher: Fetcher, key: QueryKey, retry_delay: Duration) -> FetchResult {
  match fetcher().await {
    Ok(data) => Ok(data),
    Err(error) if !error.is_retryable() => Err(error),
    Err(error) => {
      warn!(key = %key, %error, "fetch failed, retrying once");
      tokio::time::sleep(retry_delay).await;
      fetcher().await
    }
  }
}
