//! Mutation runner: writes followed by a declared cache policy.
//!
//! A [`Mutation`] pairs a write with two policies:
//! - [`CachePolicy`]: ordered `{pattern, action}` steps applied only after the
//!   write succeeded (`Invalidate`, `Remove`, or a synchronous `SetData`)
//! - [`ErrorPolicy`]: the toast shown when the write fails
//!
//! Errors always reach the caller. Authorization failures produce no toast;
//! the session gate handles them through the client's 401 hook.

pub mod catalog;
mod notifier;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use catalog::Mutations;
pub use notifier::{Notifier, Toast, ToastLevel, ToastQueue, TracingNotifier};

use crate::api::ApiError;
use crate::cache::{KeyPattern, QueryKey};
use crate::query::QueryClient;

type MutateFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync>;
type PatternFn<I, O> = Arc<dyn Fn(&I, &O) -> KeyPattern + Send + Sync>;
type KeyFn<I, O> = Arc<dyn Fn(&I, &O) -> QueryKey + Send + Sync>;
type MessageFn<I, O> = Arc<dyn Fn(&I, &O) -> String + Send + Sync>;
type CustomFn<I, O> = Arc<dyn Fn(&QueryClient, &I, &O) + Send + Sync>;

/// Computes the new data for a key from the write's input, its result and
/// the currently cached value. `None` leaves the key untouched.
pub type Updater<I, O> = Arc<dyn Fn(&I, &O, Option<&Value>) -> Option<Value> + Send + Sync>;

/// What to do with the keys a step targets
pub enum CacheAction<I, O> {
  /// Mark stale; mounted keys refetch in the background
  Invalidate(PatternFn<I, O>),
  /// Delete, then force a refetch of mounted keys
  Remove(PatternFn<I, O>),
  /// Write data into one key immediately
  SetData(KeyFn<I, O>, Updater<I, O>),
  /// Arbitrary step that needs to read other keys first
  Custom(CustomFn<I, O>),
}

impl<I, O> Clone for CacheAction<I, O> {
  fn clone(&self) -> Self {
    match self {
      Self::Invalidate(p) => Self::Invalidate(p.clone()),
      Self::Remove(p) => Self::Remove(p.clone()),
      Self::SetData(k, u) => Self::SetData(k.clone(), u.clone()),
      Self::Custom(f) => Self::Custom(f.clone()),
    }
  }
}

/// Ordered cache steps run after a successful write.
pub struct CachePolicy<I, O> {
  steps: Vec<CacheAction<I, O>>,
  message: Option<MessageFn<I, O>>,
}

impl<I, O> Default for CachePolicy<I, O> {
  fn default() -> Self {
    Self {
      steps: Vec::new(),
      message: None,
    }
  }
}

impl<I, O> Clone for CachePolicy<I, O> {
  fn clone(&self) -> Self {
    Self {
      steps: self.steps.clone(),
      message: self.message.clone(),
    }
  }
}

impl<I: 'static, O: 'static> CachePolicy<I, O> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn invalidate(self, pattern: impl Into<KeyPattern>) -> Self {
    let pattern = pattern.into();
    self.invalidate_with(move |_, _| pattern.clone())
  }

  pub fn invalidate_with(
    mut self,
    pattern: impl Fn(&I, &O) -> KeyPattern + Send + Sync + 'static,
  ) -> Self {
    self.steps.push(CacheAction::Invalidate(Arc::new(pattern)));
    self
  }

  pub fn remove(self, pattern: impl Into<KeyPattern>) -> Self {
    let pattern = pattern.into();
    self.remove_with(move |_, _| pattern.clone())
  }

  pub fn remove_with(mut self, pattern: impl Fn(&I, &O) -> KeyPattern + Send + Sync + 'static) -> Self {
    self.steps.push(CacheAction::Remove(Arc::new(pattern)));
    self
  }

  pub fn set_data(
    mut self,
    key: impl Fn(&I, &O) -> QueryKey + Send + Sync + 'static,
    update: impl Fn(&I, &O, Option<&Value>) -> Option<Value> + Send + Sync + 'static,
  ) -> Self {
    self
      .steps
      .push(CacheAction::SetData(Arc::new(key), Arc::new(update)));
    self
  }

  /// Replace a key's data with the write's result.
  pub fn set_result(self, key: impl Fn(&I, &O) -> QueryKey + Send + Sync + 'static) -> Self
  where
    O: Serialize,
  {
    self.set_data(key, |_, output, _| serde_json::to_value(output).ok())
  }

  /// Run `step` against the query client, in order with the other steps.
  pub fn custom(mut self, step: impl Fn(&QueryClient, &I, &O) + Send + Sync + 'static) -> Self {
    self.steps.push(CacheAction::Custom(Arc::new(step)));
    self
  }

  /// Success toast.
  pub fn notify(mut self, message: impl Fn(&I, &O) -> String + Send + Sync + 'static) -> Self {
    self.message = Some(Arc::new(message));
    self
  }

  pub fn steps(&self) -> &[CacheAction<I, O>] {
    &self.steps
  }

  fn apply(&self, queries: &QueryClient, input: &I, output: &O) {
    for step in &self.steps {
      match step {
        CacheAction::Invalidate(pattern) => {
          let pattern = pattern(input, output);
          let matched = queries.invalidate(&pattern);
          debug!(%pattern, matched = matched.len(), "policy invalidate");
        }
        CacheAction::Remove(pattern) => {
          let pattern = pattern(input, output);
          let removed = queries.remove(&pattern);
          debug!(%pattern, removed = removed.len(), "policy remove");
        }
        CacheAction::SetData(key, update) => {
          let key = key(input, output);
          let written = queries.set_query_data(&key, |current| update(input, output, current));
          debug!(key = %key, written, "policy set data");
        }
        CacheAction::Custom(step) => step(queries, input, output),
      }
    }
  }
}

/// Failure handling for a mutation.
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
  /// Prefix of the failure toast, e.g. "Failed to create ticket"
  pub message: Option<String>,
}

impl ErrorPolicy {
  pub fn toast(message: impl Into<String>) -> Self {
    Self {
      message: Some(message.into()),
    }
  }

  /// No toast; the caller surfaces the error itself.
  pub fn silent() -> Self {
    Self::default()
  }
}

/// A write plus the cache policy that follows it.
pub struct Mutation<I, O> {
  name: &'static str,
  queries: QueryClient,
  mutate_fn: MutateFn<I, O>,
  on_success: CachePolicy<I, O>,
  on_error: ErrorPolicy,
  notifier: Arc<dyn Notifier>,
}

impl<I, O> Clone for Mutation<I, O> {
  fn clone(&self) -> Self {
    Self {
      name: self.name,
      queries: self.queries.clone(),
      mutate_fn: self.mutate_fn.clone(),
      on_success: self.on_success.clone(),
      on_error: self.on_error.clone(),
      notifier: self.notifier.clone(),
    }
  }
}

impl<I, O> fmt::Debug for Mutation<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mutation")
      .field("name", &self.name)
      .field("steps", &self.on_success.steps.len())
      .field("on_error", &self.on_error)
      .finish_non_exhaustive()
  }
}

impl<I, O> Mutation<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  pub fn new<F, Fut>(queries: &QueryClient, mutate_fn: F) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
  {
    Self {
      name: "mutation",
      queries: queries.clone(),
      mutate_fn: Arc::new(move |input| mutate_fn(input).boxed()),
      on_success: CachePolicy::default(),
      on_error: ErrorPolicy::default(),
      notifier: Arc::new(TracingNotifier),
    }
  }

  /// Name used in logs.
  pub fn named(mut self, name: &'static str) -> Self {
    self.name = name;
    self
  }

  pub fn on_success(mut self, policy: CachePolicy<I, O>) -> Self {
    self.on_success = policy;
    self
  }

  pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
    self.on_error = policy;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl<I, O> Mutation<I, O>
where
  I: Clone + Send + 'static,
  O: Send + 'static,
{
  /// Run the write, then its cache policy.
  ///
  /// The policy only runs after a confirmed success; a failure leaves the
  /// cache untouched and is returned to the caller.
  pub async fn mutate(&self, input: I) -> Result<O, ApiError> {
    debug!(mutation = self.name, "mutate");
    match (self.mutate_fn)(input.clone()).await {
      Ok(output) => {
        info!(mutation = self.name, "mutation succeeded");
        self.on_success.apply(&self.queries, &input, &output);
        if let Some(message) = &self.on_success.message {
          self.notifier.notify(Toast::success(message(&input, &output)));
        }
        Ok(output)
      }
      Err(error) => {
        warn!(mutation = self.name, %error, "mutation failed");
        if !error.is_auth_error() {
          if let Some(prefix) = &self.on_error.message {
            self
              .notifier
              .notify(Toast::error(format!("{}: {}", prefix, error)));
          }
        }
        Err(error)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::TicketFilters;
  use crate::cache::{QueryCache, ResourceKind};
  use crate::query::RunnerConfig;
  use serde_json::json;
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingNotifier(Mutex<Vec<Toast>>);

  impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
      self.0.lock().unwrap().push(toast);
    }
  }

  fn seeded() -> QueryClient {
    let queries = QueryClient::new(QueryCache::new(), RunnerConfig::default());
    queries
      .cache()
      .set_data(&QueryKey::tickets(&TicketFilters::default()), json!({"count": 0}));
    queries
      .cache()
      .set_data(&QueryKey::unread_count(), json!({"count": 3}));
    queries
  }

  #[tokio::test]
  async fn test_success_applies_steps_in_order() {
    let queries = seeded();
    let notifier = Arc::new(RecordingNotifier::default());
    let mutation = Mutation::new(&queries, |id: u64| async move { Ok::<_, ApiError>(id) })
      .on_success(
        CachePolicy::<u64, u64>::new()
          .invalidate(ResourceKind::Tickets)
          .set_data(
            |_, _| QueryKey::unread_count(),
            |_, _, current| {
              let count = current?.get("count")?.as_u64()?;
              Some(json!({ "count": count.saturating_sub(1) }))
            },
          )
          .set_result(|id, _| QueryKey::ticket(*id))
          .notify(|id, _| format!("Done with #{}", id)),
      )
      .with_notifier(notifier.clone());

    assert_eq!(mutation.mutate(7).await, Ok(7));

    let cache = queries.cache();
    assert!(cache
      .get(&QueryKey::tickets(&TicketFilters::default()))
      .unwrap()
      .invalidated);
    assert_eq!(
      cache.get(&QueryKey::unread_count()).unwrap().data,
      Some(json!({"count": 2}))
    );
    assert_eq!(cache.get(&QueryKey::ticket(7)).unwrap().data, Some(json!(7)));
    assert_eq!(
      *notifier.0.lock().unwrap(),
      vec![Toast::success("Done with #7")]
    );
  }

  #[tokio::test]
  async fn test_failure_applies_no_step() {
    let queries = seeded();
    let notifier = Arc::new(RecordingNotifier::default());
    let mutation = Mutation::new(&queries, |_: ()| async {
      Err::<(), _>(ApiError::Server {
        status: 500,
        message: "boom".to_string(),
      })
    })
    .on_success(
      CachePolicy::new()
        .invalidate(ResourceKind::Tickets)
        .remove(QueryKey::unread_count()),
    )
    .on_error(ErrorPolicy::toast("Failed to save"))
    .with_notifier(notifier.clone());

    let result = mutation.mutate(()).await;

    assert!(matches!(result, Err(ApiError::Server { status: 500, .. })));
    let cache = queries.cache();
    assert!(
      !cache
        .get(&QueryKey::tickets(&TicketFilters::default()))
        .unwrap()
        .invalidated
    );
    assert!(cache.get(&QueryKey::unread_count()).is_some());
    let toasts = notifier.0.lock().unwrap();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, ToastLevel::Error);
    assert!(toasts[0].message.starts_with("Failed to save: "));
  }

  #[tokio::test]
  async fn test_auth_failure_has_no_toast() {
    let queries = seeded();
    let notifier = Arc::new(RecordingNotifier::default());
    let mutation = Mutation::new(&queries, |_: ()| async {
      Err::<(), _>(ApiError::Auth("token expired".to_string()))
    })
    .on_error(ErrorPolicy::toast("Failed to save"))
    .with_notifier(notifier.clone());

    assert!(mutation.mutate(()).await.unwrap_err().is_auth_error());
    assert!(notifier.0.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_remove_step_deletes_entry() {
    let queries = seeded();
    let mutation = Mutation::new(&queries, |_: ()| async { Ok::<_, ApiError>(()) })
      .on_success(CachePolicy::new().remove(QueryKey::unread_count()));

    mutation.mutate(()).await.unwrap();
    assert!(queries.cache().get(&QueryKey::unread_count()).is_none());
  }
}
