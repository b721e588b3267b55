use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
  pub level: ToastLevel,
  pub message: String,
}

impl Toast {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: ToastLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: ToastLevel::Error,
      message: message.into(),
    }
  }
}

/// Sink for mutation success/failure notifications.
pub trait Notifier: Send + Sync {
  fn notify(&self, toast: Toast);
}

/// Writes toasts to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, toast: Toast) {
    match toast.level {
      ToastLevel::Success => info!(message = %toast.message, "toast"),
      ToastLevel::Error => error!(message = %toast.message, "toast"),
    }
  }
}

/// Queue of recent toasts, read by the UI status line.
///
/// Each toast is shown for `ttl` after it is posted.
#[derive(Clone)]
pub struct ToastQueue {
  ttl: Duration,
  toasts: Arc<Mutex<VecDeque<(Instant, Toast)>>>,
}

const MAX_TOASTS: usize = 16;

impl ToastQueue {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      toasts: Arc::new(Mutex::new(VecDeque::new())),
    }
  }

  /// Most recent toast that has not expired.
  pub fn current(&self) -> Option<Toast> {
    let mut toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
    let ttl = self.ttl;
    toasts.retain(|(posted, _)| posted.elapsed() < ttl);
    toasts.back().map(|(_, toast)| toast.clone())
  }

  pub fn len(&self) -> usize {
    self
      .toasts
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Notifier for ToastQueue {
  fn notify(&self, toast: Toast) {
    TracingNotifier.notify(toast.clone());
    let mut toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
    if toasts.len() == MAX_TOASTS {
      toasts.pop_front();
    }
    toasts.push_back((Instant::now(), toast));
  }
}
