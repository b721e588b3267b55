use std::time::Duration;

use crate::cache::EntryConfig;

/// Per-observer query options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// When false the observer never triggers a fetch (e.g. no credential yet)
  pub enabled: bool,
  pub stale_after: Duration,
  pub refetch_interval: Option<Duration>,
  pub refetch_on_window_focus: bool,
  pub refetch_on_reconnect: bool,
  /// Refetch stale data when mounting; missing data is always fetched
  pub refetch_on_mount: bool,
  /// How long the entry survives once nothing observes it
  pub gc_time: Duration,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_after: Duration::ZERO,
      refetch_interval: None,
      refetch_on_window_focus: true,
      refetch_on_reconnect: true,
      refetch_on_mount: true,
      gc_time: Duration::ZERO,
    }
  }
}

impl QueryOptions {
  /// Options for views that must stay fresh without push delivery:
  /// always stale, polled at `interval`, refetched on focus and reconnect.
  pub fn realtime(interval: Duration) -> Self {
    Self::default().with_refetch_interval(interval)
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_after = duration;
    self
  }

  pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
    self.refetch_interval = Some(interval);
    self
  }

  pub fn with_gc_time(mut self, duration: Duration) -> Self {
    self.gc_time = duration;
    self
  }

  pub fn refetch_on_window_focus(mut self, refetch: bool) -> Self {
    self.refetch_on_window_focus = refetch;
    self
  }

  pub fn refetch_on_reconnect(mut self, refetch: bool) -> Self {
    self.refetch_on_reconnect = refetch;
    self
  }

  pub fn refetch_on_mount(mut self, refetch: bool) -> Self {
    self.refetch_on_mount = refetch;
    self
  }

  pub(crate) fn entry_config(&self) -> EntryConfig {
    EntryConfig {
      stale_after: self.stale_after,
      refetch_interval: self.refetch_interval,
      gc_time: self.gc_time,
    }
  }
}

/// Runner-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
  /// Pause before the single automatic retry of a failed fetch
  pub retry_delay: Duration,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      retry_delay: Duration::from_secs(1),
    }
  }
}
