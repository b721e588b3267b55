//! Query keys and key patterns.

use std::collections::BTreeMap;
use std::fmt;

use crate::api::types::Role;
use crate::api::TicketFilters;

/// Resource family a query key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
  Tickets,
  TicketDetail,
  Comments,
  Notifications,
  UnreadCount,
  Users,
  UserStats,
  CurrentUser,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::Tickets => "tickets",
      ResourceKind::TicketDetail => "ticket-detail",
      ResourceKind::Comments => "comments",
      ResourceKind::Notifications => "notifications",
      ResourceKind::UnreadCount => "unread-count",
      ResourceKind::Users => "users",
      ResourceKind::UserStats => "user-stats",
      ResourceKind::CurrentUser => "current-user",
    }
  }

  /// Detail views keep their entries around after the last view unmounts.
  pub fn is_detail(&self) -> bool {
    matches!(self, ResourceKind::TicketDetail | ResourceKind::Comments)
  }
}

/// Cache key: a resource kind plus canonical parameters.
///
/// Parameters live in a `BTreeMap`, so keys built from the same values in any
/// order compare and hash equal. Blank values are dropped on insert, which
/// makes "filter unset" and "filter empty" the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  kind: ResourceKind,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(kind: ResourceKind) -> Self {
    Self {
      kind,
      params: BTreeMap::new(),
    }
  }

  /// Add a parameter; blank values are ignored.
  pub fn with(mut self, name: &str, value: impl ToString) -> Self {
    let value = value.to_string();
    let value = value.trim();
    if !value.is_empty() {
      self.params.insert(name.to_string(), value.to_string());
    }
    self
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn params(&self) -> &BTreeMap<String, String> {
    &self.params
  }

  pub fn param(&self, name: &str) -> Option<&str> {
    self.params.get(name).map(String::as_str)
  }

  pub fn tickets(filters: &TicketFilters) -> Self {
    filters
      .params()
      .into_iter()
      .fold(Self::new(ResourceKind::Tickets), |key, (name, value)| {
        key.with(name, value)
      })
  }

  pub fn ticket(id: u64) -> Self {
    Self::new(ResourceKind::TicketDetail).with("id", id)
  }

  pub fn comments(ticket_id: u64) -> Self {
    Self::new(ResourceKind::Comments).with("id", ticket_id)
  }

  pub fn notifications() -> Self {
    Self::new(ResourceKind::Notifications)
  }

  pub fn unread_notifications() -> Self {
    Self::new(ResourceKind::Notifications).with("unread", true)
  }

  pub fn unread_count() -> Self {
    Self::new(ResourceKind::UnreadCount)
  }

  pub fn users(role: Option<Role>) -> Self {
    let key = Self::new(ResourceKind::Users);
    match role {
      Some(role) => key.with("role", role.label().to_lowercase()),
      None => key,
    }
  }

  pub fn user_stats() -> Self {
    Self::new(ResourceKind::UserStats)
  }

  pub fn current_user() -> Self {
    Self::new(ResourceKind::CurrentUser)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.kind.as_str())?;
    for (i, (name, value)) in self.params.iter().enumerate() {
      let sep = if i == 0 { '?' } else { '&' };
      write!(f, "{}{}={}", sep, name, value)?;
    }
    Ok(())
  }
}

/// Selects cache keys for invalidation and removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  /// Every key of the kind, whatever its parameters.
  Kind(ResourceKind),
  /// Keys of the same kind whose parameters include all of these.
  Prefix(QueryKey),
  /// Exactly this key.
  Exact(QueryKey),
}

impl KeyPattern {
  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      KeyPattern::Kind(kind) => key.kind == *kind,
      KeyPattern::Prefix(prefix) => {
        prefix.kind == key.kind
          && prefix
            .params
            .iter()
            .all(|(name, value)| key.params.get(name) == Some(value))
      }
      KeyPattern::Exact(exact) => exact == key,
    }
  }
}

impl From<ResourceKind> for KeyPattern {
  fn from(kind: ResourceKind) -> Self {
    KeyPattern::Kind(kind)
  }
}

impl From<QueryKey> for KeyPattern {
  fn from(key: QueryKey) -> Self {
    KeyPattern::Exact(key)
  }
}

impl fmt::Display for KeyPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPattern::Kind(kind) => write!(f, "{}/*", kind.as_str()),
      KeyPattern::Prefix(key) => write!(f, "{}*", key),
      KeyPattern::Exact(key) => write!(f, "{}", key),
    }
  }
}
