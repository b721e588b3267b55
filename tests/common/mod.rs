//! Shared fixtures for the data-sync integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use ticketdesk::api::{ApiClient, ClientBuilder};
use ticketdesk::cache::QueryCache;
use ticketdesk::config::{CacheConfig, PollingConfig};
use ticketdesk::mutation::{Mutations, ToastQueue};
use ticketdesk::queries::ResourceQueries;
use ticketdesk::query::{QueryClient, RunnerConfig};
use ticketdesk::session::{Credential, MemoryCredentialStore, SessionEvent, SessionGate};
use tokio::sync::mpsc;
use wiremock::MockServer;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(3);

/// One signed-in client: its own cache, runner, mutations and toasts.
pub struct Desk {
  pub api: ApiClient,
  pub queries: QueryClient,
  pub resources: ResourceQueries,
  pub mutations: Mutations,
  pub toasts: ToastQueue,
}

impl Desk {
  pub fn new(server: &MockServer, token: &str) -> Self {
    Self::with_polling(server, token, quiet_polling())
  }

  pub fn with_polling(server: &MockServer, token: &str, polling: PollingConfig) -> Self {
    let api = ClientBuilder::new()
      .base_url(server.uri())
      .token(token)
      .build()
      .expect("client builds");
    let queries = QueryClient::new(QueryCache::new(), fast_retry());
    let toasts = ToastQueue::new(Duration::from_secs(30));
    let mutations = Mutations::new(api.clone(), queries.clone(), Arc::new(toasts.clone()));
    let resources = ResourceQueries::new(api.clone(), queries.clone(), polling, CacheConfig::default());
    Self {
      api,
      queries,
      resources,
      mutations,
      toasts,
    }
  }
}

/// A session gate over an in-memory store holding `token`.
pub struct Session {
  pub gate: SessionGate,
  pub events: mpsc::UnboundedReceiver<SessionEvent>,
  pub store: Arc<MemoryCredentialStore>,
  pub desk: Desk,
}

impl Session {
  pub fn new(server: &MockServer, token: &str) -> Self {
    let desk = Desk::with_polling(server, "unused", quiet_polling());
    desk.api.set_token(None);
    let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new(token, None)));
    let (gate, events) = SessionGate::new(
      desk.api.clone(),
      desk.queries.clone(),
      store.clone(),
      Duration::from_millis(200),
    );
    Self {
      gate,
      events,
      store,
      desk,
    }
  }

  pub fn drain_events(&mut self) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      seen.push(event);
    }
    seen
  }
}

/// Polling slow enough that only explicit refetches hit the server.
pub fn quiet_polling() -> PollingConfig {
  PollingConfig {
    tickets_ms: 60_000,
    ticket_detail_ms: 60_000,
    comments_ms: 60_000,
    notifications_ms: 60_000,
  }
}

fn fast_retry() -> RunnerConfig {
  RunnerConfig {
    retry_delay: Duration::from_millis(20),
  }
}

pub fn user(id: u64, username: &str, role: &str) -> Value {
  json!({"id": id, "username": username, "email": format!("{}@example.edu", username), "role": role})
}

pub fn page(results: Vec<Value>) -> Value {
  json!({"count": results.len(), "next": null, "previous": null, "results": results})
}

pub fn ticket(id: u64, title: &str, status: &str) -> Value {
  json!({
    "id": id,
    "title": title,
    "description": "",
    "status": status,
    "created_by": {"id": 1, "username": "stu"},
    "assigned_to": {"id": 9, "username": "ict"}
  })
}

pub fn notification(id: u64, message: &str, is_read: bool) -> Value {
  json!({"id": id, "message": message, "ticket": 42, "is_read": is_read})
}
