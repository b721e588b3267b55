//! Standard reads: key, fetcher and options for every resource kind.

use std::time::Duration;

use crate::api::types::{Comment, Notification, Page, Role, Ticket, UnreadCount, User, UserStats};
use crate::api::{ApiClient, TicketFilters};
use crate::cache::{QueryKey, ResourceKind};
use crate::config::{CacheConfig, PollingConfig};
use crate::query::{fetcher, Fetcher, QueryClient, QueryHandle, QueryOptions};

/// Mounts resource queries with the configured polling and freshness.
#[derive(Clone)]
pub struct ResourceQueries {
  api: ApiClient,
  queries: QueryClient,
  polling: PollingConfig,
  cache: CacheConfig,
}

impl ResourceQueries {
  pub fn new(api: ApiClient, queries: QueryClient, polling: PollingConfig, cache: CacheConfig) -> Self {
    Self {
      api,
      queries,
      polling,
      cache,
    }
  }

  pub fn client(&self) -> &QueryClient {
    &self.queries
  }

  /// Options used for every key of `kind`.
  pub fn options_for(&self, kind: ResourceKind) -> QueryOptions {
    let ms = Duration::from_millis;
    let list_stale = ms(self.cache.list_stale_ms);
    let reference_stale = ms(self.cache.reference_stale_ms);
    let detail_gc = Duration::from_secs(self.cache.detail_gc_secs);

    match kind {
      ResourceKind::Tickets => {
        QueryOptions::realtime(ms(self.polling.tickets_ms)).with_stale_time(list_stale)
      }
      ResourceKind::TicketDetail => QueryOptions::realtime(ms(self.polling.ticket_detail_ms))
        .with_stale_time(list_stale)
        .with_gc_time(detail_gc),
      ResourceKind::Comments => QueryOptions::realtime(ms(self.polling.comments_ms))
        .with_stale_time(list_stale)
        .with_gc_time(detail_gc),
      ResourceKind::Notifications | ResourceKind::UnreadCount => {
        QueryOptions::realtime(ms(self.polling.notifications_ms)).with_stale_time(list_stale)
      }
      ResourceKind::Users | ResourceKind::UserStats | ResourceKind::CurrentUser => {
        QueryOptions::default().with_stale_time(reference_stale)
      }
    }
  }

  fn mount<T: serde::de::DeserializeOwned>(&self, key: QueryKey, fetch: Fetcher) -> QueryHandle<T> {
    let options = self.options_for(key.kind());
    self.queries.use_query(key, fetch, options)
  }

  pub fn tickets(&self, filters: &TicketFilters) -> QueryHandle<Page<Ticket>> {
    let api = self.api.clone();
    let owned = filters.clone();
    self.mount(
      QueryKey::tickets(filters),
      fetcher(move || {
        let api = api.clone();
        let filters = owned.clone();
        async move { api.tickets().list(&filters).await }
      }),
    )
  }

  pub fn ticket(&self, id: u64) -> QueryHandle<Ticket> {
    let api = self.api.clone();
    self.mount(
      QueryKey::ticket(id),
      fetcher(move || {
        let api = api.clone();
        async move { api.tickets().get(id).await }
      }),
    )
  }

  pub fn comments(&self, ticket_id: u64) -> QueryHandle<Vec<Comment>> {
    let api = self.api.clone();
    self.mount(
      QueryKey::comments(ticket_id),
      fetcher(move || {
        let api = api.clone();
        async move { api.comments().list(ticket_id).await }
      }),
    )
  }

  pub fn notifications(&self) -> QueryHandle<Vec<Notification>> {
    let api = self.api.clone();
    self.mount(
      QueryKey::notifications(),
      fetcher(move || {
        let api = api.clone();
        async move { api.notifications().list().await }
      }),
    )
  }

  pub fn unread_notifications(&self) -> QueryHandle<Vec<Notification>> {
    let api = self.api.clone();
    self.mount(
      QueryKey::unread_notifications(),
      fetcher(move || {
        let api = api.clone();
        async move { api.notifications().unread().await }
      }),
    )
  }

  pub fn unread_count(&self) -> QueryHandle<UnreadCount> {
    let api = self.api.clone();
    self.mount(
      QueryKey::unread_count(),
      fetcher(move || {
        let api = api.clone();
        async move { api.notifications().unread_count().await }
      }),
    )
  }

  pub fn users(&self, role: Option<Role>) -> QueryHandle<Page<User>> {
    let api = self.api.clone();
    self.mount(
      QueryKey::users(role),
      fetcher(move || {
        let api = api.clone();
        async move { api.users().list(role).await }
      }),
    )
  }

  pub fn user_stats(&self) -> QueryHandle<UserStats> {
    let api = self.api.clone();
    self.mount(
      QueryKey::user_stats(),
      fetcher(move || {
        let api = api.clone();
        async move { api.users().stats().await }
      }),
    )
  }

  pub fn current_user(&self) -> QueryHandle<User> {
    let api = self.api.clone();
    self.mount(
      QueryKey::current_user(),
      fetcher(move || {
        let api = api.clone();
        async move { api.users().me().await }
      }),
    )
  }
}

/// Ticket list a user lands on: students see what they filed, ICT staff
/// what is assigned to them, everyone else the whole queue.
pub fn default_filters(user: &User) -> TicketFilters {
  match user.role {
    Role::Student => TicketFilters::created_by(user.id),
    Role::Ict => TicketFilters::assigned_to(user.id),
    Role::Staff | Role::SuperAdmin => TicketFilters::default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ClientBuilder;
  use crate::cache::QueryCache;
  use crate::query::RunnerConfig;
  use serde_json::json;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn user(role: Role) -> User {
    User {
      id: 9,
      username: "sam".to_string(),
      email: String::new(),
      first_name: String::new(),
      last_name: String::new(),
      role,
    }
  }

  #[test]
  fn test_default_filters_by_role() {
    assert_eq!(default_filters(&user(Role::Student)), TicketFilters::created_by(9));
    assert_eq!(default_filters(&user(Role::Ict)), TicketFilters::assigned_to(9));
    assert_eq!(default_filters(&user(Role::Staff)), TicketFilters::default());
    assert_eq!(default_filters(&user(Role::SuperAdmin)), TicketFilters::default());
  }

  fn resources(server: &MockServer) -> ResourceQueries {
    let api = ClientBuilder::new()
      .base_url(server.uri())
      .token("t")
      .build()
      .unwrap();
    ResourceQueries::new(
      api,
      QueryClient::new(QueryCache::new(), RunnerConfig::default()),
      PollingConfig::default(),
      CacheConfig::default(),
    )
  }

  #[tokio::test]
  async fn test_options_per_kind() {
    let server = MockServer::start().await;
    let r = resources(&server);
    assert_eq!(
      r.options_for(ResourceKind::Tickets).refetch_interval,
      Some(Duration::from_millis(5000))
    );
    assert_eq!(
      r.options_for(ResourceKind::Comments).gc_time,
      Duration::from_secs(300)
    );
    assert_eq!(r.options_for(ResourceKind::CurrentUser).refetch_interval, None);
    assert_eq!(
      r.options_for(ResourceKind::UserStats).stale_after,
      Duration::from_secs(60)
    );
  }

  #[tokio::test]
  async fn test_filtered_ticket_list_sends_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/tickets/"))
      .and(query_param("assigned_to", "9"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{"id": 1, "title": "Printer jam", "status": "in_progress"}]
      })))
      .mount(&server)
      .await;
    let r = resources(&server);

    let mut handle = r.tickets(&default_filters(&user(Role::Ict)));
    assert!(
      handle
        .wait_until(Duration::from_secs(2), |h| h.data().is_some())
        .await
    );
    let page = handle.data().unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].title, "Printer jam");
  }
}
