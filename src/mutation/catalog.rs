//! Cache policy table for every write the backend exposes.
//!
//! | write                 | on success                                                      |
//! |-----------------------|-----------------------------------------------------------------|
//! | create ticket         | set detail; invalidate tickets, notifications, unread count, stats |
//! | update ticket         | set detail; invalidate tickets, notifications, unread count, stats |
//! | assign ticket         | set detail; invalidate tickets, notifications, unread count     |
//! | delete ticket         | remove detail and comments; invalidate tickets, stats           |
//! | add comment           | append to comments; invalidate notifications, unread count      |
//! | mark notification read| mark read in list; unread count - 1 if shown unread; drop from unread list |
//! | mark all read         | mark all read in list; unread count = 0; unread list = []       |
//! | delete notification   | drop from lists; invalidate unread count                        |
//! | update profile        | set current user; invalidate users                              |
//! | create/update user    | invalidate users, stats                                         |
//! | delete user           | invalidate users, stats, tickets                                |

use std::sync::Arc;

use serde_json::{json, Value};

use super::{CachePolicy, ErrorPolicy, Mutation, Notifier};
use crate::api::types::{
  Comment, NewTicket, NewUser, Ticket, TicketUpdate, User, UserUpdate,
};
use crate::api::ApiClient;
use crate::cache::{KeyPattern, QueryKey, ResourceKind};
use crate::query::QueryClient;

/// Builds the standard mutations, sharing one client, runner and notifier.
#[derive(Clone)]
pub struct Mutations {
  api: ApiClient,
  queries: QueryClient,
  notifier: Arc<dyn Notifier>,
}

impl Mutations {
  pub fn new(api: ApiClient, queries: QueryClient, notifier: Arc<dyn Notifier>) -> Self {
    Self {
      api,
      queries,
      notifier,
    }
  }

  fn build<I, O>(&self, mutation: Mutation<I, O>) -> Mutation<I, O>
  where
    I: Send + 'static,
    O: Send + 'static,
  {
    mutation.with_notifier(self.notifier.clone())
  }

  pub fn create_ticket(&self) -> Mutation<NewTicket, Ticket> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |ticket: NewTicket| {
        let api = api.clone();
        async move { api.tickets().create(&ticket).await }
      })
      .named("create_ticket")
      .on_success(
        CachePolicy::new()
          .set_result(|_, ticket: &Ticket| QueryKey::ticket(ticket.id))
          .invalidate(ResourceKind::Tickets)
          .invalidate(ResourceKind::Notifications)
          .invalidate(ResourceKind::UnreadCount)
          .invalidate(ResourceKind::UserStats)
          .notify(|_, ticket| format!("Ticket #{} created", ticket.id)),
      )
      .on_error(ErrorPolicy::toast("Failed to create ticket")),
    )
  }

  pub fn update_ticket(&self) -> Mutation<(u64, TicketUpdate), Ticket> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |(id, update): (u64, TicketUpdate)| {
        let api = api.clone();
        async move { api.tickets().update(id, &update).await }
      })
      .named("update_ticket")
      .on_success(
        CachePolicy::new()
          .set_result(|_, ticket: &Ticket| QueryKey::ticket(ticket.id))
          .invalidate(ResourceKind::Tickets)
          .invalidate(ResourceKind::Notifications)
          .invalidate(ResourceKind::UnreadCount)
          .invalidate(ResourceKind::UserStats)
          .notify(|_, ticket| format!("Ticket #{} updated", ticket.id)),
      )
      .on_error(ErrorPolicy::toast("Failed to update ticket")),
    )
  }

  pub fn assign_ticket(&self) -> Mutation<(u64, u64), Ticket> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |(id, assignee): (u64, u64)| {
        let api = api.clone();
        async move { api.tickets().assign(id, assignee).await }
      })
      .named("assign_ticket")
      .on_success(
        CachePolicy::new()
          .set_result(|_, ticket: &Ticket| QueryKey::ticket(ticket.id))
          .invalidate(ResourceKind::Tickets)
          .invalidate(ResourceKind::Notifications)
          .invalidate(ResourceKind::UnreadCount)
          .notify(|_, ticket| format!("Ticket #{} assigned", ticket.id)),
      )
      .on_error(ErrorPolicy::toast("Failed to assign ticket")),
    )
  }

  pub fn delete_ticket(&self) -> Mutation<u64, ()> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |id: u64| {
        let api = api.clone();
        async move { api.tickets().delete(id).await }
      })
      .named("delete_ticket")
      .on_success(
        CachePolicy::new()
          .remove_with(|id: &u64, _| KeyPattern::Exact(QueryKey::ticket(*id)))
          .remove_with(|id: &u64, _| KeyPattern::Exact(QueryKey::comments(*id)))
          .invalidate(ResourceKind::Tickets)
          .invalidate(ResourceKind::UserStats)
          .notify(|id, _| format!("Ticket #{} deleted", id)),
      )
      .on_error(ErrorPolicy::toast("Failed to delete ticket")),
    )
  }

  pub fn add_comment(&self) -> Mutation<(u64, String), Comment> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |(ticket_id, message): (u64, String)| {
        let api = api.clone();
        async move { api.comments().create(ticket_id, message).await }
      })
      .named("add_comment")
      .on_success(
        CachePolicy::new()
          .set_data(
            |(ticket_id, _): &(u64, String), _| QueryKey::comments(*ticket_id),
            |_, comment: &Comment, current| append(current, serde_json::to_value(comment).ok()?),
          )
          .invalidate(ResourceKind::Notifications)
          .invalidate(ResourceKind::UnreadCount)
          .notify(|_, _| "Comment added".to_string()),
      )
      .on_error(ErrorPolicy::toast("Failed to add comment")),
    )
  }

  pub fn mark_notification_read(&self) -> Mutation<u64, ()> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |id: u64| {
        let api = api.clone();
        async move { api.notifications().mark_read(id).await }
      })
      .named("mark_notification_read")
      .on_success(
        CachePolicy::new()
          .custom(|queries: &QueryClient, id: &u64, _| {
            if shown_unread(queries, *id) {
              queries.set_query_data(&QueryKey::unread_count(), |current| {
                adjust_count(current, |count| count.saturating_sub(1))
              });
            }
          })
          .set_data(|_, _| QueryKey::notifications(), |id: &u64, _, current| {
            mark_read(current, Some(*id))
          })
          .set_data(|_, _| QueryKey::unread_notifications(), |id: &u64, _, current| {
            drop_item(current, *id)
          }),
      )
      .on_error(ErrorPolicy::toast("Failed to mark notification read")),
    )
  }

  pub fn mark_all_read(&self) -> Mutation<(), ()> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |_: ()| {
        let api = api.clone();
        async move { api.notifications().mark_all_read().await }
      })
      .named("mark_all_read")
      .on_success(
        CachePolicy::new()
          .set_data(|_, _| QueryKey::unread_count(), |_, _, current| {
            adjust_count(current, |_| 0)
          })
          .set_data(|_, _| QueryKey::notifications(), |_, _, current| mark_read(current, None))
          .set_data(|_, _| QueryKey::unread_notifications(), |_, _, _| Some(json!([])))
          .notify(|_, _| "All notifications marked read".to_string()),
      )
      .on_error(ErrorPolicy::toast("Failed to mark notifications read")),
    )
  }

  pub fn delete_notification(&self) -> Mutation<u64, ()> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |id: u64| {
        let api = api.clone();
        async move { api.notifications().delete(id).await }
      })
      .named("delete_notification")
      .on_success(
        CachePolicy::new()
          .set_data(|_, _| QueryKey::notifications(), |id: &u64, _, current| {
            drop_item(current, *id)
          })
          .set_data(|_, _| QueryKey::unread_notifications(), |id: &u64, _, current| {
            drop_item(current, *id)
          })
          .invalidate(QueryKey::unread_count())
          .notify(|_, _| "Notification deleted".to_string()),
      )
      .on_error(ErrorPolicy::toast("Failed to delete notification")),
    )
  }

  pub fn update_profile(&self) -> Mutation<UserUpdate, User> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |update: UserUpdate| {
        let api = api.clone();
        async move { api.users().update_profile(&update).await }
      })
      .named("update_profile")
      .on_success(
        CachePolicy::new()
          .set_result(|_, _| QueryKey::current_user())
          .invalidate(ResourceKind::Users)
          .notify(|_, _| "Profile updated".to_string()),
      )
      .on_error(ErrorPolicy::toast("Failed to update profile")),
    )
  }

  pub fn create_user(&self) -> Mutation<NewUser, User> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |user: NewUser| {
        let api = api.clone();
        async move { api.users().create(&user).await }
      })
      .named("create_user")
      .on_success(
        CachePolicy::new()
          .invalidate(ResourceKind::Users)
          .invalidate(ResourceKind::UserStats)
          .notify(|_, user: &User| format!("User {} created", user.username)),
      )
      .on_error(ErrorPolicy::toast("Failed to create user")),
    )
  }

  pub fn update_user(&self) -> Mutation<(u64, UserUpdate), User> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |(id, update): (u64, UserUpdate)| {
        let api = api.clone();
        async move { api.users().update(id, &update).await }
      })
      .named("update_user")
      .on_success(
        CachePolicy::new()
          .invalidate(ResourceKind::Users)
          .invalidate(ResourceKind::UserStats)
          .notify(|_, user: &User| format!("User {} updated", user.username)),
      )
      .on_error(ErrorPolicy::toast("Failed to update user")),
    )
  }

  pub fn delete_user(&self) -> Mutation<u64, ()> {
    let api = self.api.clone();
    self.build(
      Mutation::new(&self.queries, move |id: u64| {
        let api = api.clone();
        async move { api.users().delete(id).await }
      })
      .named("delete_user")
      .on_success(
        CachePolicy::new()
          .invalidate(ResourceKind::Users)
          .invalidate(ResourceKind::UserStats)
          .invalidate(ResourceKind::Tickets)
          .notify(|id, _| format!("User #{} deleted", id)),
      )
      .on_error(ErrorPolicy::toast("Failed to delete user")),
    )
  }
}

/// Rewrite the `count` field of an unread-count payload.
fn adjust_count(current: Option<&Value>, f: impl FnOnce(u64) -> u64) -> Option<Value> {
  let count = current?.get("count")?.as_u64()?;
  Some(json!({ "count": f(count) }))
}

/// Whether the cached notification lists still show `id` as unread.
///
/// With neither list cached there is nothing to go on and the answer is yes.
fn shown_unread(queries: &QueryClient, id: u64) -> bool {
  let all = queries.get_query_data::<Value>(&QueryKey::notifications());
  let unread = queries.get_query_data::<Value>(&QueryKey::unread_notifications());
  if all.is_none() && unread.is_none() {
    return true;
  }
  let find = |list: &Value| {
    list
      .as_array()
      .and_then(|items| items.iter().find(|item| item.get("id").and_then(Value::as_u64) == Some(id)))
      .cloned()
  };
  let unread_in_all = all
    .as_ref()
    .and_then(find)
    .is_some_and(|item| item.get("is_read").and_then(Value::as_bool) != Some(true));
  let in_unread = unread.as_ref().and_then(find).is_some();
  unread_in_all || in_unread
}

/// Flag one notification (or all of them) as read in a cached list.
fn mark_read(current: Option<&Value>, id: Option<u64>) -> Option<Value> {
  let mut items = current?.as_array()?.clone();
  for item in items.iter_mut() {
    let matches = id.map_or(true, |id| item.get("id").and_then(Value::as_u64) == Some(id));
    if matches {
      if let Some(fields) = item.as_object_mut() {
        fields.insert("is_read".to_string(), Value::Bool(true));
      }
    }
  }
  Some(Value::Array(items))
}

fn drop_item(current: Option<&Value>, id: u64) -> Option<Value> {
  let items = current?.as_array()?;
  let kept: Vec<Value> = items
    .iter()
    .filter(|item| item.get("id").and_then(Value::as_u64) != Some(id))
    .cloned()
    .collect();
  Some(Value::Array(kept))
}

/// Append to a cached list; skipped when the list was never loaded.
fn append(current: Option<&Value>, item: Value) -> Option<Value> {
  let mut items = current?.as_array()?.clone();
  items.push(item);
  Some(Value::Array(items))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ClientBuilder, TicketFilters};
  use crate::cache::QueryCache;
  use crate::mutation::{Toast, ToastLevel, ToastQueue};
  use crate::query::RunnerConfig;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn setup(server: &MockServer) -> (Mutations, QueryClient, ToastQueue) {
    let api = ClientBuilder::new()
      .base_url(server.uri())
      .token("test-token")
      .build()
      .unwrap();
    let queries = QueryClient::new(QueryCache::new(), RunnerConfig::default());
    let toasts = ToastQueue::new(Duration::from_secs(5));
    let mutations = Mutations::new(api, queries.clone(), Arc::new(toasts.clone()));
    (mutations, queries, toasts)
  }

  #[tokio::test]
  async fn test_mark_read_decrements_unread_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/notifications/5/mark-read/"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
      .expect(1)
      .mount(&server)
      .await;
    let (mutations, queries, _) = setup(&server).await;
    queries
      .cache()
      .set_data(&QueryKey::unread_count(), json!({"count": 3}));
    queries.cache().set_data(
      &QueryKey::notifications(),
      json!([
        {"id": 5, "message": "Ticket #1 assigned", "is_read": false},
        {"id": 6, "message": "New comment", "is_read": false}
      ]),
    );

    mutations.mark_notification_read().mutate(5).await.unwrap();

    let cache = queries.cache();
    assert_eq!(
      cache.get(&QueryKey::unread_count()).unwrap().data,
      Some(json!({"count": 2}))
    );
    let list = cache.get(&QueryKey::notifications()).unwrap();
    let list = list.data.as_ref().unwrap();
    assert_eq!(list[0]["is_read"], json!(true));
    assert_eq!(list[1]["is_read"], json!(false));
  }

  #[tokio::test]
  async fn test_repeated_mark_read_decrements_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/notifications/5/mark-read/"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
      .expect(2)
      .mount(&server)
      .await;
    let (mutations, queries, _) = setup(&server).await;
    queries
      .cache()
      .set_data(&QueryKey::unread_count(), json!({"count": 3}));
    queries.cache().set_data(
      &QueryKey::notifications(),
      json!([{"id": 5, "message": "Ticket #1 assigned", "is_read": false}]),
    );

    let mark_read = mutations.mark_notification_read();
    mark_read.mutate(5).await.unwrap();
    mark_read.mutate(5).await.unwrap();

    assert_eq!(
      queries.cache().get(&QueryKey::unread_count()).unwrap().data,
      Some(json!({"count": 2}))
    );
  }

  #[tokio::test]
  async fn test_mark_read_from_unread_list_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/notifications/8/mark-read/"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
      .mount(&server)
      .await;
    let (mutations, queries, _) = setup(&server).await;
    queries
      .cache()
      .set_data(&QueryKey::unread_count(), json!({"count": 1}));
    queries.cache().set_data(
      &QueryKey::unread_notifications(),
      json!([{"id": 8, "message": "New comment", "is_read": false}]),
    );

    let mark_read = mutations.mark_notification_read();
    mark_read.mutate(8).await.unwrap();
    mark_read.mutate(8).await.unwrap();

    let cache = queries.cache();
    assert_eq!(
      cache.get(&QueryKey::unread_count()).unwrap().data,
      Some(json!({"count": 0}))
    );
    assert_eq!(
      cache.get(&QueryKey::unread_notifications()).unwrap().data,
      Some(json!([]))
    );
  }

  #[tokio::test]
  async fn test_mark_all_read_zeroes_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/notifications/mark-all-read/"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;
    let (mutations, queries, toasts) = setup(&server).await;
    queries
      .cache()
      .set_data(&QueryKey::unread_count(), json!({"count": 9}));

    mutations.mark_all_read().mutate(()).await.unwrap();

    assert_eq!(
      queries.cache().get(&QueryKey::unread_count()).unwrap().data,
      Some(json!({"count": 0}))
    );
    assert_eq!(
      queries.cache().get(&QueryKey::unread_notifications()).unwrap().data,
      Some(json!([]))
    );
    assert_eq!(
      toasts.current(),
      Some(Toast::success("All notifications marked read"))
    );
  }

  #[tokio::test]
  async fn test_create_ticket_writes_detail_and_invalidates_lists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/tickets/"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({
        "id": 42,
        "title": "Printer jam",
        "description": "Floor 3 printer jammed repeatedly",
        "status": "open"
      })))
      .mount(&server)
      .await;
    let (mutations, queries, toasts) = setup(&server).await;
    let list = QueryKey::tickets(&TicketFilters::default());
    queries.cache().set_data(&list, json!({"count": 0, "results": []}));
    queries
      .cache()
      .set_data(&QueryKey::notifications(), json!([]));

    let ticket = mutations
      .create_ticket()
      .mutate(NewTicket {
        title: "Printer jam".to_string(),
        description: "Floor 3 printer jammed repeatedly".to_string(),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(ticket.id, 42);
    let cache = queries.cache();
    assert!(cache.get(&list).unwrap().invalidated);
    assert!(cache.get(&QueryKey::notifications()).unwrap().invalidated);
    let detail: Ticket = queries.get_query_data(&QueryKey::ticket(42)).unwrap();
    assert_eq!(detail.title, "Printer jam");
    assert_eq!(toasts.current(), Some(Toast::success("Ticket #42 created")));
  }

  #[tokio::test]
  async fn test_failed_write_toasts_and_leaves_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/tickets/"))
      .respond_with(
        ResponseTemplate::new(400).set_body_json(json!({"title": ["This field is required."]})),
      )
      .mount(&server)
      .await;
    let (mutations, queries, toasts) = setup(&server).await;
    let list = QueryKey::tickets(&TicketFilters::default());
    queries.cache().set_data(&list, json!({"count": 0, "results": []}));

    let err = mutations
      .create_ticket()
      .mutate(NewTicket::default())
      .await
      .unwrap_err();

    assert!(matches!(err, crate::api::ApiError::Validation { .. }));
    assert!(!queries.cache().get(&list).unwrap().invalidated);
    let toast = toasts.current().unwrap();
    assert_eq!(toast.level, ToastLevel::Error);
    assert!(toast.message.starts_with("Failed to create ticket"));
  }

  #[tokio::test]
  async fn test_add_comment_appends_to_loaded_thread() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/comments/tickets/7/comments/"))
      .respond_with(
        ResponseTemplate::new(201).set_body_json(json!({"id": 2, "message": "On my way"})),
      )
      .mount(&server)
      .await;
    let (mutations, queries, _) = setup(&server).await;
    queries
      .cache()
      .set_data(&QueryKey::comments(7), json!([{"id": 1, "message": "Still broken"}]));

    mutations
      .add_comment()
      .mutate((7, "On my way".to_string()))
      .await
      .unwrap();

    let thread: Vec<Comment> = queries.get_query_data(&QueryKey::comments(7)).unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].message, "On my way");
  }

  #[test]
  fn test_list_helpers() {
    let list = json!([{"id": 1}, {"id": 2}]);
    assert_eq!(drop_item(Some(&list), 1), Some(json!([{"id": 2}])));
    assert_eq!(drop_item(None, 1), None);
    assert_eq!(adjust_count(Some(&json!({"count": 0})), |c| c.saturating_sub(1)), Some(json!({"count": 0})));
    assert_eq!(append(None, json!(1)), None);
  }
}
