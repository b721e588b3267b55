//! Ticket and notification flows across mounted queries and mutations.

mod common;

use color_eyre::Result;
use common::{notification, page, ticket, Desk, WAIT};
use serde_json::json;
use ticketdesk::api::types::NewTicket;
use ticketdesk::api::TicketFilters;
use ticketdesk::config::PollingConfig;
use ticketdesk::mutation::Toast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_created_ticket_reaches_open_list_and_assignee() -> Result<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/tickets/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![])))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/notifications/unread-count/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0})))
    .mount(&server)
    .await;

  let student = Desk::new(&server, "student-token");
  let ict = Desk::with_polling(
    &server,
    "ict-token",
    PollingConfig {
      notifications_ms: 100,
      ..common::quiet_polling()
    },
  );

  let mut list = student.resources.tickets(&TicketFilters::default());
  assert!(list.wait_until(WAIT, |h| h.data().is_some()).await);
  assert!(list.data().map(|p| p.results.is_empty()).unwrap_or(false));

  let mut unread = ict.resources.unread_count();
  assert!(unread.wait_until(WAIT, |h| h.data().is_some()).await);
  assert_eq!(unread.data().map(|c| c.count), Some(0));

  // From here on the backend knows about the new ticket
  Mock::given(method("POST"))
    .and(path("/tickets/"))
    .respond_with(ResponseTemplate::new(201).set_body_json(ticket(42, "Printer jam", "open")))
    .with_priority(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/tickets/"))
    .respond_with(
      ResponseTemplate::new(200).set_body_json(page(vec![ticket(42, "Printer jam", "open")])),
    )
    .with_priority(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/notifications/unread-count/"))
    .and(header("authorization", "Bearer ict-token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1})))
    .with_priority(1)
    .mount(&server)
    .await;

  let created = student
    .mutations
    .create_ticket()
    .mutate(NewTicket {
      title: "Printer jam".to_string(),
      description: "Floor 3 printer jammed repeatedly".to_string(),
      ..Default::default()
    })
    .await?;
  assert_eq!(created.id, 42);

  // Mounted list refetches because the mutation invalidated every ticket list
  assert!(
    list
      .wait_until(WAIT, |h| h
        .data()
        .map(|p| p.results.iter().any(|t| t.title == "Printer jam"))
        .unwrap_or(false))
      .await
  );
  // The assignee's badge catches up on its next poll
  assert!(
    unread
      .wait_until(WAIT, |h| h.data().map(|c| c.count) == Some(1))
      .await
  );
  assert_eq!(student.toasts.current(), Some(Toast::success("Ticket #42 created")));

  // The detail was seeded from the response, no fetch needed
  let detail = student.queries.get_query_data::<ticketdesk::api::types::Ticket>(
    &ticketdesk::cache::QueryKey::ticket(42),
  );
  assert_eq!(detail.map(|t| t.title), Some("Printer jam".to_string()));
  Ok(())
}

#[tokio::test]
async fn test_mark_read_updates_badge_and_lists_without_refetch() -> Result<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/notifications/unread-count/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 3})))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/notifications/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
      notification(1, "Ticket #42 assigned", false),
      notification(2, "New comment", false),
      notification(3, "Ticket #7 resolved", false),
    ])))
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/notifications/2/mark-read/"))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&server)
    .await;

  let desk = Desk::new(&server, "t");
  let mut count = desk.resources.unread_count();
  let mut list = desk.resources.notifications();
  assert!(count.wait_until(WAIT, |h| h.data().is_some()).await);
  assert!(list.wait_until(WAIT, |h| h.data().is_some()).await);

  desk.mutations.mark_notification_read().mutate(2).await?;

  count.poll();
  list.poll();
  assert_eq!(count.data().map(|c| c.count), Some(2));
  let read: Vec<u64> = list
    .data()
    .map(|items| items.iter().filter(|n| n.is_read).map(|n| n.id).collect())
    .unwrap_or_default();
  assert_eq!(read, vec![2]);
  Ok(())
}

#[tokio::test]
async fn test_failed_comment_keeps_thread_and_toasts() -> Result<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/comments/tickets/42/comments/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
      {"id": 1, "ticket": 42, "message": "Rebooted it", "author": {"id": 9, "username": "ict"}}
    ])))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/comments/tickets/42/comments/"))
    .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
    .mount(&server)
    .await;

  let desk = Desk::new(&server, "t");
  let mut thread = desk.resources.comments(42);
  assert!(thread.wait_until(WAIT, |h| h.data().is_some()).await);

  let result = desk
    .mutations
    .add_comment()
    .mutate((42, "Still broken".to_string()))
    .await;
  assert!(result.is_err());

  thread.poll();
  assert_eq!(thread.data().map(Vec::len), Some(1));
  let toast = desk.toasts.current().expect("error toast");
  assert!(toast.message.starts_with("Failed to add comment"));
  Ok(())
}
