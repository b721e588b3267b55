//! Session gate behavior against a live query runner.

mod common;

use color_eyre::Result;
use common::{page, ticket, user, Session, WAIT};
use serde_json::json;
use ticketdesk::api::TicketFilters;
use ticketdesk::session::{CredentialStore, SessionEvent, SessionState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_rejected_polls_end_the_session_once() -> Result<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/users/me/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(user(9, "ict", "ict")))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/users/auth/logout/"))
    .respond_with(ResponseTemplate::new(200))
    .mount(&server)
    .await;

  let mut s = Session::new(&server, "expired-soon");
  s.gate.initialize().await;
  assert_eq!(s.gate.state(), SessionState::Authenticated);
  assert!(s.drain_events().is_empty());

  // The credential is revoked server-side; every read now 401s
  Mock::given(method("GET"))
    .and(path("/tickets/"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/notifications/unread-count/"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
    .mount(&server)
    .await;

  // Both mounts fetch at once and both are rejected
  let _list = s.desk.resources.tickets(&TicketFilters::assigned_to(9));
  let _count = s.desk.resources.unread_count();

  let mut rx = s.gate.subscribe();
  let signed_out = tokio::time::timeout(WAIT, async {
    rx.wait_for(|snapshot| snapshot.state == SessionState::Unauthenticated)
      .await
      .is_ok()
  })
  .await?;
  assert!(signed_out);
  // Let any straggling teardown finish before counting redirects
  tokio::time::sleep(std::time::Duration::from_millis(300)).await;

  let redirects = s
    .drain_events()
    .into_iter()
    .filter(|e| *e == SessionEvent::RedirectToSignIn)
    .count();
  assert_eq!(redirects, 1);
  assert!(s.store.load()?.is_none());
  assert!(!s.desk.api.has_token());
  Ok(())
}

#[tokio::test]
async fn test_sign_in_replaces_previous_users_cache() -> Result<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/users/me/"))
    .respond_with(ResponseTemplate::new(401))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/users/auth/login/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "access": "fresh",
      "refresh": "r1",
      "user": user(1, "stu", "student")
    })))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/tickets/"))
    .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![ticket(1, "Wifi down", "open")])))
    .mount(&server)
    .await;

  let mut s = Session::new(&server, "stale");
  s.gate.initialize().await;
  assert_eq!(s.gate.state(), SessionState::Unauthenticated);
  let first = tokio::time::timeout(WAIT, s.events.recv()).await?;
  assert_eq!(first, Some(SessionEvent::RedirectToSignIn));

  let signed_in = s.gate.sign_in("stu", "hunter2").await?;
  assert_eq!(signed_in.username, "stu");
  assert_eq!(s.gate.state(), SessionState::Authenticated);
  assert_eq!(s.store.load()?.map(|c| c.access), Some("fresh".to_string()));
  assert!(matches!(s.drain_events().as_slice(), [SessionEvent::SignedIn(_)]));

  let mut list = s.desk.resources.tickets(&TicketFilters::created_by(1));
  assert!(list.wait_until(WAIT, |h| h.data().is_some()).await);
  Ok(())
}
