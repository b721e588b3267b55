//! Request and response types for the ticket tracker backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portal a user belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  #[default]
  Student,
  Staff,
  #[serde(alias = "ICT")]
  Ict,
  #[serde(alias = "superadmin", alias = "super-admin")]
  SuperAdmin,
}

impl Role {
  pub fn label(&self) -> &'static str {
    match self {
      Role::Student => "Student",
      Role::Staff => "Staff",
      Role::Ict => "ICT",
      Role::SuperAdmin => "Super Admin",
    }
  }
}

/// Full user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub username: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub role: Role,
}

impl User {
  pub fn display_name(&self) -> String {
    let full = format!("{} {}", self.first_name, self.last_name);
    let full = full.trim();
    if full.is_empty() {
      self.username.clone()
    } else {
      full.to_string()
    }
  }
}

/// User reference embedded in tickets and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
  pub id: u64,
  pub username: String,
  #[serde(default)]
  pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  #[default]
  Open,
  InProgress,
  Resolved,
  Closed,
}

impl TicketStatus {
  pub const ALL: [TicketStatus; 4] = [
    TicketStatus::Open,
    TicketStatus::InProgress,
    TicketStatus::Resolved,
    TicketStatus::Closed,
  ];

  /// Wire value, also used as the `status` filter parameter
  pub fn as_str(&self) -> &'static str {
    match self {
      TicketStatus::Open => "open",
      TicketStatus::InProgress => "in_progress",
      TicketStatus::Resolved => "resolved",
      TicketStatus::Closed => "closed",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      TicketStatus::Open => "Open",
      TicketStatus::InProgress => "In Progress",
      TicketStatus::Resolved => "Resolved",
      TicketStatus::Closed => "Closed",
    }
  }

  /// Next status in the workflow, wrapping around
  pub fn next(&self) -> TicketStatus {
    match self {
      TicketStatus::Open => TicketStatus::InProgress,
      TicketStatus::InProgress => TicketStatus::Resolved,
      TicketStatus::Resolved => TicketStatus::Closed,
      TicketStatus::Closed => TicketStatus::Open,
    }
  }
}

/// Ticket record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
  pub id: u64,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub status: TicketStatus,
  #[serde(default)]
  pub priority: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub created_by: Option<UserSummary>,
  #[serde(default)]
  pub assigned_to: Option<UserSummary>,
  #[serde(default)]
  pub screenshot: Option<String>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

/// Paginated list envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub count: u64,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub previous: Option<String>,
  pub results: Vec<T>,
}

impl<T> Default for Page<T> {
  fn default() -> Self {
    Self {
      count: 0,
      next: None,
      previous: None,
      results: Vec::new(),
    }
  }
}

/// Screenshot attached to a new ticket, sent as multipart
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
  pub file_name: String,
  pub mime: String,
  pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewTicket {
  pub title: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip)]
  pub screenshot: Option<Screenshot>,
}

/// Partial ticket update (PATCH); absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TicketStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignTicket {
  pub assigned_to_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
  pub id: u64,
  #[serde(default)]
  pub ticket: Option<u64>,
  #[serde(default)]
  pub author: Option<UserSummary>,
  pub message: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewComment {
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub id: u64,
  #[serde(default)]
  pub title: Option<String>,
  pub message: String,
  #[serde(default)]
  pub ticket: Option<u64>,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
  #[serde(alias = "unread_count")]
  pub count: u64,
}

/// Ticket counters shown on dashboards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
  #[serde(default)]
  pub total_tickets: u64,
  #[serde(default)]
  pub open_tickets: u64,
  #[serde(default)]
  pub in_progress_tickets: u64,
  #[serde(default)]
  pub resolved_tickets: u64,
  #[serde(default)]
  pub closed_tickets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRequest {
  pub username: String,
  pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
  #[serde(alias = "token", alias = "access_token")]
  pub access: String,
  #[serde(default)]
  pub refresh: Option<String>,
  #[serde(default)]
  pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterRequest {
  pub username: String,
  pub email: String,
  pub password: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub first_name: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub last_name: String,
  pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogoutRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub refresh: Option<String>,
}

/// Profile or admin user update (PATCH)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUser {
  pub username: String,
  pub email: String,
  pub password: String,
  pub role: Role,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_role_aliases() {
    let role: Role = serde_json::from_str(r#""ICT""#).unwrap();
    assert_eq!(role, Role::Ict);
    let role: Role = serde_json::from_str(r#""superadmin""#).unwrap();
    assert_eq!(role, Role::SuperAdmin);
  }

  #[test]
  fn test_ticket_defaults() {
    let ticket: Ticket = serde_json::from_str(r#"{"id": 7, "title": "Printer jam"}"#).unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert!(ticket.assigned_to.is_none());
  }

  #[test]
  fn test_status_cycle() {
    let mut status = TicketStatus::Open;
    for _ in 0..TicketStatus::ALL.len() {
      status = status.next();
    }
    assert_eq!(status, TicketStatus::Open);
  }

  #[test]
  fn test_unread_count_alias() {
    let count: UnreadCount = serde_json::from_str(r#"{"unread_count": 4}"#).unwrap();
    assert_eq!(count.count, 4);
  }

  #[test]
  fn test_ticket_update_skips_absent_fields() {
    let update = TicketUpdate {
      status: Some(TicketStatus::Resolved),
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      serde_json::json!({"status": "resolved"})
    );
  }

  #[test]
  fn test_display_name_falls_back_to_username() {
    let user = User {
      id: 1,
      username: "jdoe".to_string(),
      email: String::new(),
      first_name: String::new(),
      last_name: String::new(),
      role: Role::Staff,
    };
    assert_eq!(user.display_name(), "jdoe");
  }
}
