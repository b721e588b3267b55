use chrono::{DateTime, Utc};
use ratatui::prelude::Color;
use ticketdesk::api::types::TicketStatus;

/// Truncate to `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn status_color(status: TicketStatus) -> Color {
  match status {
    TicketStatus::Open => Color::White,
    TicketStatus::InProgress => Color::Yellow,
    TicketStatus::Resolved => Color::Green,
    TicketStatus::Closed => Color::DarkGray,
  }
}

/// Coarse "5m ago" style age
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - at).num_seconds().max(0);
  match secs {
    0..=59 => "just now".to_string(),
    60..=3_599 => format!("{}m ago", secs / 60),
    3_600..=86_399 => format!("{}h ago", secs / 3_600),
    _ => format!("{}d ago", secs / 86_400),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("résumé printer", 7), "résu...");
  }

  #[test]
  fn test_status_color() {
    assert_eq!(status_color(TicketStatus::InProgress), Color::Yellow);
    assert_eq!(status_color(TicketStatus::Resolved), Color::Green);
    assert_eq!(status_color(TicketStatus::Open), Color::White);
  }

  #[test]
  fn test_relative_time() {
    let now = Utc::now();
    assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
    assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
    assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
    assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
    assert_eq!(relative_time(now + Duration::minutes(1), now), "just now");
  }
}
