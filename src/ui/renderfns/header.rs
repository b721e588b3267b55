use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use ticketdesk::api::types::User;

/// What the header shows besides the view shortcuts
pub struct HeaderInfo<'a> {
  pub title: &'a str,
  pub user: Option<&'a User>,
  pub unread: Option<u64>,
  pub online: bool,
}

/// Draw the header bar with title, signed-in user, unread badge and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo, shortcuts: &[ShortcutInfo]) {
  let sep = || Span::styled("│", Style::default().fg(Color::DarkGray));

  let mut spans = vec![
    Span::styled(" ticketdesk ", Style::default().fg(Color::Cyan).bold()),
    sep(),
    Span::styled(format!(" {} ", info.title), Style::default().fg(Color::White)),
    sep(),
  ];

  match info.user {
    Some(user) => spans.push(Span::styled(
      format!(" {} ({}) ", user.display_name(), user.role.label()),
      Style::default().fg(Color::Yellow).bold(),
    )),
    None => spans.push(Span::styled(" … ", Style::default().fg(Color::DarkGray))),
  }
  spans.push(sep());
  spans.push(unread_badge(info.unread));

  if !info.online {
    spans.push(sep());
    spans.push(Span::styled(" offline ", Style::default().fg(Color::Red).bold()));
  }

  spans.push(Span::raw("  "));
  let mut shortcuts: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    spans.push(Span::styled(format!("<{}>", shortcut.key), Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(format!(" {}   ", shortcut.label), Style::default().fg(Color::DarkGray)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn unread_badge(unread: Option<u64>) -> Span<'static> {
  match unread {
    Some(0) => Span::styled(" no unread ", Style::default().fg(Color::DarkGray)),
    Some(n) => Span::styled(format!(" {} unread ", n), Style::default().fg(Color::Magenta).bold()),
    None => Span::styled(" - ", Style::default().fg(Color::DarkGray)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unread_badge() {
    assert_eq!(unread_badge(Some(3)).content, " 3 unread ");
    assert_eq!(unread_badge(Some(0)).content, " no unread ");
    assert_eq!(unread_badge(None).content, " - ");
  }
}
