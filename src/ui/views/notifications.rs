use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{relative_time, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::TicketDetailView;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ticketdesk::api::types::Notification;
use ticketdesk::query::QueryHandle;

pub struct NotificationsView {
  ctx: ViewContext,
  unread_only: bool,
  query: QueryHandle<Vec<Notification>>,
  list_state: ListState,
}

impl NotificationsView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = ctx.resources.notifications();
    Self {
      ctx,
      unread_only: false,
      query,
      list_state: ListState::default(),
    }
  }

  fn toggle_unread_only(&mut self) {
    self.unread_only = !self.unread_only;
    self.query = if self.unread_only {
      self.ctx.resources.unread_notifications()
    } else {
      self.ctx.resources.notifications()
    };
    self.list_state.select(Some(0));
  }

  fn notifications(&self) -> &[Notification] {
    self.query.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Notification> {
    self.list_state.selected().and_then(|i| self.notifications().get(i))
  }

  fn mark_read(&self, notification: &Notification) {
    if !notification.is_read {
      self.ctx.spawn(self.ctx.mutations.mark_notification_read(), notification.id);
    }
  }
}

impl View for NotificationsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('u') => self.toggle_unread_only(),
      KeyCode::Char('m') => {
        if let Some(notification) = self.selected() {
          self.mark_read(notification);
        }
      }
      KeyCode::Char('M') => self.ctx.spawn(self.ctx.mutations.mark_all_read(), ()),
      KeyCode::Char('d') => {
        if let Some(notification) = self.selected() {
          self.ctx.spawn(self.ctx.mutations.delete_notification(), notification.id);
        }
      }
      KeyCode::Enter => {
        if let Some(notification) = self.selected() {
          self.mark_read(notification);
          if let Some(ticket) = notification.ticket {
            return ViewAction::Push(Box::new(TicketDetailView::new(self.ctx.clone(), ticket)));
          }
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.notifications().len();
    ensure_valid_selection(&mut self.list_state, len);

    let label = if self.unread_only { "Unread" } else { "Notifications" };
    let title = match (self.query.data(), self.query.error()) {
      (_, Some(e)) => format!(" {} (error: {}) ", label, e),
      (None, None) => format!(" {} (loading...) ", label),
      (Some(items), None) => format!(" {} ({}) ", label, items.len()),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading notifications..."
      } else {
        "Nothing here."
      };
      let paragraph = Paragraph::new(text).block(block).style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = self
      .notifications()
      .iter()
      .map(|n| {
        let (marker, style) = if n.is_read {
          ("  ", Style::default().fg(Color::DarkGray))
        } else {
          ("● ", Style::default().fg(Color::White).bold())
        };
        let text = match &n.title {
          Some(title) => format!("{}: {}", title, n.message),
          None => n.message.clone(),
        };
        let age = n.created_at.map(|t| relative_time(t, now)).unwrap_or_default();
        ListItem::new(Line::from(vec![
          Span::styled(marker, Style::default().fg(Color::Magenta)),
          Span::styled(format!("{:<72}", truncate(&text, 70)), style),
          Span::styled(age, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Notifications".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("m", "read").with_priority(20),
      ShortcutInfo::new("M", "all read").with_priority(30),
      ShortcutInfo::new("d", "delete").with_priority(40),
      ShortcutInfo::new("u", "unread only").with_priority(50),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
