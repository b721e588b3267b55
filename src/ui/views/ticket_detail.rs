use crate::ui::components::{KeyResult, Prompt};
use crate::ui::renderfns::{relative_time, status_color};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ticketdesk::api::types::{Comment, Ticket, TicketUpdate};
use ticketdesk::query::QueryHandle;

/// One ticket with its comment thread, both polled while open
pub struct TicketDetailView {
  ctx: ViewContext,
  id: u64,
  ticket: QueryHandle<Ticket>,
  comments: QueryHandle<Vec<Comment>>,
  prompt: Option<Prompt>,
  scroll: u16,
}

impl TicketDetailView {
  pub fn new(ctx: ViewContext, id: u64) -> Self {
    let ticket = ctx.resources.ticket(id);
    let comments = ctx.resources.comments(id);
    Self {
      ctx,
      id,
      ticket,
      comments,
      prompt: None,
      scroll: 0,
    }
  }

  fn advance_status(&self) {
    if let Some(ticket) = self.ticket.data() {
      let update = TicketUpdate {
        status: Some(ticket.status.next()),
        ..Default::default()
      };
      self.ctx.spawn(self.ctx.mutations.update_ticket(), (self.id, update));
    }
  }

  fn render_ticket(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(format!(" Ticket #{} ", self.id))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let ticket = match self.ticket.data() {
      Some(ticket) => ticket,
      None => {
        let (text, color) = match self.ticket.error() {
          Some(e) => (format!("Error: {}\n\nPress 'r' to retry.", e), Color::Red),
          None => ("Loading ticket...".to_string(), Color::DarkGray),
        };
        frame.render_widget(Paragraph::new(text).block(block).style(Style::default().fg(color)), area);
        return;
      }
    };

    let label = Style::default().fg(Color::DarkGray);
    let user = |u: &Option<ticketdesk::api::types::UserSummary>| {
      u.as_ref().map(|u| u.username.clone()).unwrap_or_else(|| "-".to_string())
    };
    let mut lines = vec![
      Line::from(Span::styled(ticket.title.clone(), Style::default().bold())),
      Line::from(vec![
        Span::styled("Status:   ", label),
        Span::styled(ticket.status.label(), Style::default().fg(status_color(ticket.status))),
        Span::styled("   Priority: ", label),
        Span::raw(ticket.priority.clone().unwrap_or_else(|| "-".to_string())),
        Span::styled("   Category: ", label),
        Span::raw(ticket.category.clone().unwrap_or_else(|| "-".to_string())),
      ]),
      Line::from(vec![
        Span::styled("Reporter: ", label),
        Span::raw(user(&ticket.created_by)),
        Span::styled("   Assignee: ", label),
        Span::styled(user(&ticket.assigned_to), Style::default().fg(Color::Magenta)),
      ]),
    ];
    if let Some(shot) = &ticket.screenshot {
      lines.push(Line::from(vec![Span::styled("Screenshot: ", label), Span::raw(shot.clone())]));
    }
    lines.push(Line::raw(""));
    lines.extend(ticket.description.lines().map(|l| Line::raw(l.to_string())));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
  }

  fn render_comments(&self, frame: &mut Frame, area: Rect) {
    let count = self.comments.data().map(Vec::len).unwrap_or(0);
    let block = Block::default()
      .title(format!(" Comments ({}) ", count))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray));

    let comments = match self.comments.data() {
      Some(comments) if !comments.is_empty() => comments,
      Some(_) => {
        let empty = Paragraph::new("No comments yet. Press 'c' to add one.")
          .block(block)
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
      }
      None => {
        frame.render_widget(Paragraph::new("Loading comments...").block(block), area);
        return;
      }
    };

    let now = Utc::now();
    let mut lines = Vec::new();
    for comment in comments {
      let author = comment
        .author
        .as_ref()
        .map(|a| a.username.clone())
        .unwrap_or_else(|| "unknown".to_string());
      let age = comment.created_at.map(|t| relative_time(t, now)).unwrap_or_default();
      lines.push(Line::from(vec![
        Span::styled(author, Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("  {}", age), Style::default().fg(Color::DarkGray)),
      ]));
      lines.extend(comment.message.lines().map(|l| Line::raw(format!("  {}", l))));
      lines.push(Line::raw(""));
    }

    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, area);
  }
}

impl View for TicketDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(prompt) = self.prompt.as_mut() {
      if let KeyResult::Event(submitted) = prompt.handle_key(key) {
        self.prompt = None;
        if let Some(message) = submitted {
          self.ctx.spawn(self.ctx.mutations.add_comment(), (self.id, message));
        }
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => {
        self.ticket.refetch();
        self.comments.refetch();
      }
      KeyCode::Char('c') => self.prompt = Some(Prompt::new("Add comment")),
      KeyCode::Char('s') if self.ctx.can_work_tickets() => self.advance_status(),
      KeyCode::Char('a') if self.ctx.can_work_tickets() => {
        let me = self.ctx.user.id;
        self.ctx.spawn(self.ctx.mutations.assign_ticket(), (self.id, me));
      }
      KeyCode::Char('D') if self.ctx.can_delete_tickets() => {
        self.ctx.spawn(self.ctx.mutations.delete_ticket(), self.id);
        return ViewAction::Pop;
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(45), Constraint::Min(3)])
      .split(area);
    self.render_ticket(frame, chunks[0]);
    self.render_comments(frame, chunks[1]);

    if let Some(prompt) = &self.prompt {
      prompt.render(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
  }

  fn tick(&mut self) {
    self.ticket.poll();
    self.comments.poll();
  }

  fn is_capturing_input(&self) -> bool {
    self.prompt.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new("c", "comment").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(60),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if self.ctx.can_work_tickets() {
      shortcuts.push(ShortcutInfo::new("s", "next status").with_priority(30));
      shortcuts.push(ShortcutInfo::new("a", "assign to me").with_priority(40));
    }
    if self.ctx.can_delete_tickets() {
      shortcuts.push(ShortcutInfo::new("D", "delete").with_priority(50));
    }
    shortcuts
  }
}
