use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{relative_time, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::{NewTicketView, TicketDetailView};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ticketdesk::api::types::{Page, Ticket, TicketStatus};
use ticketdesk::api::TicketFilters;
use ticketdesk::queries::default_filters;
use ticketdesk::query::QueryHandle;

/// Which tickets the list starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
  /// The role's queue: own tickets for students, assignments for ICT,
  /// everything for staff and admins
  Queue,
  /// Tickets the user filed
  Mine,
}

/// Polled ticket list with `/` search and a status filter
pub struct TicketListView {
  ctx: ViewContext,
  scope: TicketScope,
  filters: TicketFilters,
  query: QueryHandle<Page<Ticket>>,
  list_state: ListState,
  search: SearchInput,
}

impl TicketListView {
  pub fn new(ctx: ViewContext, scope: TicketScope) -> Self {
    let filters = match scope {
      TicketScope::Queue => default_filters(&ctx.user),
      TicketScope::Mine => TicketFilters::created_by(ctx.user.id),
    };
    let query = ctx.resources.tickets(&filters);
    Self {
      ctx,
      scope,
      filters,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  /// Remount under a new key; the old handle unsubscribes on drop.
  fn apply_filters(&mut self, filters: TicketFilters) {
    if filters == self.filters {
      return;
    }
    self.query = self.ctx.resources.tickets(&filters);
    self.filters = filters;
    self.list_state.select(Some(0));
  }

  fn cycle_status(&mut self) {
    let next = match self.filters.status {
      None => Some(TicketStatus::ALL[0]),
      Some(TicketStatus::Closed) => None,
      Some(status) => Some(status.next()),
    };
    let filters = TicketFilters {
      status: next,
      ..self.filters.clone()
    };
    self.apply_filters(filters);
  }

  fn tickets(&self) -> &[Ticket] {
    self.query.data().map(|p| p.results.as_slice()).unwrap_or(&[])
  }

  fn title(&self) -> String {
    let mut parts = vec![self.breadcrumb_label()];
    if let Some(status) = self.filters.status {
      parts.push(format!("status:{}", status.label()));
    }
    if let Some(search) = &self.filters.search {
      parts.push(format!("\"{}\"", search));
    }
    let label = parts.join(" ");

    if let Some(error) = self.query.error() {
      return format!(" {} (error: {}) ", label, error);
    }
    match self.query.data() {
      None => format!(" {} (loading...) ", label),
      Some(page) if self.query.is_updating() => format!(" {} ({}) ⟳ ", label, page.count),
      Some(page) => format!(" {} ({}) ", label, page.count),
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.tickets().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.query.is_loading() {
        "Loading tickets..."
      } else if self.query.error().is_some() {
        "Failed to load tickets. Press 'r' to retry."
      } else {
        "No tickets found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = self
      .tickets()
      .iter()
      .map(|ticket| {
        let assignee = ticket
          .assigned_to
          .as_ref()
          .map(|u| u.username.as_str())
          .unwrap_or("unassigned");
        let age = ticket
          .updated_at
          .or(ticket.created_at)
          .map(|t| relative_time(t, now))
          .unwrap_or_default();
        ListItem::new(Line::from(vec![
          Span::styled(format!("#{:<6}", ticket.id), Style::default().fg(Color::Cyan)),
          Span::styled(
            format!("{:<12}", ticket.status.label()),
            Style::default().fg(status_color(ticket.status)),
          ),
          Span::raw(format!("{:<52}", truncate(&ticket.title, 50))),
          Span::styled(format!("{:<14}", truncate(assignee, 12)), Style::default().fg(Color::Magenta)),
          Span::styled(age, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for TicketListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Submitted(query)) => {
        let filters = self.filters.clone().with_search(query);
        self.apply_filters(filters);
        return ViewAction::None;
      }
      other if other.is_consumed() => return ViewAction::None,
      _ => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('f') => self.cycle_status(),
      KeyCode::Char('n') => return ViewAction::Push(Box::new(NewTicketView::new(self.ctx.clone()))),
      KeyCode::Enter => {
        let selected = self.list_state.selected().and_then(|i| self.tickets().get(i));
        if let Some(ticket) = selected {
          let view = TicketDetailView::new(self.ctx.clone(), ticket.id);
          return ViewAction::Push(Box::new(view));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match self.scope {
      TicketScope::Queue => "Tickets".to_string(),
      TicketScope::Mine => "My tickets".to_string(),
    }
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("f", "status").with_priority(30),
      ShortcutInfo::new("n", "new").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
