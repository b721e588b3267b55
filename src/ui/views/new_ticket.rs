use crate::ui::components::{InputResult, TextInput};
use crate::ui::input_line;
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use ticketdesk::api::types::NewTicket;

const FIELDS: [&str; 3] = ["Title", "Description", "Category"];

/// Form for filing a ticket; Enter moves to the next field and submits
/// from the last one.
pub struct NewTicketView {
  ctx: ViewContext,
  fields: [TextInput; 3],
  focus: usize,
  error: Option<&'static str>,
}

impl NewTicketView {
  pub fn new(ctx: ViewContext) -> Self {
    Self {
      ctx,
      fields: Default::default(),
      focus: 0,
      error: None,
    }
  }

  fn ticket(&self) -> Result<NewTicket, &'static str> {
    let [title, description, category] = &self.fields;
    if title.value().trim().is_empty() {
      return Err("Title is required");
    }
    if description.value().trim().is_empty() {
      return Err("Description is required");
    }
    let category = category.value().trim();
    Ok(NewTicket {
      title: title.value().trim().to_string(),
      description: description.value().trim().to_string(),
      category: (!category.is_empty()).then(|| category.to_string()),
      ..Default::default()
    })
  }

  fn submit(&mut self) -> ViewAction {
    match self.ticket() {
      Ok(ticket) => {
        self.ctx.spawn(self.ctx.mutations.create_ticket(), ticket);
        ViewAction::Pop
      }
      Err(message) => {
        self.error = Some(message);
        ViewAction::None
      }
    }
  }
}

impl View for NewTicketView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focus = (self.focus + 1) % FIELDS.len();
        return ViewAction::None;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = (self.focus + FIELDS.len() - 1) % FIELDS.len();
        return ViewAction::None;
      }
      _ => {}
    }

    match self.fields[self.focus].handle_key(key) {
      InputResult::Cancelled => ViewAction::Pop,
      InputResult::Submitted(_) if self.focus + 1 < FIELDS.len() => {
        self.focus += 1;
        ViewAction::None
      }
      InputResult::Submitted(_) => self.submit(),
      InputResult::Consumed | InputResult::NotHandled => {
        self.error = None;
        ViewAction::None
      }
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" New ticket ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut constraints = vec![Constraint::Length(3); FIELDS.len()];
    constraints.push(Constraint::Min(1));
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints(constraints)
      .split(inner);

    for (i, (label, input)) in FIELDS.iter().zip(&self.fields).enumerate() {
      let color = if i == self.focus { Color::Yellow } else { Color::DarkGray };
      let field = Block::default()
        .title(format!(" {} ", label))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));
      let line = if i == self.focus {
        input_line("", input)
      } else {
        Line::raw(input.value())
      };
      frame.render_widget(Paragraph::new(line).block(field), rows[i]);
    }

    let status = match self.error {
      Some(message) => Span::styled(message, Style::default().fg(Color::Red)),
      None => Span::styled(
        "Enter: next field / submit   Tab: switch field   Esc: cancel",
        Style::default().fg(Color::DarkGray),
      ),
    };
    frame.render_widget(Paragraph::new(Line::from(status)), rows[FIELDS.len()]);
  }

  fn breadcrumb_label(&self) -> String {
    "New ticket".to_string()
  }

  fn is_capturing_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Enter", "next/submit").with_priority(10),
      ShortcutInfo::new("Esc", "cancel").with_priority(90),
    ]
  }
}
