pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use components::TextInput;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, ListState};
use renderfns::{draw_footer, draw_header};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let shortcuts = app.current_view().map(|v| v.shortcuts()).unwrap_or_default();
  draw_header(frame, chunks[0], &app.header_info(), &shortcuts);

  if let Some(view) = app.current_view_mut() {
    view.render(frame, chunks[1]);
  }
  app.command_input().render_overlay(frame, chunks[1]);

  draw_footer(frame, chunks[2], &app.breadcrumb(), app.toast().as_ref());
}

/// Clamp the selection after the list changed underneath it
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Clear and frame an overlay near the top-left of `area`, returning the
/// inner rect for `rows` lines of content.
pub fn draw_overlay(frame: &mut Frame, area: Rect, rows: u16, title: &str) -> Rect {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width.saturating_sub(2));
  let height = (rows + 2).min(area.height.saturating_sub(1));
  let overlay = Rect::new(area.x + 1, area.y + 1, width, height);

  frame.render_widget(Clear, overlay);
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow))
    .title(title.to_string());
  let inner = block.inner(overlay);
  frame.render_widget(block, overlay);
  inner
}

/// Prefix, text, and a block cursor at the input's cursor position
pub fn input_line<'a>(prefix: &'a str, input: &'a TextInput) -> Line<'a> {
  let value = input.value();
  let split = value
    .char_indices()
    .nth(input.cursor_position())
    .map(|(i, _)| i)
    .unwrap_or(value.len());
  let (before, after) = value.split_at(split);
  let mut rest = after.chars();
  let cursor = rest.next().map(String::from).unwrap_or_else(|| " ".to_string());

  Line::from(vec![
    Span::styled(prefix, Style::default().fg(Color::Yellow)),
    Span::raw(before),
    Span::styled(cursor, Style::default().bg(Color::Yellow).fg(Color::Black)),
    Span::raw(rest.as_str().to_string()),
  ])
}
