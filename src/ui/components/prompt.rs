use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::{draw_overlay, input_line};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Modal single-field prompt, e.g. a new comment.
#[derive(Debug, Clone)]
pub struct Prompt {
  title: String,
  input: TextInput,
}

impl Prompt {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      input: TextInput::new(),
    }
  }

  /// `Some(text)` on a non-empty submit, `None` on cancel.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<Option<String>> {
    match self.input.handle_key(key) {
      InputResult::Submitted(text) if text.trim().is_empty() => KeyResult::Handled,
      InputResult::Submitted(text) => KeyResult::Event(Some(text.trim().to_string())),
      InputResult::Cancelled => KeyResult::Event(None),
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let inner = draw_overlay(frame, area, 1, &format!(" {} ", self.title));
    if inner.height > 0 {
      frame.render_widget(Paragraph::new(input_line("> ", &self.input)), inner);
    }
  }
}
