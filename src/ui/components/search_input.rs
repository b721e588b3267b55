use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::{draw_overlay, input_line};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Events emitted by search input that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// Enter pressed with this query; empty means "no search"
  Submitted(String),
  /// Escape pressed, previous search stays in effect
  Cancelled,
}

/// `/` search box.
///
/// Searches are applied on submit: every distinct query is its own cache
/// key, and keystroke-by-keystroke keys would each start a fetch.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
  input: TextInput,
  active: bool,
  applied: String,
}

impl SearchInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Search currently in effect
  pub fn applied(&self) -> &str {
    &self.applied
  }

  /// Open the box pre-filled with the applied search
  pub fn activate(&mut self) {
    self.active = true;
    self.input = TextInput::with_value(self.applied.clone());
  }

  /// Call this regardless of active state; it handles activation too
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<SearchEvent> {
    if !self.active {
      if key.code == KeyCode::Char('/') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(query) => {
        self.active = false;
        self.applied = query.trim().to_string();
        KeyResult::Event(SearchEvent::Submitted(self.applied.clone()))
      }
      InputResult::Cancelled => {
        self.active = false;
        KeyResult::Event(SearchEvent::Cancelled)
      }
      InputResult::Consumed => KeyResult::Handled,
      // Swallow everything else so list bindings don't fire while typing
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }
    let inner = draw_overlay(frame, area, 1, " Search ");
    if inner.height == 0 {
      return;
    }
    frame.render_widget(Paragraph::new(input_line("/", &self.input)), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_submit_applies_trimmed_query() {
    let mut search = SearchInput::new();
    assert_eq!(search.handle_key(key(KeyCode::Char('/'))), KeyResult::Handled);
    for c in " wifi ".chars() {
      search.handle_key(key(KeyCode::Char(c)));
    }
    assert_eq!(
      search.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(SearchEvent::Submitted("wifi".to_string()))
    );
    assert_eq!(search.applied(), "wifi");
    assert!(!search.is_active());
  }

  #[test]
  fn test_cancel_keeps_previous_search() {
    let mut search = SearchInput::new();
    search.handle_key(key(KeyCode::Char('/')));
    search.handle_key(key(KeyCode::Char('x')));
    search.handle_key(key(KeyCode::Enter));

    search.handle_key(key(KeyCode::Char('/')));
    search.handle_key(key(KeyCode::Char('y')));
    assert_eq!(
      search.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(SearchEvent::Cancelled)
    );
    assert_eq!(search.applied(), "x");
  }

  #[test]
  fn test_inactive_ignores_other_keys() {
    let mut search = SearchInput::new();
    assert_eq!(search.handle_key(key(KeyCode::Char('j'))), KeyResult::NotHandled);
  }
}
