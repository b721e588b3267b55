use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ticketdesk::api::types::{Role, User};
use ticketdesk::api::ApiError;
use ticketdesk::mutation::{Mutation, Mutations};
use ticketdesk::queries::ResourceQueries;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Everything a view needs to read and write backend data
#[derive(Clone)]
pub struct ViewContext {
  pub resources: ResourceQueries,
  pub mutations: Mutations,
  pub user: User,
}

impl ViewContext {
  /// Staff, ICT and admins work tickets; students only file them
  pub fn can_work_tickets(&self) -> bool {
    self.user.role != Role::Student
  }

  pub fn can_delete_tickets(&self) -> bool {
    self.user.role == Role::SuperAdmin
  }

  /// Fire a mutation without blocking the UI.
  ///
  /// Cache updates and toasts happen inside the mutation itself.
  pub fn spawn<I, O>(&self, mutation: Mutation<I, O>, input: I)
  where
    I: Clone + Send + 'static,
    O: Send + 'static,
  {
    tokio::spawn(async move {
      let _: Result<O, ApiError> = mutation.mutate(input).await;
    });
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views own their query handles and their input modes, and return actions
/// for the App to execute: App → View → Components.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to pick up query changes
  fn tick(&mut self) {}

  /// Whether a text field currently owns the keyboard
  fn is_capturing_input(&self) -> bool {
    false
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
