use crate::commands::Command;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::HeaderInfo;
use crate::ui::view::{View, ViewAction, ViewContext};
use crate::ui::views::{NewTicketView, NotificationsView, TicketListView, TicketScope};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use ticketdesk::api::types::{UnreadCount, User};
use ticketdesk::mutation::{Notifier, Toast, ToastQueue};
use ticketdesk::session::{SessionEvent, SessionGate};
use tokio::sync::mpsc;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Re-read the credential store every this many ticks, so a sign-out in
/// another process ends this session too.
const CREDENTIAL_SYNC_TICKS: u32 = 8;

/// Collect unobserved cache entries every this many ticks
const GC_TICKS: u32 = 40;

/// How the UI ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
  Quit,
  SignedOut,
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  views: Vec<Box<dyn View>>,
  command: CommandInput,
  ctx: ViewContext,
  gate: SessionGate,
  toasts: ToastQueue,
  title: String,
  /// Header subscriptions, mounted for the whole session
  unread: ticketdesk::query::QueryHandle<UnreadCount>,
  me: ticketdesk::query::QueryHandle<User>,
  ticks: u32,
  exit: Option<Exit>,
}

impl App {
  pub fn new(ctx: ViewContext, gate: SessionGate, toasts: ToastQueue, title: String) -> Self {
    let unread = ctx.resources.unread_count();
    let me = ctx.resources.current_user();
    let root = TicketListView::new(ctx.clone(), TicketScope::Queue);
    Self {
      views: vec![Box::new(root)],
      command: CommandInput::new(),
      ctx,
      gate,
      toasts,
      title,
      unread,
      me,
      ticks: 0,
      exit: None,
    }
  }

  pub async fn run(&mut self, session_events: mpsc::UnboundedReceiver<SessionEvent>) -> Result<Exit> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;

    let result = self.event_loop(session_events).await;

    // Restore the terminal even if the loop failed
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, session_events: mpsc::UnboundedReceiver<SessionEvent>) -> Result<Exit> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(TICK_RATE);
    events.forward_session(session_events);

    loop {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => self.exit = Some(Exit::Quit),
      }
      if let Some(exit) = self.exit.take() {
        return Ok(exit);
      }
    }
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::FocusGained => {
        let refetched = self.ctx.resources.client().on_focus();
        debug!(refetched, "focus regained");
        self.sync_credentials();
      }
      Event::Session(SessionEvent::RedirectToSignIn) => {
        info!("session ended, leaving UI");
        self.exit = Some(Exit::SignedOut);
      }
      Event::Session(SessionEvent::SignedIn(user)) => {
        debug!(user = %user.username, "signed in");
        self.ctx.user = user;
      }
    }
  }

  fn tick(&mut self) {
    self.unread.poll();
    if self.me.poll() {
      if let Some(user) = self.me.data() {
        self.ctx.user = user.clone();
      }
    }
    for view in self.views.iter_mut() {
      view.tick();
    }

    self.ticks = self.ticks.wrapping_add(1);
    if self.ticks % CREDENTIAL_SYNC_TICKS == 0 {
      self.sync_credentials();
    }
    if self.ticks % GC_TICKS == 0 {
      let collected = self.ctx.resources.client().gc();
      if collected > 0 {
        debug!(collected, "cache gc");
      }
    }
  }

  fn sync_credentials(&self) {
    let gate = self.gate.clone();
    tokio::spawn(async move { gate.sync_credentials().await });
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.exit = Some(Exit::Quit);
      return;
    }

    let capturing = self.current_view().map(|v| v.is_capturing_input()).unwrap_or(false);
    if !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Run(cmd)) => {
          self.run_command(cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Unknown(text)) => {
          self.toasts.notify(Toast::error(format!("Unknown command: {}", text)));
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.views.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.views.push(view),
      ViewAction::Pop => {
        if self.views.len() > 1 {
          self.views.pop();
        } else {
          self.exit = Some(Exit::Quit);
        }
      }
    }
  }

  fn run_command(&mut self, cmd: &Command) {
    debug!(command = cmd.name, "command");
    match cmd.name {
      "tickets" => self.set_root(Box::new(TicketListView::new(self.ctx.clone(), TicketScope::Queue))),
      "mine" => self.set_root(Box::new(TicketListView::new(self.ctx.clone(), TicketScope::Mine))),
      "notifications" => self.set_root(Box::new(NotificationsView::new(self.ctx.clone()))),
      "new" => self.views.push(Box::new(NewTicketView::new(self.ctx.clone()))),
      "logout" => {
        let gate = self.gate.clone();
        // The gate emits the redirect that ends the loop
        tokio::spawn(async move {
          gate.sign_out().await;
        });
      }
      "quit" => self.exit = Some(Exit::Quit),
      _ => {}
    }
  }

  /// Replace the whole stack; dropped views unsubscribe their queries
  fn set_root(&mut self, view: Box<dyn View>) {
    self.views.clear();
    self.views.push(view);
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.views.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.views.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn toast(&self) -> Option<Toast> {
    self.toasts.current()
  }

  pub fn header_info(&self) -> HeaderInfo<'_> {
    HeaderInfo {
      title: &self.title,
      user: Some(self.me.data().unwrap_or(&self.ctx.user)),
      unread: self.unread.data().map(|c| c.count),
      online: self.ctx.resources.client().is_online(),
    }
  }
}
