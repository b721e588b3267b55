mod app;
mod commands;
mod event;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ticketdesk::api::ApiClient;
use ticketdesk::cache::QueryCache;
use ticketdesk::config::{Config, CredentialStoreKind};
use ticketdesk::mutation::{Mutations, ToastQueue};
use ticketdesk::queries::ResourceQueries;
use ticketdesk::query::QueryClient;
use ticketdesk::session::{
  CredentialStore, MemoryCredentialStore, SessionGate, SessionState, SqliteCredentialStore,
};
use tracing::info;

const TOAST_TTL: Duration = Duration::from_secs(4);

#[derive(Parser, Debug)]
#[command(name = "ticketdesk")]
#[command(about = "A terminal client for the campus ticket tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ticketdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Sign in as this user; the password is read from TICKETDESK_PASSWORD
  #[arg(short, long)]
  login: Option<String>,

  /// Sign out, clearing the stored credential, and exit
  #[arg(long, conflicts_with = "login")]
  logout: bool,

  /// Debug-level logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = ticketdesk::logging::init(args.verbose)?;
  info!(api = %config.api.url, "starting");

  let api = ApiClient::new(&config.api)?;
  let queries = QueryClient::new(QueryCache::new(), config.cache.runner());
  let store: Arc<dyn CredentialStore> = match config.session.credential_store {
    CredentialStoreKind::Sqlite => Arc::new(SqliteCredentialStore::open()?),
    CredentialStoreKind::Memory => Arc::new(MemoryCredentialStore::new()),
  };
  let (gate, mut session_events) = SessionGate::new(
    api.clone(),
    queries.clone(),
    store,
    config.session.logout_grace(),
  );

  gate.initialize().await;

  if args.logout {
    gate.sign_out().await;
    println!("Signed out.");
    return Ok(());
  }

  if let Some(username) = &args.login {
    let password = Config::get_password()?;
    gate
      .sign_in(username, &password)
      .await
      .map_err(|e| eyre!("Sign-in failed: {}", e))?;
  }

  let user = match (gate.state(), gate.identity()) {
    (SessionState::Authenticated, Some(user)) => user,
    _ => {
      return Err(eyre!(
        "Not signed in. Run `ticketdesk --login <username>` with TICKETDESK_PASSWORD set."
      ))
    }
  };
  info!(user = %user.username, role = user.role.label(), "session ready");

  // Redirects raised before sign-in completed are stale
  while session_events.try_recv().is_ok() {}

  let toasts = ToastQueue::new(TOAST_TTL);
  let mutations = Mutations::new(api.clone(), queries.clone(), Arc::new(toasts.clone()));
  let resources = ResourceQueries::new(api, queries, config.polling, config.cache);
  let ctx = ui::view::ViewContext {
    resources,
    mutations,
    user,
  };

  let mut app = app::App::new(ctx, gate, toasts, config.display_title());
  match app.run(session_events).await? {
    app::Exit::SignedOut => {
      println!("Your session has ended. Run `ticketdesk --login <username>` to sign in again.")
    }
    app::Exit::Quit => {}
  }

  Ok(())
}
