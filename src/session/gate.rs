use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::credentials::{Credential, CredentialStore};
use crate::api::types::{RegisterRequest, User};
use crate::api::{ApiClient, ApiError};
use crate::cache::QueryKey;
use crate::query::{fetcher, QueryClient};

/// Default bound on the best-effort backend logout call.
pub const DEFAULT_LOGOUT_GRACE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
  /// Credential storage not read yet
  #[default]
  Unknown,
  Unauthenticated,
  /// Credential present, identity fetch in flight
  ResolvingIdentity,
  Authenticated,
}

/// Navigation side effects raised by the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
  SignedIn(User),
  RedirectToSignIn,
}

/// What the UI reads about the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
  pub state: SessionState,
  pub has_credential: bool,
  pub identity: Option<User>,
  pub is_authenticated: bool,
  pub is_initializing: bool,
  pub is_loading: bool,
}

#[derive(Default)]
struct GateState {
  state: SessionState,
  credential: Option<Credential>,
  identity: Option<User>,
  /// Background identity refresh while already authenticated
  refreshing: bool,
  /// Bumped by every sign-in and sign-out; stale identity results are dropped
  epoch: u64,
  tearing_down: bool,
}

impl GateState {
  fn snapshot(&self) -> SessionSnapshot {
    let is_initializing = matches!(
      self.state,
      SessionState::Unknown | SessionState::ResolvingIdentity
    );
    SessionSnapshot {
      state: self.state,
      has_credential: self.credential.is_some(),
      identity: self.identity.clone(),
      is_authenticated: self.state == SessionState::Authenticated,
      is_initializing,
      is_loading: is_initializing || (self.state == SessionState::Authenticated && self.refreshing),
    }
  }
}

/// Decides whether the user is signed in, and owns sign-in and sign-out.
#[derive(Clone)]
pub struct SessionGate {
  inner: Arc<GateInner>,
}

struct GateInner {
  api: ApiClient,
  queries: QueryClient,
  store: Arc<dyn CredentialStore>,
  logout_grace: Duration,
  state: Mutex<GateState>,
  snapshot: watch::Sender<SessionSnapshot>,
  events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionGate {
  /// Create the gate and register it as the client's 401 handler.
  ///
  /// Returns the receiver of navigation events.
  pub fn new(
    api: ApiClient,
    queries: QueryClient,
    store: Arc<dyn CredentialStore>,
    logout_grace: Duration,
  ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    let (snapshot, _) = watch::channel(SessionSnapshot::default());
    let inner = Arc::new(GateInner {
      api,
      queries,
      store,
      logout_grace,
      state: Mutex::new(GateState::default()),
      snapshot,
      events,
    });

    let weak: Weak<GateInner> = Arc::downgrade(&inner);
    inner.api.set_unauthorized_handler(Arc::new(move || {
      let Some(inner) = weak.upgrade() else {
        return;
      };
      if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        debug!("credential rejected by backend");
        runtime.spawn(async move {
          SessionGate { inner }.sign_out().await;
        });
      }
    }));

    (Self { inner }, rx)
  }

  fn lock(&self) -> MutexGuard<'_, GateState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self) {
    let snapshot = self.lock().snapshot();
    self.inner.snapshot.send_replace(snapshot);
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    self.inner.snapshot.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
    self.inner.snapshot.subscribe()
  }

  pub fn state(&self) -> SessionState {
    self.lock().state
  }

  pub fn identity(&self) -> Option<User> {
    self.lock().identity.clone()
  }

  /// Read stored credentials and resolve the identity they belong to.
  pub async fn initialize(&self) {
    let stored = match self.inner.store.load() {
      Ok(stored) => stored,
      Err(e) => {
        warn!(error = %e, "failed to read credential store");
        None
      }
    };
    self.adopt(stored).await;
  }

  /// Re-read shared credential storage (another process may have signed
  /// in or out) and follow it.
  pub async fn sync_credentials(&self) {
    let stored = match self.inner.store.load() {
      Ok(stored) => stored,
      Err(e) => {
        warn!(error = %e, "failed to read credential store");
        return;
      }
    };
    let current = self.lock().credential.clone();
    if stored == current {
      return;
    }
    info!("credential storage changed");
    if stored.is_none() {
      self.sign_out().await;
      return;
    }

    // Another account may own the stored credential now
    self.inner.queries.clear();
    self.adopt(stored).await;
    let snapshot = self.snapshot();
    if let (true, Some(user)) = (snapshot.is_authenticated, snapshot.identity) {
      let _ = self.inner.events.send(SessionEvent::SignedIn(user));
    }
  }

  async fn adopt(&self, credential: Option<Credential>) {
    match credential {
      Some(credential) => {
        info!(credential = %credential.fingerprint(), "credential found");
        self.inner.api.set_token(Some(credential.access.clone()));
        {
          let mut state = self.lock();
          state.epoch += 1;
          state.credential = Some(credential);
          state.identity = None;
          state.state = SessionState::ResolvingIdentity;
        }
        self.publish();
        self.resolve_identity().await;
      }
      None => {
        self.inner.api.set_token(None);
        {
          let mut state = self.lock();
          state.credential = None;
          state.identity = None;
          state.state = SessionState::Unauthenticated;
        }
        info!("no stored credential");
        self.publish();
      }
    }
  }

  /// Refetch the identity in the background while staying authenticated.
  pub async fn refresh_identity(&self) {
    {
      let mut state = self.lock();
      match state.state {
        SessionState::Authenticated => state.refreshing = true,
        SessionState::ResolvingIdentity => {}
        _ => return,
      }
    }
    self.publish();
    self.resolve_identity().await;
  }

  async fn resolve_identity(&self) -> Option<User> {
    let epoch = self.lock().epoch;
    let api = self.inner.api.clone();
    let result = self
      .inner
      .queries
      .fetch_query(
        &QueryKey::current_user(),
        fetcher(move || {
          let api = api.clone();
          async move { api.users().me().await }
        }),
      )
      .await
      .and_then(|value| serde_json::from_value::<User>(value).map_err(ApiError::from));

    match result {
      Ok(user) => {
        {
          let mut state = self.lock();
          if state.epoch != epoch || state.credential.is_none() {
            debug!("identity resolved for a previous session");
            return None;
          }
          state.identity = Some(user.clone());
          state.state = SessionState::Authenticated;
          state.refreshing = false;
        }
        info!(user = %user.username, role = user.role.label(), "session authenticated");
        self.publish();
        Some(user)
      }
      Err(error) if error.is_auth_error() => {
        warn!(%error, "identity rejected");
        self.sign_out().await;
        None
      }
      Err(error) => {
        {
          let mut state = self.lock();
          if state.epoch != epoch {
            return None;
          }
          state.refreshing = false;
          if state.identity.is_none() {
            state.state = SessionState::Unauthenticated;
          }
        }
        warn!(%error, "identity fetch failed, keeping credential");
        self.publish();
        None
      }
    }
  }

  /// Exchange username and password for a credential.
  pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, ApiError> {
    let response = self.inner.api.auth().login(username, password).await?;
    let credential = Credential::new(response.access, response.refresh);
    if let Err(e) = self.inner.store.save(&credential) {
      warn!(error = %e, "failed to persist credential");
    }
    info!(credential = %credential.fingerprint(), "signed in");

    // Data cached for an earlier user must not leak into this session
    self.inner.queries.clear();
    if let Some(user) = &response.user {
      self
        .inner
        .queries
        .set_query_value(&QueryKey::current_user(), user);
    }
    self.adopt(Some(credential)).await;

    let snapshot = self.snapshot();
    match (snapshot.is_authenticated, snapshot.identity) {
      (true, Some(user)) => {
        let _ = self.inner.events.send(SessionEvent::SignedIn(user.clone()));
        Ok(user)
      }
      _ => Err(ApiError::Auth("could not resolve signed-in user".to_string())),
    }
  }

  /// Create an account, then sign in with it.
  pub async fn register(&self, request: RegisterRequest) -> Result<User, ApiError> {
    let created = self.inner.api.auth().register(&request).await?;
    info!(user = %created.username, "account registered");
    self.sign_in(&request.username, &request.password).await
  }

  /// Local sign-out.
  ///
  /// The local session ends immediately; the backend logout call is awaited
  /// for at most `logout_grace` and its outcome ignored. Concurrent and
  /// repeated calls converge on a single redirect. Returns whether this
  /// call performed the teardown.
  pub async fn sign_out(&self) -> bool {
    let (credential, epoch) = {
      let mut state = self.lock();
      if state.tearing_down
        || (state.state == SessionState::Unauthenticated && state.credential.is_none())
      {
        return false;
      }
      state.tearing_down = true;
      state.epoch += 1;
      state.state = SessionState::Unauthenticated;
      state.identity = None;
      state.refreshing = false;
      (state.credential.take(), state.epoch)
    };
    info!("signing out");
    self.publish();

    if let Err(e) = self.inner.store.clear() {
      warn!(error = %e, "failed to clear credential store");
    }

    if let Some(credential) = credential {
      let auth = self.inner.api.auth();
      let logout = auth.logout(credential.refresh.clone());
      match tokio::time::timeout(self.inner.logout_grace, logout).await {
        Ok(Ok(())) => debug!("backend logout confirmed"),
        Ok(Err(error)) => debug!(%error, "backend logout failed"),
        Err(_) => debug!("backend logout timed out"),
      }
    }

    let superseded = {
      let mut state = self.lock();
      state.tearing_down = false;
      state.epoch != epoch
    };
    // A sign-in that landed during the grace period owns the client now
    if superseded {
      debug!("sign-out superseded by a newer session");
      return true;
    }
    self.inner.api.set_token(None);
    self.inner.queries.clear();
    let _ = self.inner.events.send(SessionEvent::RedirectToSignIn);
    true
  }
}
