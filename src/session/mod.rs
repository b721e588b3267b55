//! Auth session gate.
//!
//! Credential presence alone does not authenticate: the identity fetch
//! (`GET /users/me/`) must succeed. A rejected credential ends the session
//! locally without waiting on the backend, and every path that ends a
//! session converges on a single redirect to sign-in.

mod credentials;
mod gate;

pub use credentials::{Credential, CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use gate::{SessionEvent, SessionGate, SessionSnapshot, SessionState, DEFAULT_LOGOUT_GRACE};
