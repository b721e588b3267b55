//! Resource client for the ticket tracker REST backend.
//!
//! One thin API struct per resource, all sharing an [`ApiClient`] that owns
//! the bearer credential, the request timeout and the global 401 hook.

mod auth;
mod client;
mod comments;
pub mod error;
mod notifications;
mod tickets;
pub mod types;
mod users;

pub use auth::AuthApi;
pub use client::{ApiClient, ClientBuilder, UnauthorizedHandler, DEFAULT_TIMEOUT};
pub use comments::CommentsApi;
pub use error::{ApiError, ErrorKind};
pub use notifications::NotificationsApi;
pub use tickets::{TicketFilters, TicketsApi};
pub use users::UsersApi;
