//! Client-side data synchronization for a role-based ticket tracker.
//!
//! - [`api`]: HTTP resource client with a global 401 hook
//! - [`cache`]: keyed query cache with stale-while-revalidate entries
//! - [`query`]: runner deciding when keyed reads execute (mount, polling,
//!   focus, reconnect, invalidation), with request de-duplication
//! - [`mutation`]: writes followed by declarative cache policies
//! - [`session`]: auth session gate and credential storage

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod mutation;
pub mod queries;
pub mod query;
pub mod session;
