//! Keyed, in-memory query cache.
//!
//! This module provides the storage half of the data synchronization layer:
//! - Canonical query keys (resource kind + ordered filter parameters)
//! - Key patterns for kind-wide, prefix or exact invalidation
//! - Stale-while-revalidate entries: invalidation marks data stale but keeps it visible
//! - Per-key subscriber lists notified on every write
//! - Idle garbage collection for entries nobody observes

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, EntryConfig, FetchStatus};
pub use key::{KeyPattern, QueryKey, ResourceKind};
pub use store::{InvalidationHook, Listener, QueryCache, SubscriberId};
