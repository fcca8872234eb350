//! Rx Entity Cache - A reactive per-key entity cache
//!
//! Stores entities fetched from elsewhere, lets any number of observers follow
//! a key's current value, evicts entries after a TTL, and offers a memoized
//! get-or-fetch plus a debounced view of every cached entity.

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod store;
pub mod tasks;

pub use cache::{CacheStats, Entity, EntityStream, EntryInfo, Key, Target};
pub use config::{EvictionPolicy, StoreConfig};
pub use error::{CacheError, Result};
pub use registry::StoreRegistry;
pub use store::{SnapshotStream, Source, Store};
