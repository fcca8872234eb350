//! Error types for the entity cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::cache::Key;

// == Cache Error Enum ==
/// Unified error type for the entity cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A supplied future or stream failed
    #[error("Producer failed: {0}")]
    Producer(#[from] anyhow::Error),

    /// A get-or-set producer completed without yielding a value
    #[error("Producer for key {0} completed without a value")]
    ProducerEmpty(Key),

    /// A get-or-set producer yielded an entity stored under another key
    #[error("Producer for key {expected} yielded an entity for key {actual}")]
    KeyMismatch { expected: Key, actual: Key },

    /// The entry kept disappearing between write and read
    #[error("Race not resolved for key {key} after {attempts} attempts")]
    RaceUnresolved { key: Key, attempts: u32 },

    /// The store has been disposed
    #[error("Store disposed")]
    Disposed,

    /// The store was constructed outside a Tokio runtime
    #[error("No Tokio runtime available")]
    NoRuntime,

    /// A registry name was reused with a different entity type
    #[error("Store {0} is registered with a different entity type")]
    RegistryTypeMismatch(String),
}

// == Result Type Alias ==
/// Convenience Result type for the entity cache.
pub type Result<T> = std::result::Result<T, CacheError>;
