//! Background Tasks Module
//!
//! Contains the timer tasks that run alongside a store.
//!
//! # Tasks
//! - TTL Eviction: one timer per key, removing the entry once its TTL elapses

mod eviction;

pub use eviction::EvictionScheduler;
