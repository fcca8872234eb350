//! Configuration Module
//!
//! Handles loading and managing store configuration from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the eviction timer does when it fires for a key that still has observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict regardless of subscribers
    #[default]
    Unconditional,
    /// Re-arm the timer for the same delay while the key is being observed
    DeferWhileObserved,
}

impl EvictionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unconditional" => Some(Self::Unconditional),
            "defer" | "defer_while_observed" => Some(Self::DeferWhileObserved),
            _ => None,
        }
    }
}

/// Store configuration parameters.
///
/// Immutable once handed to a store. All values can be configured via
/// environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// TTL applied by writes that do not pass their own
    pub default_cache_time: Duration,
    /// Quiescence window used to coalesce aggregate snapshots
    pub aggregate_debounce: Duration,
    /// Behavior of eviction timers for observed keys
    pub eviction_policy: EvictionPolicy,
    /// Upper bound on get-or-set race retries
    pub max_get_or_set_attempts: u32,
    /// Buffered change signals per aggregate subscriber
    pub change_bus_capacity: usize,
}

impl StoreConfig {
    /// Creates a new StoreConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 600000)
    /// - `CACHE_AGGREGATE_DEBOUNCE_MS` - Snapshot debounce in milliseconds (default: 200)
    /// - `CACHE_EVICTION_POLICY` - `unconditional` or `defer` (default: unconditional)
    /// - `CACHE_MAX_RACE_ATTEMPTS` - get-or-set attempts before giving up (default: 8)
    /// - `CACHE_CHANGE_BUS_CAPACITY` - change bus buffer (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_cache_time: env_parse::<u64>("CACHE_DEFAULT_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_cache_time),
            aggregate_debounce: env_parse::<u64>("CACHE_AGGREGATE_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.aggregate_debounce),
            eviction_policy: env::var("CACHE_EVICTION_POLICY")
                .ok()
                .and_then(|v| EvictionPolicy::parse(&v))
                .unwrap_or(defaults.eviction_policy),
            max_get_or_set_attempts: env_parse::<u32>("CACHE_MAX_RACE_ATTEMPTS")
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_get_or_set_attempts),
            change_bus_capacity: env_parse::<usize>("CACHE_CHANGE_BUS_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.change_bus_capacity),
        }
    }

    pub fn with_default_cache_time(mut self, ttl: Duration) -> Self {
        self.default_cache_time = ttl;
        self
    }

    pub fn with_aggregate_debounce(mut self, window: Duration) -> Self {
        self.aggregate_debounce = window;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Sets the retry bound for get-or-set. Zero is clamped to one attempt.
    pub fn with_max_get_or_set_attempts(mut self, attempts: u32) -> Self {
        self.max_get_or_set_attempts = attempts.max(1);
        self
    }

    pub fn with_change_bus_capacity(mut self, capacity: usize) -> Self {
        self.change_bus_capacity = capacity.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_cache_time: Duration::from_millis(600_000),
            aggregate_debounce: Duration::from_millis(200),
            eviction_policy: EvictionPolicy::Unconditional,
            max_get_or_set_attempts: 8,
            change_bus_capacity: 64,
        }
    }
}

fn env_parse<V: std::str::FromStr>(name: &str) -> Option<V> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
