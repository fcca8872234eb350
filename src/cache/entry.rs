//! Cache Entry Module
//!
//! Creation and expiry bookkeeping for a cached entity.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Key;

// == Entry Info ==
/// Bookkeeping of a present entry, as reported by [`Store::entry_info`](crate::Store::entry_info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Key the entry is stored under
    pub key: Key,
    /// Time of the last write, including identical re-writes
    pub created_at: DateTime<Utc>,
    /// Time the eviction timer is due, None if no timer is armed
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntryInfo {
    // == Is Expired ==
    /// Checks if the entry's expiry time has passed.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiry. Entries without a timer never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Utc::now() >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the expiry time has passed
    /// - `Some(remaining)` if the timer is still pending
    /// - `None` if no timer is armed
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| (expires - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

// == Utility Functions ==
/// Adds a std duration to a wall-clock timestamp, saturating on overflow.
pub(crate) fn deadline_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
