//! Cache Cell Module
//!
//! A per-key replaying value holder. New subscribers see the latest value
//! first, then every later change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use crate::cache::entry::deadline_after;

/// Receiving half of a cell, captured by streams at subscribe time.
pub type CellReceiver<T> = watch::Receiver<Option<Arc<T>>>;

/// Stream of present values for one key.
pub type EntityStream<T> = BoxStream<'static, Arc<T>>;

// == Cell ==
/// Current value (or absent) of one key plus its subscriber fan-out.
///
/// Dropping the cell closes it: subscribers drain the last value and end.
#[derive(Debug)]
pub struct Cell<T> {
    tx: watch::Sender<Option<Arc<T>>>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl<T> Cell<T> {
    /// Creates an absent cell.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Returns the current value, if present.
    pub fn current(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    pub fn is_present(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// True if `value` is the very allocation already stored.
    pub fn holds(&self, value: &Arc<T>) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, value))
    }

    /// Stores `value` and pushes it to every subscriber.
    pub fn write(&mut self, value: Arc<T>) {
        self.tx.send_replace(Some(value));
        self.touch();
    }

    /// Marks the cell absent. Subscribers filtering on presence see nothing.
    pub fn clear(&mut self) -> Option<Arc<T>> {
        self.expires_at = None;
        self.tx.send_replace(None)
    }

    /// Resets the creation bookkeeping without touching the value.
    pub fn touch(&mut self) {
        self.created_at = Utc::now();
    }

    /// Records when the eviction timer for this cell is due.
    pub fn set_expiry(&mut self, ttl: Duration) {
        self.expires_at = Some(deadline_after(Utc::now(), ttl));
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Number of live subscribers attached to this cell.
    pub fn observers(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self) -> CellReceiver<T> {
        self.tx.subscribe()
    }
}

impl<T> Default for Cell<T> {
    fn default() -> Self {
        Self::new()
    }
}

// == Present Values ==
/// Turns a captured receiver into a stream of present values.
///
/// The current value is replayed first; absence is skipped. The stream ends
/// once the cell is dropped.
pub fn present_values<T>(rx: CellReceiver<T>) -> EntityStream<T>
where
    T: Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, replay)| async move {
        if replay {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return Some((value, (rx, false)));
            }
        }
        loop {
            if rx.changed().await.is_err() {
                return None;
            }
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return Some((value, (rx, false)));
            }
        }
    })
    .boxed()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_new_cell_is_absent() {
        let cell: Cell<String> = Cell::new();

        assert!(!cell.is_present());
        assert!(cell.current().is_none());
        assert!(cell.expires_at().is_none());
    }

    #[test]
    fn test_holds_compares_identity() {
        let mut cell = Cell::new();
        let value = Arc::new(String::from("v"));
        cell.write(Arc::clone(&value));

        assert!(cell.holds(&value));
        assert!(!cell.holds(&Arc::new(String::from("v"))));
    }

    #[test]
    fn test_clear_returns_previous() {
        let mut cell = Cell::new();
        cell.write(Arc::new(1u32));
        cell.set_expiry(Duration::from_secs(1));

        assert_eq!(cell.clear().as_deref(), Some(&1));
        assert!(!cell.is_present());
        assert!(cell.expires_at().is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_replay() {
        let mut cell = Cell::new();
        cell.write(Arc::new(7u32));

        let mut values = present_values(cell.subscribe());
        assert_eq!(values.next().await.as_deref(), Some(&7));

        cell.write(Arc::new(8u32));
        assert_eq!(values.next().await.as_deref(), Some(&8));
    }

    #[tokio::test]
    async fn test_absent_values_are_skipped() {
        let mut cell: Cell<u32> = Cell::new();
        let mut values = present_values(cell.subscribe());

        assert!(values.next().now_or_never().is_none());

        cell.write(Arc::new(1));
        cell.clear();
        cell.write(Arc::new(2));
        assert_eq!(values.next().await.as_deref(), Some(&2));
    }

    #[tokio::test]
    async fn test_stream_ends_when_cell_dropped() {
        let mut cell = Cell::new();
        cell.write(Arc::new(3u32));
        let mut values = present_values(cell.subscribe());
        assert_eq!(values.next().await.as_deref(), Some(&3));

        cell.clear();
        drop(cell);
        assert!(values.next().await.is_none());
    }

    #[test]
    fn test_observer_count() {
        let cell: Cell<u32> = Cell::new();
        let first = cell.subscribe();
        let _second = cell.subscribe();
        assert_eq!(cell.observers(), 2);

        drop(first);
        assert_eq!(cell.observers(), 1);
    }
}
