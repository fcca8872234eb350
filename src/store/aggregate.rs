//! Aggregate View
//!
//! Full snapshots of every present entity, rebuilt from the change bus with a
//! trailing debounce so bursts of writes produce a single snapshot.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::trace;

use super::{Store, StoreInner};

/// Stream of full snapshots, in arbitrary order within a snapshot.
pub type SnapshotStream<T> = BoxStream<'static, Vec<Arc<T>>>;

struct Aggregate<T> {
    store: Weak<StoreInner<T>>,
    changes: broadcast::Receiver<()>,
    window: Duration,
    initial: Option<Vec<Arc<T>>>,
    closed: bool,
}

impl<T> Aggregate<T> {
    async fn next_snapshot(&mut self) -> Option<Vec<Arc<T>>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        if self.closed {
            return None;
        }

        // Wait for the start of a burst.
        match self.changes.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return None,
        }

        // Trailing debounce: every further signal restarts the window.
        let mut coalesced = 1usize;
        loop {
            match tokio::time::timeout(self.window, self.changes.recv()).await {
                Err(_) => break,
                Ok(Ok(())) | Ok(Err(RecvError::Lagged(_))) => coalesced += 1,
                Ok(Err(RecvError::Closed)) => {
                    // Flush the pending burst, then end.
                    self.closed = true;
                    break;
                }
            }
        }

        let snapshot = self.snapshot()?;
        trace!(coalesced, entries = snapshot.len(), "aggregate snapshot rebuilt");
        Some(snapshot)
    }

    fn snapshot(&self) -> Option<Vec<Arc<T>>> {
        let inner = self.store.upgrade()?;
        let state = inner.state.lock();
        let values = state.cells.present_values();
        Some(values)
    }
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    // == Get All ==
    /// Streams snapshots of every present entity.
    ///
    /// The current snapshot is emitted immediately on subscription, empty if
    /// nothing is cached. Afterwards each burst of changes produces one new
    /// snapshot once no further change arrived for
    /// [`aggregate_debounce`](crate::StoreConfig::aggregate_debounce). The
    /// stream ends after the store is disposed.
    ///
    /// The window is measured while the stream is being polled. Signals that
    /// queued up while the consumer was away are drained at once, so a late
    /// consumer gets its snapshot one window after it resumes polling, not
    /// one window after the last change of the burst.
    pub fn get_all(&self) -> SnapshotStream<T> {
        let (initial, changes) = {
            let state = self.inner.state.lock();
            if state.disposed {
                return stream::empty().boxed();
            }
            (state.cells.present_values(), state.bus.subscribe())
        };

        let Some(changes) = changes else {
            return stream::once(future::ready(initial)).boxed();
        };

        let aggregate = Aggregate {
            store: Arc::downgrade(&self.inner),
            changes,
            window: self.inner.config.aggregate_debounce,
            initial: Some(initial),
            closed: false,
        };

        stream::unfold(aggregate, |mut aggregate| async move {
            let snapshot = aggregate.next_snapshot().await?;
            Some((snapshot, aggregate))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    use crate::config::StoreConfig;

    fn store() -> Store<(u32, &'static str)> {
        Store::new(StoreConfig::default(), |entry: &(u32, &'static str)| entry.0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_snapshot_is_immediate() {
        let store = store();
        store.set((1u32, "a")).unwrap();

        let mut all = store.get_all();
        let first = all.next().now_or_never().flatten().unwrap();
        assert_eq!(first.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced() {
        let store = store();
        let mut all = store.get_all();
        assert!(all.next().await.unwrap().is_empty());

        store.set((1u32, "a")).unwrap();
        store.set((2u32, "b")).unwrap();
        store.delete(1u64).unwrap();

        let snapshot = all.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1, "b");

        let quiet = tokio::time::timeout(Duration::from_secs(1), all.next()).await;
        assert!(quiet.is_err(), "no further snapshot expected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_consumer_waits_one_window_after_resuming() {
        let store = store();
        let window = store.config().aggregate_debounce;
        let mut all = store.get_all();
        assert!(all.next().await.unwrap().is_empty());

        store.set((1u32, "a")).unwrap();
        store.set((2u32, "b")).unwrap();
        tokio::time::sleep(window * 10).await;

        let resumed = tokio::time::Instant::now();
        let snapshot = all.next().await.unwrap();
        let waited = resumed.elapsed();

        assert_eq!(snapshot.len(), 2);
        assert!(waited >= window && waited < window * 2, "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_after_dispose() {
        let store = store();
        store.set((1u32, "a")).unwrap();
        let mut all = store.get_all();
        assert_eq!(all.next().await.unwrap().len(), 1);

        store.dispose();
        assert!(all.next().await.unwrap().is_empty());
        assert!(all.next().await.is_none());
        assert!(store.get_all().next().await.is_none());
    }
}
