//! Get-or-set
//!
//! Returns the cached value of a key, or runs a producer, stores its first
//! value and re-reads the key. "Check, then write" is not atomic against
//! deletes arriving while the producer is pending, so the read is always
//! re-validated against the cell captured before the producer ran.

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use tracing::{trace, warn};

use super::{LoadSlot, Source, Store};
use crate::cache::{CellReceiver, Key};
use crate::error::{CacheError, Result};

enum Plan<T> {
    /// The key is present
    Hit(Arc<T>),
    /// Another caller is loading the key; wait for it to finish
    Wait(watch::Receiver<()>),
    /// This caller loads the key
    Load {
        cell: CellReceiver<T>,
        guard: LoadGuard<T>,
    },
}

/// Releases the in-flight slot of a load, waking its waiters, when dropped.
struct LoadGuard<T> {
    store: Store<T>,
    key: Key,
    id: u64,
    _done: watch::Sender<()>,
}

impl<T> Drop for LoadGuard<T> {
    fn drop(&mut self) {
        let mut state = self.store.inner.state.lock();
        if state.loads.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            state.loads.remove(&self.key);
        }
    }
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    // == Get Or Set ==
    /// Resolves `key` from the cache, or from the first value of `producer`.
    ///
    /// The producer runs at most once per attempt and only when no other
    /// caller is already loading the same key; concurrent callers share the
    /// first load. If the entry is deleted before the written value can be
    /// observed, the whole procedure is retried, up to
    /// [`max_get_or_set_attempts`](crate::StoreConfig::max_get_or_set_attempts).
    ///
    /// # Errors
    /// - [`CacheError::Producer`] if the producer fails
    /// - [`CacheError::ProducerEmpty`] if it completes without a value
    /// - [`CacheError::KeyMismatch`] if its value belongs to another key
    /// - [`CacheError::RaceUnresolved`] once the retry bound is reached
    /// - [`CacheError::Disposed`] on a disposed store
    pub async fn get_or_set<K, F, E>(
        &self,
        key: K,
        producer: F,
        ttl: Option<Duration>,
    ) -> Result<Arc<T>>
    where
        K: Into<Key>,
        F: Fn() -> Source<E>,
        E: Into<Arc<T>> + Send + 'static,
    {
        let key: Key = key.into();
        let ttl = self.ttl_or_default(ttl);
        let max_attempts = self.inner.config.max_get_or_set_attempts;
        let mut attempts = 0;

        loop {
            match self.plan_get_or_set(&key)? {
                Plan::Hit(value) => return Ok(value),
                Plan::Wait(mut done) => {
                    trace!(key = %key, "waiting for in-flight load");
                    // Errors once the loader has finished, successfully or not.
                    let _ = done.changed().await;
                }
                Plan::Load { cell, guard } => {
                    // Only producer runs count against the bound.
                    if attempts >= max_attempts {
                        return Err(CacheError::RaceUnresolved { key, attempts });
                    }
                    attempts += 1;
                    let entity = first_value(&key, producer()).await?;

                    let written = {
                        let mut state = self.lock_live()?;
                        self.write_locked(&mut state, entity, ttl)
                    };
                    drop(guard);

                    if written != key {
                        warn!(expected = %key, actual = %written, "producer yielded an entity for another key");
                        return Err(CacheError::KeyMismatch {
                            expected: key,
                            actual: written,
                        });
                    }

                    let current = cell.borrow().clone();
                    if let Some(value) = current {
                        return Ok(value);
                    }

                    // The captured cell was removed; the write may sit in a fresh one.
                    let mut state = self.lock_live()?;
                    if let Some(value) = state.cells.value(&key) {
                        trace!(key = %key, "entry replaced while loading");
                        return Ok(value);
                    }
                    state.stats.record_race_retry();
                    drop(state);
                    warn!(key = %key, attempt = attempts, "entry vanished before it was observed");
                }
            }
        }
    }

    /// Like [`get_or_set`](Self::get_or_set), then keeps following the key.
    ///
    /// Consecutive emissions of the same `Arc` are suppressed, so the value
    /// returned by the load is not repeated by the key's replay.
    pub fn get_or_set_stream<K, F, E>(
        &self,
        key: K,
        producer: F,
        ttl: Option<Duration>,
    ) -> BoxStream<'static, Result<Arc<T>>>
    where
        K: Into<Key>,
        F: Fn() -> Source<E> + Send + 'static,
        E: Into<Arc<T>> + Send + 'static,
    {
        let store = self.clone();
        let key: Key = key.into();

        stream::once(async move {
            let value = store.get_or_set(key.clone(), producer, ttl).await?;
            Ok::<_, CacheError>((value, store.get(key)))
        })
        .flat_map(|loaded: Result<(Arc<T>, _)>| match loaded {
            Ok((value, follow)) => stream::once(future::ready(Ok(value)))
                .chain(follow.map(Ok))
                .boxed(),
            Err(err) => stream::once(future::ready(Err(err))).boxed(),
        })
        .scan(None::<Arc<T>>, |last, item| {
            let out = match item {
                Ok(value) if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &value)) => None,
                Ok(value) => {
                    *last = Some(Arc::clone(&value));
                    Some(Ok(value))
                }
                Err(err) => Some(Err(err)),
            };
            future::ready(Some(out))
        })
        .filter_map(future::ready)
        .boxed()
    }

    fn plan_get_or_set(&self, key: &Key) -> Result<Plan<T>> {
        let mut state = self.lock_live()?;

        let (current, cell) = {
            let cell = state.cells.get_or_create_cell(key);
            (cell.current(), cell.subscribe())
        };
        if let Some(value) = current {
            state.stats.record_hit();
            return Ok(Plan::Hit(value));
        }
        if let Some(slot) = state.loads.get(key) {
            return Ok(Plan::Wait(slot.done.clone()));
        }

        state.next_load_id += 1;
        let id = state.next_load_id;
        let (done_tx, done) = watch::channel(());
        state.loads.insert(key.clone(), LoadSlot { id, done });
        state.stats.record_miss();

        Ok(Plan::Load {
            cell,
            guard: LoadGuard {
                store: self.clone(),
                key: key.clone(),
                id,
                _done: done_tx,
            },
        })
    }
}

/// First value of a producer; the rest of its stream is dropped.
async fn first_value<T, E>(key: &Key, source: Source<E>) -> Result<Arc<T>>
where
    E: Into<Arc<T>> + Send + 'static,
{
    match source.into_stream().next().await {
        Some(Ok(value)) => Ok(value.into()),
        Some(Err(err)) => Err(err),
        None => Err(CacheError::ProducerEmpty(key.clone())),
    }
}
