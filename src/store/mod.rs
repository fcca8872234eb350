//! Store Module
//!
//! The public face of the cache. A [`Store`] composes the keyed cells, the
//! eviction scheduler and the change bus behind set / get / get-or-set /
//! delete / clear / dispose.

mod aggregate;
mod get_or_set;
mod producers;
mod source;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::cache::{
    present_values, CacheStats, ChangeBus, Entity, EntityStream, EntryInfo, Key,
    KeyedValueStore, Target,
};
use crate::config::{EvictionPolicy, StoreConfig};
use crate::error::{CacheError, Result};
use crate::tasks::EvictionScheduler;

pub use aggregate::SnapshotStream;
pub use source::Source;

/// Derives the key of an entity.
pub type IdAccessor<T> = Arc<dyn Fn(&T) -> Key + Send + Sync>;

// == Store ==
/// A reactive entity cache with per-key TTL.
///
/// Cloning is cheap; clones share the same entries, timers and subscribers.
///
/// # Example
///
/// ```rust,no_run
/// use rx_entity_cache::{Store, StoreConfig};
/// use futures::StreamExt;
///
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// #[tokio::main]
/// async fn main() -> rx_entity_cache::Result<()> {
///     let users = Store::new(StoreConfig::default(), |user: &User| user.id)?;
///
///     let mut alice = users.get(1u64);
///     users.set(User { id: 1, name: "alice".into() })?;
///
///     assert_eq!(alice.next().await.unwrap().name, "alice");
///     Ok(())
/// }
/// ```
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<T> {
    config: StoreConfig,
    id_accessor: IdAccessor<T>,
    state: Mutex<State<T>>,
}

struct State<T> {
    cells: KeyedValueStore<T>,
    evictions: EvictionScheduler,
    bus: ChangeBus,
    /// In-flight get-or-set loads, one per key
    loads: HashMap<Key, LoadSlot>,
    next_load_id: u64,
    stats: CacheStats,
    disposed: bool,
}

/// Marker for a running get-or-set producer. Waiters are woken when the
/// loader drops its sender.
struct LoadSlot {
    id: u64,
    done: watch::Receiver<()>,
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a store keyed by `id_accessor`.
    ///
    /// Must be called from within a Tokio runtime; eviction timers are
    /// spawned on the runtime that created the store.
    pub fn new<F, K>(config: StoreConfig, id_accessor: F) -> Result<Self>
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Into<Key>,
    {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let state = State {
            cells: KeyedValueStore::new(),
            evictions: EvictionScheduler::new(runtime),
            bus: ChangeBus::new(config.change_bus_capacity),
            loads: HashMap::new(),
            next_load_id: 0,
            stats: CacheStats::new(),
            disposed: false,
        };

        debug!(
            default_cache_time_ms = config.default_cache_time.as_millis() as u64,
            policy = ?config.eviction_policy,
            "store created"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                id_accessor: Arc::new(move |entity: &T| -> Key { id_accessor(entity).into() }),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Key `entity` is stored under.
    pub fn key_of(&self, entity: &T) -> Key {
        (self.inner.id_accessor)(entity)
    }

    // == Set ==
    /// Stores `entity` with the default TTL and returns its [`get`](Self::get) stream.
    ///
    /// Writing the very same `Arc` that is already stored only refreshes the
    /// entry's creation time: no emission, no timer reset, no change signal.
    pub fn set(&self, entity: impl Into<Arc<T>>) -> Result<EntityStream<T>> {
        self.set_with_ttl(entity, self.inner.config.default_cache_time)
    }

    /// Stores `entity`, evicting it after `ttl` unless written again.
    pub fn set_with_ttl(&self, entity: impl Into<Arc<T>>, ttl: Duration) -> Result<EntityStream<T>> {
        let rx = {
            let mut state = self.lock_live()?;
            let key = self.write_locked(&mut state, entity.into(), ttl);
            state.cells.get_or_create_cell(&key).subscribe()
        };
        Ok(present_values(rx))
    }

    // == Set Many ==
    /// Applies [`set`](Self::set) to every entity. Returns the keys written.
    pub fn set_many<I>(&self, entities: I, ttl: Option<Duration>) -> Result<Vec<Key>>
    where
        I: IntoIterator,
        I::Item: Into<Arc<T>>,
    {
        let ttl = self.ttl_or_default(ttl);
        let mut state = self.lock_live()?;
        let keys: Vec<Key> = entities
            .into_iter()
            .map(|entity| self.write_locked(&mut state, entity.into(), ttl))
            .collect();
        trace!(count = keys.len(), "batch written");
        Ok(keys)
    }

    // == Get ==
    /// Streams the present values of `key`: the current one first, then every change.
    ///
    /// Absence is never emitted. A key that was never written yields nothing
    /// until it is set. The stream ends when the key is deleted or the store
    /// is cleared, and is empty on a disposed store.
    pub fn get(&self, key: impl Into<Key>) -> EntityStream<T> {
        let key: Key = key.into();
        let rx = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return stream::empty().boxed();
            }
            state.cells.get_or_create_cell(&key).subscribe()
        };
        trace!(key = %key, "get subscribed");
        present_values(rx)
    }

    /// Current value of `key` without subscribing.
    pub fn peek(&self, key: impl Into<Key>) -> Option<Arc<T>> {
        self.inner.state.lock().cells.value(&key.into())
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.inner.state.lock().cells.is_present(&key.into())
    }

    /// Number of present keys.
    pub fn len(&self) -> usize {
        self.inner.state.lock().cells.present_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently holding a value, in arbitrary order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.state.lock().cells.present_keys()
    }

    /// Creation and expiry bookkeeping of a present key.
    pub fn entry_info(&self, key: impl Into<Key>) -> Option<EntryInfo> {
        let key: Key = key.into();
        let state = self.inner.state.lock();
        let cell = state.cells.cell(&key).filter(|cell| cell.is_present())?;
        Some(EntryInfo {
            created_at: cell.created_at(),
            expires_at: cell.expires_at(),
            key,
        })
    }

    // == Delete ==
    /// Removes the entry for a key or an entity's key. Returns true if a value was present.
    ///
    /// The eviction timer is cancelled and a change signal is posted either way.
    pub fn delete(&self, target: impl Into<Target<T>>) -> Result<bool> {
        let target: Target<T> = target.into();
        let key = target.resolve(|entity| self.key_of(entity));
        let mut state = self.lock_live()?;
        Ok(Self::delete_locked(&mut state, &key))
    }

    // == Clear ==
    /// Removes every entry and posts one change signal. No-op once disposed.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        Self::clear_locked(&mut state);
    }

    // == Dispose ==
    /// Clears the store and closes the change bus for good.
    ///
    /// Afterwards mutating calls fail with [`CacheError::Disposed`] and reads
    /// return empty streams. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        Self::clear_locked(&mut state);
        state.bus.close();
        state.loads.clear();
        state.disposed = true;
        info!("store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.cells.present_len());
        stats
    }

    // == Internals ==
    fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.inner.config.default_cache_time)
    }

    fn lock_live(&self) -> Result<MutexGuard<'_, State<T>>> {
        let state = self.inner.state.lock();
        if state.disposed {
            return Err(CacheError::Disposed);
        }
        Ok(state)
    }

    /// Writes one entity and returns its key. Identical writes only touch
    /// the creation time.
    fn write_locked(&self, state: &mut State<T>, entity: Arc<T>, ttl: Duration) -> Key {
        let key = self.key_of(&entity);
        let cell = state.cells.get_or_create_cell(&key);

        if cell.holds(&entity) {
            cell.touch();
            trace!(key = %key, "identical value, write skipped");
            return key;
        }

        cell.write(entity);
        self.arm_timer(state, key.clone(), ttl);
        state.stats.record_write();
        state.bus.post();
        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "value written");
        key
    }

    fn arm_timer(&self, state: &mut State<T>, key: Key, ttl: Duration) {
        if let Some(cell) = state.cells.cell_mut(&key) {
            cell.set_expiry(ttl);
        }
        let store = Arc::downgrade(&self.inner);
        state.evictions.schedule(key, ttl, move |key, generation| {
            if let Some(inner) = store.upgrade() {
                Store { inner }.expire(key, generation, ttl);
            }
        });
    }

    /// Runs when the eviction timer for `key` fires.
    fn expire(&self, key: Key, generation: u64, ttl: Duration) {
        let mut state = self.inner.state.lock();
        if !state.evictions.finish(&key, generation) {
            trace!(key = %key, generation, "stale eviction timer ignored");
            return;
        }

        if self.inner.config.eviction_policy == EvictionPolicy::DeferWhileObserved {
            let observers = state.cells.cell(&key).map_or(0, |cell| cell.observers());
            if observers > 0 {
                debug!(key = %key, observers, "eviction deferred while observed");
                self.arm_timer(&mut state, key, ttl);
                return;
            }
        }

        if state.cells.clear_key(&key).is_some() {
            state.stats.record_expiration();
            debug!(key = %key, "entry expired");
        }
        state.bus.post();
    }

    fn delete_locked(state: &mut State<T>, key: &Key) -> bool {
        state.evictions.cancel(key);
        let removed = state.cells.clear_key(key).is_some();
        if removed {
            state.stats.record_delete();
        }
        state.bus.post();
        debug!(key = %key, removed, "entry deleted");
        removed
    }

    fn clear_locked(state: &mut State<T>) {
        let timers = state.evictions.cancel_all();
        let entries = state.cells.clear_all();
        state.bus.post();
        info!(entries, timers, "store cleared");
    }
}

impl<T> Store<T>
where
    T: Entity + Send + Sync + 'static,
{
    /// Creates a store keyed by the entities' own [`Entity::id`].
    pub fn for_entities(config: StoreConfig) -> Result<Self> {
        Self::new(config, |entity: &T| entity.id())
    }
}
