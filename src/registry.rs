//! Store Registry
//!
//! Named singleton lookup: the same name always yields the same store,
//! constructed lazily on first request.

use std::any::Any;
use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::store::Store;

trait Registered: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dispose(&self);
}

impl<T> Registered for Store<T>
where
    T: Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dispose(&self) {
        Store::dispose(self);
    }
}

// == Store Registry ==
/// Keeps one [`Store`] per name, of any entity type.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<String, Box<dyn Registered>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store registered as `name`, creating it with `init` if absent.
    ///
    /// # Errors
    /// - [`CacheError::RegistryTypeMismatch`] if `name` holds a store of another entity type
    /// - any error returned by `init`
    pub fn get_or_create<T, F>(&self, name: &str, init: F) -> Result<Store<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Store<T>>,
    {
        let mut stores = self.stores.lock();
        if let Some(existing) = stores.get(name) {
            return existing
                .as_any()
                .downcast_ref::<Store<T>>()
                .cloned()
                .ok_or_else(|| CacheError::RegistryTypeMismatch(name.to_owned()));
        }

        let store = init()?;
        stores.insert(name.to_owned(), Box::new(store.clone()));
        debug!(name, "store registered");
        Ok(store)
    }

    /// Returns the store registered as `name`, if it exists with entity type `T`.
    pub fn get<T>(&self, name: &str) -> Option<Store<T>>
    where
        T: Send + Sync + 'static,
    {
        self.stores
            .lock()
            .get(name)
            .and_then(|store| store.as_any().downcast_ref::<Store<T>>().cloned())
    }

    /// Unregisters and disposes the store registered as `name`.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.stores.lock().remove(name);
        match removed {
            Some(store) => {
                store.dispose();
                debug!(name, "store removed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}
