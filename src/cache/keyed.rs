//! Keyed Value Store Module
//!
//! Owns at most one cell per key. Cells are created lazily and removed
//! eagerly on delete, so memory is bounded by the keys currently referenced.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{Cell, Key};

// == Keyed Value Store ==
#[derive(Debug)]
pub struct KeyedValueStore<T> {
    cells: HashMap<Key, Cell<T>>,
}

impl<T> KeyedValueStore<T> {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    // == Get Or Create ==
    /// Returns the cell for `key`, inserting an absent one if needed.
    pub fn get_or_create_cell(&mut self, key: &Key) -> &mut Cell<T> {
        self.cells.entry(key.clone()).or_default()
    }

    pub fn cell(&self, key: &Key) -> Option<&Cell<T>> {
        self.cells.get(key)
    }

    pub fn cell_mut(&mut self, key: &Key) -> Option<&mut Cell<T>> {
        self.cells.get_mut(key)
    }

    // == Write ==
    /// Stores `value` under `key`. Identity checks belong to the caller.
    pub fn write(&mut self, key: &Key, value: Arc<T>) {
        self.get_or_create_cell(key).write(value);
    }

    // == Clear Key ==
    /// Marks the cell absent and removes it from the map.
    ///
    /// Returns the value that was present, if any. Subscribers that captured
    /// the cell observe the absence, then their streams end.
    pub fn clear_key(&mut self, key: &Key) -> Option<Arc<T>> {
        let mut cell = self.cells.remove(key)?;
        cell.clear()
    }

    // == Clear All ==
    /// Tears down every cell and empties the map. Returns how many keys were present.
    pub fn clear_all(&mut self) -> usize {
        self.cells
            .drain()
            .filter_map(|(_, mut cell)| cell.clear())
            .count()
    }

    /// Current value of `key`, if present.
    pub fn value(&self, key: &Key) -> Option<Arc<T>> {
        self.cells.get(key).and_then(Cell::current)
    }

    pub fn is_present(&self, key: &Key) -> bool {
        self.cells.get(key).is_some_and(Cell::is_present)
    }

    /// Keys whose cell currently holds a value.
    pub fn present_keys(&self) -> Vec<Key> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.is_present())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Values of every present key, in arbitrary order.
    pub fn present_values(&self) -> Vec<Arc<T>> {
        self.cells.values().filter_map(Cell::current).collect()
    }

    pub fn present_len(&self) -> usize {
        self.cells.values().filter(|cell| cell.is_present()).count()
    }

    /// Number of cells, including absent ones created by reads.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl<T> Default for KeyedValueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_new() {
        let store: KeyedValueStore<u32> = KeyedValueStore::new();
        assert_eq!(store.cell_count(), 0);
        assert_eq!(store.present_len(), 0);
    }

    #[test]
    fn test_get_or_create_reuses_cell() {
        let mut store: KeyedValueStore<u32> = KeyedValueStore::new();
        let key = Key::from("a");

        store.get_or_create_cell(&key);
        store.get_or_create_cell(&key);

        assert_eq!(store.cell_count(), 1);
        assert!(!store.is_present(&key));
    }

    #[test]
    fn test_write_and_read() {
        let mut store = KeyedValueStore::new();
        let key = Key::from(1u64);

        store.write(&key, Arc::new("one"));

        assert_eq!(store.value(&key).as_deref(), Some(&"one"));
        assert_eq!(store.present_keys(), vec![key]);
    }

    #[test]
    fn test_clear_key_removes_cell() {
        let mut store = KeyedValueStore::new();
        let key = Key::from("a");
        store.write(&key, Arc::new(1u32));
        let rx = store.get_or_create_cell(&key).subscribe();

        assert_eq!(store.clear_key(&key).as_deref(), Some(&1));
        assert_eq!(store.cell_count(), 0);
        // The captured receiver still sees the absence.
        assert!(rx.borrow().is_none());

        // A later access starts from a fresh cell.
        assert!(!store.get_or_create_cell(&key).is_present());
    }

    #[test]
    fn test_clear_key_missing_is_noop() {
        let mut store: KeyedValueStore<u32> = KeyedValueStore::new();
        assert!(store.clear_key(&Key::from("missing")).is_none());
    }

    #[test]
    fn test_clear_all_counts_present() {
        let mut store = KeyedValueStore::new();
        store.write(&Key::from("a"), Arc::new(1u32));
        store.write(&Key::from("b"), Arc::new(2u32));
        store.get_or_create_cell(&Key::from("c"));

        assert_eq!(store.clear_all(), 2);
        assert_eq!(store.cell_count(), 0);
        assert!(store.present_values().is_empty());
    }
}
