//! Cache Module
//!
//! Building blocks of the store: keys, replaying cells, the keyed cell map,
//! the change bus and statistics.

mod bus;
mod cell;
mod entry;
mod key;
mod keyed;
mod stats;


// Re-export public types
pub use bus::ChangeBus;
pub use cell::{present_values, Cell, CellReceiver, EntityStream};
pub use entry::EntryInfo;
pub use key::{Entity, Key, Target};
pub use keyed::KeyedValueStore;
pub use stats::CacheStats;
