//! Cache Key Module
//!
//! Keys are either text or integers; both normalize to one canonical text form.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// == Key ==
/// Normalized identifier of a cached entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Returns the canonical text form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

macro_rules! key_from_integer {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Key {
                fn from(value: $int) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

key_from_integer!(i32, i64, u32, u64, usize);

// == Entity ==
/// Entities that carry their own `id` field.
///
/// Lets a store be built without an explicit accessor, see
/// [`Store::for_entities`](crate::Store::for_entities).
pub trait Entity {
    fn id(&self) -> Key;
}

// == Target ==
/// What a delete should remove: a key directly, or the key of an entity.
#[derive(Debug)]
pub enum Target<T> {
    Key(Key),
    Entity(Arc<T>),
}

impl<T> Target<T> {
    /// Targets the key of `entity`.
    pub fn entity(entity: impl Into<Arc<T>>) -> Self {
        Self::Entity(entity.into())
    }

    /// Resolves the target to a key using the store's accessor.
    pub(crate) fn resolve(&self, id_accessor: impl Fn(&T) -> Key) -> Key {
        match self {
            Self::Key(key) => key.clone(),
            Self::Entity(entity) => id_accessor(entity),
        }
    }
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Key(key) => Self::Key(key.clone()),
            Self::Entity(entity) => Self::Entity(Arc::clone(entity)),
        }
    }
}

impl<T> From<Key> for Target<T> {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl<T> From<&str> for Target<T> {
    fn from(key: &str) -> Self {
        Self::Key(key.into())
    }
}

impl<T> From<String> for Target<T> {
    fn from(key: String) -> Self {
        Self::Key(key.into())
    }
}

impl<T> From<i64> for Target<T> {
    fn from(key: i64) -> Self {
        Self::Key(key.into())
    }
}

impl<T> From<u64> for Target<T> {
    fn from(key: u64) -> Self {
        Self::Key(key.into())
    }
}

impl<T> From<i32> for Target<T> {
    fn from(key: i32) -> Self {
        Self::Key(key.into())
    }
}

impl<T> From<Arc<T>> for Target<T> {
    fn from(entity: Arc<T>) -> Self {
        Self::Entity(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_text_keys_normalize_alike() {
        assert_eq!(Key::from(42i64), Key::from("42"));
        assert_eq!(Key::from(42u32), Key::from(String::from("42")));
        assert_eq!(Key::from(-7i32).as_str(), "-7");
    }

    #[test]
    fn test_key_display() {
        assert_eq!(Key::from(9usize).to_string(), "9");
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&Key::from(5u64)).unwrap();
        assert_eq!(json, "\"5\"");
    }

    #[test]
    fn test_target_resolution() {
        struct Row {
            id: u64,
        }

        let by_key: Target<Row> = Target::from("12");
        let by_entity: Target<Row> = Target::entity(Row { id: 12 });

        assert_eq!(by_key.resolve(|row| row.id.into()), Key::from(12u64));
        assert_eq!(by_entity.resolve(|row| row.id.into()), Key::from(12u64));
    }
}
