//! Producer-driven operations
//!
//! `set`, `set_many` and `delete` fed by a future or a stream. Each emitted
//! value goes through the same synchronous path as a direct call, in the
//! order the producer emits it.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};

use super::source::until_error;
use super::{Source, Store};
use crate::cache::{EntityStream, Key, Target};
use crate::error::Result;

enum Step<T> {
    Follow(Option<Arc<T>>),
    Produced(Option<Result<EntityStream<T>>>),
}

/// Forwards the values of the latest inner stream; a new inner stream
/// replaces the previous one. Ends on the first error, or once both the
/// outer stream and the current inner stream are exhausted.
fn switch_latest<T>(
    outer: BoxStream<'static, Result<EntityStream<T>>>,
) -> BoxStream<'static, Result<Arc<T>>>
where
    T: Send + Sync + 'static,
{
    struct Switch<T> {
        outer: Option<BoxStream<'static, Result<EntityStream<T>>>>,
        inner: Option<EntityStream<T>>,
    }

    let state = Switch {
        outer: Some(outer),
        inner: None,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            let step = match (state.outer.as_mut(), state.inner.as_mut()) {
                (None, None) => return None,
                (Some(outer), None) => Step::Produced(outer.next().await),
                (None, Some(inner)) => Step::Follow(inner.next().await),
                // A value already emitted by the current key wins over
                // pulling the next one from the producer.
                (Some(outer), Some(inner)) => tokio::select! {
                    biased;
                    value = inner.next() => Step::Follow(value),
                    produced = outer.next() => Step::Produced(produced),
                },
            };

            match step {
                Step::Follow(Some(value)) => return Some((Ok(value), state)),
                Step::Follow(None) => state.inner = None,
                Step::Produced(Some(Ok(inner))) => state.inner = Some(inner),
                Step::Produced(Some(Err(err))) => {
                    state.outer = None;
                    state.inner = None;
                    return Some((Err(err), state));
                }
                Step::Produced(None) => state.outer = None,
            }
        }
    })
    .boxed()
}

impl<T> Store<T>
where
    T: Send + Sync + 'static,
{
    // == Set From ==
    /// Stores every value `source` emits.
    ///
    /// The returned stream follows the key of the most recently stored value,
    /// like the stream returned by [`set`](Self::set). A producer failure is
    /// forwarded as the last item. Values already stored stay cached.
    ///
    /// Values are written as the returned stream is polled; dropping it
    /// unpolled stores nothing.
    #[must_use = "values are only stored while the stream is polled"]
    pub fn set_from<E>(&self, source: Source<E>, ttl: Option<Duration>) -> BoxStream<'static, Result<Arc<T>>>
    where
        E: Into<Arc<T>> + Send + 'static,
    {
        let store = self.clone();
        let ttl = self.ttl_or_default(ttl);
        let written = source
            .into_stream()
            .map(move |item| item.and_then(|entity| store.set_with_ttl(entity, ttl)))
            .boxed();
        switch_latest(written)
    }

    // == Set Many From ==
    /// Stores every batch `source` emits. Yields the keys of each batch.
    ///
    /// Batches are applied whole. A failing producer ends the stream with its
    /// error; batches applied before it are not rolled back. Batches are
    /// written as the returned stream is polled.
    #[must_use = "batches are only stored while the stream is polled"]
    pub fn set_many_from<E>(
        &self,
        source: Source<Vec<E>>,
        ttl: Option<Duration>,
    ) -> BoxStream<'static, Result<Vec<Key>>>
    where
        E: Into<Arc<T>> + Send + 'static,
    {
        let store = self.clone();
        let batches = source
            .into_stream()
            .map(move |batch| batch.and_then(|entities| store.set_many(entities, ttl)))
            .boxed();
        until_error(batches)
    }

    // == Delete From ==
    /// Deletes every key or entity `source` emits. Yields the resolved keys.
    ///
    /// Deletes happen as the returned stream is polled.
    #[must_use = "targets are only deleted while the stream is polled"]
    pub fn delete_from(&self, source: Source<Target<T>>) -> BoxStream<'static, Result<Key>> {
        let store = self.clone();
        let deleted = source
            .into_stream()
            .map(move |target| -> Result<Key> {
                let key = target?.resolve(|entity| store.key_of(entity));
                store.delete(Target::Key(key.clone()))?;
                Ok(key)
            })
            .boxed();
        until_error(deleted)
    }
}
