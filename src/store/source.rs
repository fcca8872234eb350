//! Value Sources
//!
//! Producers hand values to the store as a ready value, a future or a stream.
//! All three are normalized to one boxed push stream before any cache logic runs.

use std::fmt;
use std::future::Future;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use crate::error::{CacheError, Result};

// == Source ==
/// A value producer supplied by the caller.
pub enum Source<U> {
    /// A value that is already available
    Ready(U),
    /// A value that resolves later, or fails
    Future(BoxFuture<'static, anyhow::Result<U>>),
    /// Any number of values, possibly ending in a failure
    Stream(BoxStream<'static, anyhow::Result<U>>),
}

impl<U: Send + 'static> Source<U> {
    pub fn ready(value: U) -> Self {
        Self::Ready(value)
    }

    /// Wraps a fallible future.
    pub fn future<F, E>(future: F) -> Self
    where
        F: Future<Output = std::result::Result<U, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self::Future(future.map(|result| result.map_err(Into::into)).boxed())
    }

    /// Wraps a fallible stream.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<U, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self::Stream(stream.map_err(Into::into).boxed())
    }

    /// A stream that yields every value of `values` in order.
    pub fn iter<I>(values: I) -> Self
    where
        I: IntoIterator<Item = U>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(stream::iter(values.into_iter().map(Ok)).boxed())
    }

    /// Normalizes the source into a push stream.
    pub fn into_stream(self) -> BoxStream<'static, Result<U>> {
        match self {
            Self::Ready(value) => stream::once(future::ready(Ok(value))).boxed(),
            Self::Future(future) => stream::once(future.map(|r| r.map_err(CacheError::from))).boxed(),
            Self::Stream(stream) => stream.map_err(CacheError::from).boxed(),
        }
    }
}

impl<U> From<U> for Source<U> {
    fn from(value: U) -> Self {
        Self::Ready(value)
    }
}

impl<U> fmt::Debug for Source<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Source::Ready"),
            Self::Future(_) => f.write_str("Source::Future"),
            Self::Stream(_) => f.write_str("Source::Stream"),
        }
    }
}

// == Until Error ==
/// Forwards items up to and including the first error, then ends.
pub(crate) fn until_error<V>(items: BoxStream<'static, Result<V>>) -> BoxStream<'static, Result<V>>
where
    V: Send + 'static,
{
    stream::unfold(Some(items), |items| async move {
        let mut items = items?;
        match items.next().await? {
            Ok(value) => Some((Ok(value), Some(items))),
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect<U: Send + 'static>(source: Source<U>) -> Vec<Result<U>> {
        source.into_stream().collect().await
    }

    #[tokio::test]
    async fn test_ready_yields_once() {
        let items = collect(Source::ready(5u32)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].as_ref().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_future_failure_maps_to_producer_error() {
        let source: Source<u32> = Source::future(async { Err(anyhow::anyhow!("offline")) });
        let items = collect(source).await;

        assert!(matches!(items.as_slice(), [Err(CacheError::Producer(_))]));
    }

    #[tokio::test]
    async fn test_stream_keeps_order() {
        let source = Source::iter(vec![1u32, 2, 3]);
        let values: Vec<u32> = collect(source).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_foreign_error_types_are_boxed() {
        let failing: Vec<std::result::Result<u32, std::io::Error>> = vec![
            Ok(1),
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk")),
        ];
        let items = collect(Source::stream(stream::iter(failing))).await;
        assert!(matches!(items.as_slice(), [Ok(1), Err(CacheError::Producer(_))]));

        let future = Source::future(async {
            Err::<u32, _>(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        });
        let items = collect(future).await;
        assert!(matches!(items.as_slice(), [Err(CacheError::Producer(err))] if err.to_string() == "gone"));
    }

    #[tokio::test]
    async fn test_until_error_stops_after_first_error() {
        let items: Vec<std::result::Result<u32, anyhow::Error>> = vec![
            Ok(1),
            Err(anyhow::anyhow!("broken")),
            Ok(2),
        ];
        let forwarded: Vec<Result<u32>> =
            until_error(Source::stream(stream::iter(items)).into_stream())
                .collect()
                .await;

        assert_eq!(forwarded.len(), 2);
        assert!(matches!(forwarded[0], Ok(1)));
        assert!(matches!(forwarded[1], Err(CacheError::Producer(_))));
    }
}
