//! Eviction Scheduler
//!
//! One cancellable one-shot timer per key. Each timer runs as its own Tokio
//! task that sleeps for the TTL and then hands the key back to the store.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::cache::Key;

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

// == Eviction Scheduler ==
/// Owns at most one pending timer per key.
///
/// Every armed timer carries a generation number. A timer that already woke
/// up while its key was being rescheduled or cancelled finds its generation
/// superseded and must be ignored; see [`EvictionScheduler::finish`].
#[derive(Debug)]
pub struct EvictionScheduler {
    runtime: Handle,
    timers: HashMap<Key, Timer>,
    next_generation: u64,
}

impl EvictionScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    // == Schedule ==
    /// Cancels any timer for `key` and arms a new one.
    ///
    /// After `delay`, `on_expire` runs once with the key and the generation
    /// returned here.
    pub fn schedule<F>(&mut self, key: Key, delay: Duration, on_expire: F) -> u64
    where
        F: FnOnce(Key, u64) + Send + 'static,
    {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let timer_key = key.clone();

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire(timer_key, generation);
        });

        trace!(key = %key, generation, delay_ms = delay.as_millis() as u64, "eviction timer armed");
        self.timers.insert(key, Timer { generation, handle });
        generation
    }

    // == Cancel ==
    /// Cancels and discards the timer for `key`. No-op if none exists.
    pub fn cancel(&mut self, key: &Key) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    // == Finish ==
    /// Called by a fired timer. Discards its handle and returns true only if
    /// `generation` is still the armed timer for `key`.
    pub fn finish(&mut self, key: &Key, generation: u64) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_scheduled(&self, key: &Key) -> bool {
        self.timers.contains_key(key)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for EvictionScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<(Key, u64)>>>, impl Fn() -> Box<dyn FnOnce(Key, u64) + Send>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let make = move || {
            let sink = Arc::clone(&sink);
            Box::new(move |key: Key, generation: u64| sink.lock().push((key, generation)))
                as Box<dyn FnOnce(Key, u64) + Send>
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_delay() {
        let (fired, make) = recorder();
        let mut scheduler = EvictionScheduler::new(Handle::current());

        let generation = scheduler.schedule(Key::from("a"), Duration::from_secs(1), make());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock(), vec![(Key::from("a"), generation)]);
        assert!(scheduler.finish(&Key::from("a"), generation));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timer() {
        let (fired, make) = recorder();
        let mut scheduler = EvictionScheduler::new(Handle::current());
        let key = Key::from("a");

        let first = scheduler.schedule(key.clone(), Duration::from_secs(1), make());
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = scheduler.schedule(key.clone(), Duration::from_secs(1), make());
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(fired.lock().is_empty(), "first timer should have been aborted");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*fired.lock(), vec![(key.clone(), second)]);
        assert!(!scheduler.finish(&key, first));
        assert!(scheduler.finish(&key, second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (fired, make) = recorder();
        let mut scheduler = EvictionScheduler::new(Handle::current());

        scheduler.schedule(Key::from("a"), Duration::from_secs(1), make());
        assert!(scheduler.cancel(&Key::from("a")));
        assert!(!scheduler.cancel(&Key::from("a")));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (fired, make) = recorder();
        let mut scheduler = EvictionScheduler::new(Handle::current());

        scheduler.schedule(Key::from("a"), Duration::from_secs(1), make());
        scheduler.schedule(Key::from("b"), Duration::from_secs(1), make());
        assert_eq!(scheduler.cancel_all(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().is_empty());
        assert!(!scheduler.is_scheduled(&Key::from("a")));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let mut scheduler = EvictionScheduler::new(runtime.handle().clone());

        let generation = scheduler.schedule(Key::from("a"), Duration::from_secs(60), |_, _| {});
        assert!(!scheduler.finish(&Key::from("a"), generation + 1));
        assert!(scheduler.is_scheduled(&Key::from("a")));
    }
}
