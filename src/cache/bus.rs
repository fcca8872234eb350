//! Change Bus Module
//!
//! Store-wide "something changed" signal. No payload, no replay.

use tokio::sync::broadcast;

// == Change Bus ==
#[derive(Debug)]
pub struct ChangeBus {
    tx: Option<broadcast::Sender<()>>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx: Some(tx) }
    }

    /// Posts a signal. Having no subscribers is not an error.
    pub fn post(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(());
        }
    }

    /// Subscribes to future signals, None once the bus is closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        self.tx.as_ref().map(broadcast::Sender::subscribe)
    }

    /// Closes the bus for good. Subscribers drain buffered signals and end.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast::error::TryRecvError;

    #[test]
    fn test_post_without_subscribers() {
        let bus = ChangeBus::new(4);
        bus.post();
        assert!(!bus.is_closed());
    }

    #[test]
    fn test_no_replay_for_new_subscribers() {
        let bus = ChangeBus::new(4);
        bus.post();

        let mut rx = bus.subscribe().unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        bus.post();
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[test]
    fn test_close_is_permanent() {
        let mut bus = ChangeBus::new(4);
        let mut rx = bus.subscribe().unwrap();
        bus.post();
        bus.close();

        assert!(bus.subscribe().is_none());
        assert_eq!(rx.try_recv(), Ok(()));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));

        // Posting after close is silently dropped.
        bus.post();
    }
}
