//! Reactive online/offline signal.
//!
//! The host feeds reachability events in (`went_online`, `went_offline`);
//! consumers hold a `watch::Receiver<bool>` and react on `changed()`.
//! Nothing here polls.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    /// Start from the reachability observed at mount.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn went_online(&self) {
        self.apply(ConnectivityEvent::Online);
    }

    pub fn went_offline(&self) {
        self.apply(ConnectivityEvent::Offline);
    }

    /// Subscribers are only notified on an actual change.
    pub fn apply(&self, event: ConnectivityEvent) {
        let online = event == ConnectivityEvent::Online;
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();
        assert!(!*rx.borrow_and_update());

        signal.went_online();
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_repeated_event_does_not_notify() {
        let signal = ConnectivitySignal::new(true);
        let mut rx = signal.subscribe();
        rx.borrow_and_update();

        signal.went_online();
        assert!(!rx.has_changed().unwrap());

        signal.went_offline();
        assert!(rx.has_changed().unwrap());
    }
}
