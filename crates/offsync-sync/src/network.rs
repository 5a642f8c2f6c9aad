//! Connectivity state and transition events
//!
//! ```text
//! platform glue / HttpProbe ──→ ConnectivityHandle ──watch──→ NetworkMonitor
//!                                                               │
//!                                                  NetworkEvents (coordinator)
//! ```
//!
//! The monitor only reports. Debouncing and retry policy belong to the
//! coordinator.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// A connectivity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected,
    Disconnected,
}

/// Write side: pushes connectivity observations into the monitor
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityHandle {
    /// Records the current connectivity; repeated values are not transitions
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "Connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Read side: current connectivity and a stream of transitions
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    rx: watch::Receiver<bool>,
}

impl NetworkMonitor {
    /// Creates a monitor starting at `initial` and the handle that drives it
    pub fn new(initial: bool) -> (Self, ConnectivityHandle) {
        let (tx, rx) = watch::channel(initial);
        (
            Self { rx },
            ConnectivityHandle { tx: Arc::new(tx) },
        )
    }

    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Subscribes to transitions from the current state onwards
    pub fn events(&self) -> NetworkEvents {
        let mut rx = self.rx.clone();
        let last = *rx.borrow_and_update();
        NetworkEvents { rx, last }
    }
}

/// Stream of connectivity transitions
#[derive(Debug)]
pub struct NetworkEvents {
    rx: watch::Receiver<bool>,
    last: bool,
}

impl NetworkEvents {
    /// Waits for the next transition; `None` once every handle is gone
    pub async fn next(&mut self) -> Option<NetworkEvent> {
        loop {
            self.rx.changed().await.ok()?;
            let online = *self.rx.borrow_and_update();
            if online != self.last {
                self.last = online;
                return Some(if online {
                    NetworkEvent::Connected
                } else {
                    NetworkEvent::Disconnected
                });
            }
        }
    }

    /// Treats the current state as already observed
    ///
    /// Transitions that happened in the meantime are not reported.
    pub fn mark_seen(&mut self) {
        self.last = *self.rx.borrow_and_update();
    }
}
