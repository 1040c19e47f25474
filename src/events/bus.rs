//! # Event bus for broadcasting supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The session loop,
//! the attempt runner, the resource controller and the subscriber workers all
//! publish into it without blocking.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Listener (one):
//!   Session    ──┐
//!   Runner     ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Controller ──┤  (broadcast chan)     (in Supervisor)
//!   Allocator  ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One ring buffer is shared by all receivers; a receiver that falls more than
//!   `capacity` events behind gets `RecvError::Lagged(n)` and skips ahead.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every live receiver (fire-and-forget).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
