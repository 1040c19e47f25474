//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to multiple subscribers
//! **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and reported as `SubscriberPanicked`.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (the event is dropped for that
//!   subscriber and `SubscriberOverflow` is published).
//!
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::jobs::panic_message;
use crate::subscribers::Subscribe;

struct Channel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    channels: Vec<Channel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Queue capacity comes from [`Subscribe::queue_capacity`] (at least 1).
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let bus = bus.clone();

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = AssertUnwindSafe(sub.on_event(ev.as_ref()));
                    if let Err(payload) = fut.catch_unwind().await {
                        bus.publish(Event::subscriber_panicked(name, panic_message(payload)));
                    }
                }
            }));
            channels.push(Channel { name, sender: tx });
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Queues `event` for every subscriber without waiting.
    ///
    /// Overflow events are never re-published when they overflow themselves.
    pub fn emit(&self, event: &Event) {
        if self.channels.is_empty() {
            return;
        }
        let is_overflow = matches!(event.kind, EventKind::SubscriberOverflow);
        let event = Arc::new(event.clone());

        for ch in &self.channels {
            let reason = match ch.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus.publish(Event::subscriber_overflow(ch.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for w in self.workers {
            let _ = w.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Exploding;

    #[async_trait]
    impl Subscribe for Exploding {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    struct Stalled;

    #[async_trait]
    impl Subscribe for Stalled {
        async fn on_event(&self, _ev: &Event) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order_to_every_subscriber() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![a.clone() as Arc<dyn Subscribe>, b.clone()], Bus::new(16));
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::AttemptStarting));
        set.emit(&Event::new(EventKind::PreemptionDetected));
        set.emit(&Event::new(EventKind::ExecutionKilled));
        set.shutdown().await;

        let expected = vec![
            EventKind::AttemptStarting,
            EventKind::PreemptionDetected,
            EventKind::ExecutionKilled,
        ];
        assert_eq!(*a.seen.lock().unwrap(), expected);
        assert_eq!(*b.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_reported_and_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![Arc::new(Exploding) as Arc<dyn Subscribe>, rec.clone()], bus);

        set.emit(&Event::new(EventKind::SessionDone));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.job.as_deref(), Some("exploding"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(*rec.seen.lock().unwrap(), vec![EventKind::SessionDone]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_and_reports_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stalled) as Arc<dyn Subscribe>], bus);

        // First event is taken by the worker, second fills the queue.
        set.emit(&Event::new(EventKind::AttemptStarting));
        tokio::task::yield_now().await;
        set.emit(&Event::new(EventKind::AttemptStarting));
        set.emit(&Event::new(EventKind::AttemptStarting));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.job.as_deref(), Some("stalled"));
    }

    #[tokio::test]
    async fn test_empty_set_is_a_noop() {
        let set = SubscriberSet::new(Vec::new(), Bus::new(4));
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::SessionDone));
        set.shutdown().await;
    }
}
