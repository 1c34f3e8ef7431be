use dashmap::DashMap;
use runbench_model::{RunEvent, RunId};
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-run broadcast buffer. A subscriber that falls further behind
/// than this loses chunks rather than stalling the publisher.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory publish/subscribe hub keyed by run id.
///
/// Publishing is fire-and-forget: a slow or departed subscriber never blocks
/// the worker loop. Every subscriber attached to an in-progress run sees an
/// identical, ordered copy of the event sequence.
#[derive(Debug)]
pub struct EventBroadcaster {
    channels: DashMap<RunId, broadcast::Sender<RunEvent>>,
    capacity: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Open the channel for a run. Called at admission so that subscribers
    /// can attach while the run is still queued.
    pub fn register(&self, run_id: RunId) {
        self.channels.entry(run_id).or_insert_with(|| {
            let (tx, _rx) = broadcast::channel(self.capacity);
            tx
        });
    }

    /// Attach to a run's live channel. `None` once the channel has been
    /// closed (the run is terminal and its `complete` frame already went out).
    pub fn subscribe(&self, run_id: &RunId) -> Option<broadcast::Receiver<RunEvent>> {
        self.channels.get(run_id).map(|tx| tx.subscribe())
    }

    /// Best-effort delivery to every currently attached subscriber.
    pub fn publish(&self, run_id: &RunId, event: RunEvent) {
        if let Some(tx) = self.channels.get(run_id) {
            // Err here only means nobody is listening right now.
            let delivered = tx.send(event).unwrap_or(0);
            trace!(run = %run_id, delivered, "published run event");
        }
    }

    /// Drop the sender for a run. Subscribers drain whatever is buffered
    /// (including the terminal frame) and then see their stream end.
    pub fn close(&self, run_id: &RunId) {
        self.channels.remove(run_id);
    }

    /// Number of runs with an open live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self, run_id: &RunId) -> usize {
        self.channels
            .get(run_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbench_model::{Run, RunRequest, Variant};
    use tokio::sync::broadcast::error::RecvError;

    fn stdout(text: &str) -> RunEvent {
        RunEvent::Stdout {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn fans_out_identical_ordered_copies() {
        let bus = EventBroadcaster::default();
        let id = RunId::new();
        bus.register(id);

        let mut first = bus.subscribe(&id).unwrap();
        let mut second = bus.subscribe(&id).unwrap();

        bus.publish(&id, stdout("a"));
        bus.publish(&id, stdout("b"));

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), stdout("a"));
            assert_eq!(rx.recv().await.unwrap(), stdout("b"));
        }
    }

    #[tokio::test]
    async fn close_ends_streams_after_buffered_events() {
        let bus = EventBroadcaster::default();
        let id = RunId::new();
        bus.register(id);

        let mut rx = bus.subscribe(&id).unwrap();
        let run = Run::admitted(RunRequest::new("fib", Variant::Baseline));
        bus.publish(
            &id,
            RunEvent::Complete {
                run: Box::new(run),
            },
        );
        bus.close(&id);

        assert!(matches!(
            rx.recv().await.unwrap(),
            RunEvent::Complete { .. }
        ));
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn subscribe_after_close_returns_none() {
        let bus = EventBroadcaster::default();
        let id = RunId::new();
        bus.register(id);
        bus.close(&id);
        assert!(bus.subscribe(&id).is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block() {
        let bus = EventBroadcaster::new(2);
        let id = RunId::new();
        bus.register(id);
        for i in 0..100 {
            bus.publish(&id, stdout(&i.to_string()));
        }
        assert_eq!(bus.subscriber_count(&id), 0);
    }
}
