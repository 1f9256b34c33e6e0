//! Sweep result events and observer plumbing.
//!
//! Every external trigger funnels into the same sweep entry point; observers
//! that want to react to completed sweeps (UI feedback, realtime pushes)
//! subscribe here instead of re-implementing delivery logic. Each subscriber
//! gets its own connection-scoped receiver from the broadcast hub, so there
//! is no process-wide mutable channel to share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Aggregate outcome of one sweep invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Items claimed and driven to a terminal status.
    pub processed: u64,

    /// Items the notifier accepted.
    pub succeeded: u64,

    /// Items marked failed (notifier rejection, timeout or validation).
    pub failed: u64,
}

impl SweepReport {
    /// True when the sweep found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.processed == 0
    }

    /// Folds a follow-up pass into this report.
    pub fn merge(&mut self, other: SweepReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Events published by the sweep scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SweepEvent {
    /// A sweep finished after processing at least one item.
    Completed {
        /// Aggregate counts for the sweep.
        report: SweepReport,
        /// When the sweep finished.
        at: DateTime<Utc>,
    },
}

/// Sink for sweep events.
///
/// Publishing must never block or fail the sweep; implementations drop
/// events when nobody is listening.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Publishes an event to whatever observers exist.
    fn publish(&self, event: SweepEvent);
}

/// Sink that discards all events. Used when observers are disabled.
#[derive(Debug, Default)]
pub struct NoOpSink;

impl NoOpSink {
    /// Creates a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for NoOpSink {
    fn publish(&self, _event: SweepEvent) {}
}

/// Broadcast hub handing each subscriber its own receiver.
///
/// Backed by a `tokio::sync::broadcast` channel. A receiver is scoped to the
/// subscribing connection; dropping it unsubscribes. Slow subscribers lag
/// and lose old events rather than blocking the sweep.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<SweepEvent>,
}

impl BroadcastHub {
    /// Creates a hub buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a fresh receiver for one subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: SweepEvent) {
        // Send only fails when there are no receivers, which is fine.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_merge_accumulates() {
        let mut report = SweepReport { processed: 2, succeeded: 1, failed: 1 };
        report.merge(SweepReport { processed: 3, succeeded: 3, failed: 0 });
        assert_eq!(report, SweepReport { processed: 5, succeeded: 4, failed: 1 });
    }

    #[tokio::test]
    async fn hub_delivers_to_each_subscriber() {
        let hub = BroadcastHub::new(4);
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(SweepEvent::Completed {
            report: SweepReport { processed: 1, succeeded: 1, failed: 0 },
            at: Utc::now(),
        });

        let SweepEvent::Completed { report, .. } = rx1.recv().await.unwrap();
        assert_eq!(report.succeeded, 1);
        let SweepEvent::Completed { report, .. } = rx2.recv().await.unwrap();
        assert_eq!(report.processed, 1);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = BroadcastHub::new(4);
        hub.publish(SweepEvent::Completed { report: SweepReport::default(), at: Utc::now() });
    }
}
