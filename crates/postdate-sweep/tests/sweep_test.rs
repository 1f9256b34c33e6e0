//! End-to-end sweep scenarios.
//!
//! Drives full sweeps over the in-memory store and mock notifier, covering
//! the report semantics, idempotent re-triggering, concurrent sweeps, the
//! per-pass ceiling, and event publication.

use std::{sync::Arc, time::Duration};

use postdate_core::{
    BroadcastHub, Clock, DeliveryItem, DeliveryStatus, NoOpSink, OwnerId, SweepEvent, SweepReport,
    TestClock,
};
use postdate_sweep::{
    notifier::mock::{Behavior, MockNotifier},
    store::{memory::MemoryItemStore, ItemStore},
    SweepConfig, SweepScheduler,
};

struct Harness {
    store: Arc<MemoryItemStore>,
    notifier: Arc<MockNotifier>,
    clock: Arc<TestClock>,
    hub: BroadcastHub,
    scheduler: SweepScheduler,
}

fn harness() -> Harness {
    harness_with_config(SweepConfig::default())
}

fn harness_with_config(config: SweepConfig) -> Harness {
    let store = Arc::new(MemoryItemStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let clock = Arc::new(TestClock::new());
    let hub = BroadcastHub::new(8);
    let scheduler = SweepScheduler::new(
        store.clone(),
        notifier.clone(),
        config,
        clock.clone(),
        Arc::new(hub.clone()),
    );
    Harness { store, notifier, clock, hub, scheduler }
}

fn item_offset(clock: &TestClock, offset: chrono::Duration) -> DeliveryItem {
    let now = clock.now_utc();
    DeliveryItem::new(
        OwnerId::new(),
        "archive.zip".to_string(),
        "files/archive.zip".to_string(),
        "dest@example.com".to_string(),
        now + offset,
        now,
    )
}

#[tokio::test]
async fn sweep_delivers_due_and_skips_future() {
    let h = harness();
    let due = item_offset(&h.clock, chrono::Duration::minutes(-5));
    let future = item_offset(&h.clock, chrono::Duration::minutes(5));
    h.store.insert(&due).await.unwrap();
    h.store.insert(&future).await.unwrap();

    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 1, failed: 0 });
    assert_eq!(h.store.status_of(due.id).await, Some(DeliveryStatus::Sent));
    assert_eq!(h.store.status_of(future.id).await, Some(DeliveryStatus::Pending));
}

#[tokio::test]
async fn one_rejection_does_not_abort_the_sweep() {
    let h = harness();
    // First message rejected, but acceptance resumes for the rest.
    h.notifier.set_behavior(Behavior::Reject { reason: "spam verdict".to_string() }).await;
    let failing = item_offset(&h.clock, chrono::Duration::minutes(-10));
    h.store.insert(&failing).await.unwrap();

    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 0, failed: 1 });
    assert_eq!(h.store.status_of(failing.id).await, Some(DeliveryStatus::Failed));

    h.notifier.set_behavior(Behavior::Accept { email_id: None }).await;
    let healthy = item_offset(&h.clock, chrono::Duration::minutes(-1));
    h.store.insert(&healthy).await.unwrap();

    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 1, failed: 0 });
    // Failed is terminal; the earlier item is not retried.
    assert_eq!(h.store.status_of(failing.id).await, Some(DeliveryStatus::Failed));
}

#[tokio::test]
async fn item_becomes_due_when_the_clock_reaches_its_schedule() {
    let h = harness();
    let item = item_offset(&h.clock, chrono::Duration::hours(2));
    h.store.insert(&item).await.unwrap();

    assert!(h.scheduler.sweep().await.unwrap().is_empty());

    // Jump straight to the scheduled instant; the boundary is inclusive.
    h.clock.jump_to(std::time::SystemTime::from(item.scheduled_at));
    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 1, failed: 0 });
    assert_eq!(h.store.status_of(item.id).await, Some(DeliveryStatus::Sent));
}

#[tokio::test]
async fn second_sweep_finds_nothing() {
    let h = harness();
    let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
    h.store.insert(&item).await.unwrap();

    let first = h.scheduler.sweep().await.unwrap();
    assert_eq!(first.processed, 1);

    let second = h.scheduler.sweep().await.unwrap();
    assert_eq!(second, SweepReport::default());
    assert_eq!(h.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn concurrent_sweeps_send_each_item_once() {
    let h = harness();
    for _ in 0..5 {
        let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
        h.store.insert(&item).await.unwrap();
    }

    let (a, b) = tokio::join!(h.scheduler.sweep(), h.scheduler.sweep());
    let (a, b) = (a.unwrap(), b.unwrap());

    // Claims decide ownership; between them the sweeps deliver each item
    // exactly once.
    assert_eq!(a.processed + b.processed, 5);
    assert_eq!(a.succeeded + b.succeeded, 5);
    assert_eq!(h.notifier.sent_count().await, 5);
}

#[tokio::test]
async fn list_failure_aborts_the_sweep() {
    let h = harness();
    let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
    h.store.insert(&item).await.unwrap();
    h.store.inject_list_error("connection refused").await;

    assert!(h.scheduler.sweep().await.is_err());
    assert_eq!(h.store.status_of(item.id).await, Some(DeliveryStatus::Pending));
    assert_eq!(h.notifier.sent_count().await, 0);
}

#[tokio::test]
async fn ceiling_bounds_each_pass_but_not_the_backlog() {
    let h = harness_with_config(SweepConfig {
        max_items_per_sweep: 3,
        ..SweepConfig::default()
    });
    for _ in 0..7 {
        let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
        h.store.insert(&item).await.unwrap();
    }

    // First pass takes 3, the single follow-up pass takes 3 more; the
    // seventh item waits for the next trigger.
    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 6, succeeded: 6, failed: 0 });

    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 1, failed: 0 });
}

#[tokio::test]
async fn claim_error_item_stays_for_the_next_sweep() {
    let h = harness();
    let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
    h.store.insert(&item).await.unwrap();
    h.store.inject_claim_error("deadlock detected").await;

    // The claim failure is absorbed; the sweep itself succeeds. The item is
    // seen again by the follow-up pass in the same sweep and delivered.
    let report = h.scheduler.sweep().await.unwrap();
    assert!(report.processed <= 1);

    let total_after_retry = if report.is_empty() {
        h.scheduler.sweep().await.unwrap().processed
    } else {
        report.processed
    };
    assert_eq!(total_after_retry, 1);
    assert_eq!(h.store.status_of(item.id).await, Some(DeliveryStatus::Sent));
}

#[tokio::test]
async fn completed_sweep_publishes_an_event() {
    let h = harness();
    let mut events = h.hub.subscribe();
    let item = item_offset(&h.clock, chrono::Duration::minutes(-1));
    h.store.insert(&item).await.unwrap();

    h.scheduler.sweep().await.unwrap();

    let SweepEvent::Completed { report, at } = events.recv().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 1, failed: 0 });
    assert_eq!(at, h.clock.now_utc());
}

#[tokio::test]
async fn empty_sweep_publishes_nothing() {
    let h = harness();
    let mut events = h.hub.subscribe();

    let report = h.scheduler.sweep().await.unwrap();
    assert!(report.is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_failed_in_the_report() {
    let store = Arc::new(MemoryItemStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let clock = Arc::new(TestClock::new());
    let scheduler = SweepScheduler::new(
        store.clone(),
        notifier.clone(),
        SweepConfig { notify_timeout: Duration::from_secs(1), ..SweepConfig::default() },
        clock.clone(),
        Arc::new(NoOpSink::new()),
    );
    notifier.set_behavior(Behavior::Delay { latency: Duration::from_secs(30) }).await;
    let item = item_offset(&clock, chrono::Duration::minutes(-1));
    store.insert(&item).await.unwrap();

    let report = scheduler.sweep().await.unwrap();
    assert_eq!(report, SweepReport { processed: 1, succeeded: 0, failed: 1 });
    assert_eq!(store.status_of(item.id).await, Some(DeliveryStatus::Failed));
}
