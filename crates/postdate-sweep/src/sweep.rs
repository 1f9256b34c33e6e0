//! The delivery sweep.
//!
//! A sweep is one stateless pass over the store: list everything due, push
//! each item through the worker concurrently, and aggregate the outcomes.
//! Any number of triggers may fire sweeps at any cadence; the claim CAS in
//! the store keeps overlapping sweeps from double-sending.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use postdate_core::{Clock, EventSink, SweepEvent, SweepReport};
use tracing::{debug, info};

use crate::{
    error::Result,
    notifier::Notifier,
    store::ItemStore,
    worker::{DeliveryOutcome, DeliveryWorker},
    DEFAULT_MAX_ITEMS_PER_SWEEP, DEFAULT_NOTIFY_TIMEOUT_SECS,
};

/// Tunables for sweep passes.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Base URL used to build access links in outbound mail.
    pub public_base_url: String,
    /// Ceiling on items attempted in one pass. Overflow stays pending for
    /// the next pass or the next sweep.
    pub max_items_per_sweep: usize,
    /// How long one notifier send may take before it is failed.
    pub notify_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            max_items_per_sweep: DEFAULT_MAX_ITEMS_PER_SWEEP,
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }
}

/// Runs delivery sweeps over a store and notifier.
pub struct SweepScheduler {
    store: Arc<dyn ItemStore>,
    worker: DeliveryWorker,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl SweepScheduler {
    /// Wires a scheduler over shared handles.
    pub fn new(
        store: Arc<dyn ItemStore>,
        notifier: Arc<dyn Notifier>,
        config: SweepConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let worker = DeliveryWorker::new(store.clone(), notifier, config, clock.clone());
        Self { store, worker, events, clock }
    }

    /// Runs one sweep and returns the aggregate report.
    ///
    /// Items that became due while the first pass ran are picked up by a
    /// single follow-up pass; the follow-up never spawns a third. When any
    /// item was processed, a completion event is published.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = self.run_pass().await?;
        if !report.is_empty() {
            report.merge(self.run_pass().await?);
        }
        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "sweep completed"
            );
            self.events.publish(SweepEvent::Completed { report, at: self.clock.now_utc() });
        }
        Ok(report)
    }

    /// One pass: list due items, deliver them concurrently, aggregate.
    ///
    /// Only the listing itself can fail a pass. Per-item trouble is absorbed
    /// into the report; claims that were lost or never attempted do not
    /// count as processed.
    async fn run_pass(&self) -> Result<SweepReport> {
        let mut due = self.store.list_due(self.clock.now_utc()).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }
        if due.len() > self.worker.max_items() {
            debug!(
                due = due.len(),
                ceiling = self.worker.max_items(),
                "truncating sweep pass to ceiling"
            );
            due.truncate(self.worker.max_items());
        }

        let outcomes = join_all(due.iter().map(|item| self.worker.deliver(item))).await;

        let mut report = SweepReport::default();
        for outcome in outcomes {
            match outcome {
                DeliveryOutcome::Delivered { .. } => {
                    report.processed += 1;
                    report.succeeded += 1;
                },
                DeliveryOutcome::Rejected { .. } => {
                    report.processed += 1;
                    report.failed += 1;
                },
                DeliveryOutcome::ClaimLost | DeliveryOutcome::Skipped => {},
            }
        }
        Ok(report)
    }
}
