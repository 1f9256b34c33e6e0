//! Per-item delivery pipeline.
//!
//! A worker takes one due item through claim, compose, send, and the
//! terminal status write. Nothing in here aborts a sweep: every failure
//! is absorbed into the item's own outcome.

use std::sync::Arc;

use postdate_core::{Clock, DeliveryItem};
use tracing::{debug, error, warn};

use crate::{
    message,
    notifier::{Notifier, NotifyError},
    store::ItemStore,
    sweep::SweepConfig,
};

/// How a single item's delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The notifier accepted the message and the item is sent.
    Delivered {
        /// Receipt identifier from the notifier, if any.
        email_id: Option<String>,
    },
    /// The delivery attempt failed and the item is marked failed.
    Rejected {
        /// Recorded failure reason.
        reason: String,
    },
    /// Another sweep claimed the item first; nothing was done.
    ClaimLost,
    /// The claim could not be attempted; the item stays pending.
    Skipped,
}

/// Executes the delivery pipeline for individual items.
pub struct DeliveryWorker {
    store: Arc<dyn ItemStore>,
    notifier: Arc<dyn Notifier>,
    config: SweepConfig,
    clock: Arc<dyn Clock>,
}

impl DeliveryWorker {
    /// Creates a worker over shared store and notifier handles.
    pub fn new(
        store: Arc<dyn ItemStore>,
        notifier: Arc<dyn Notifier>,
        config: SweepConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, notifier, config, clock }
    }

    /// Ceiling on items one sweep pass may attempt.
    pub fn max_items(&self) -> usize {
        self.config.max_items_per_sweep
    }

    /// Attempts delivery of one due item.
    ///
    /// Claims first; a lost claim means another sweep owns the item, or an
    /// owner edit pushed it out of due-ness, and the attempt ends
    /// immediately. Delivery composes from the row the claim returned, not
    /// from the caller's snapshot, so edits that landed between listing and
    /// claiming are honored. After a successful claim the item always
    /// reaches a terminal status, sent or failed.
    pub async fn deliver(&self, item: &DeliveryItem) -> DeliveryOutcome {
        let item = match self.store.try_claim(item.id, self.clock.now_utc()).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                debug!(item_id = %item.id, "item claimed elsewhere or no longer due");
                return DeliveryOutcome::ClaimLost;
            },
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "claim attempt failed, leaving item pending");
                return DeliveryOutcome::Skipped;
            },
        };

        if let Err(reason) = validate_recipient(&item.recipient) {
            return self.record_failure(&item, reason).await;
        }

        let email = message::compose(&item, &self.config.public_base_url);
        let send = self.notifier.send(&email);
        match tokio::time::timeout(self.config.notify_timeout, send).await {
            Ok(Ok(delivery)) => {
                self.record_sent(&item, delivery.email_id.clone()).await;
                debug!(item_id = %item.id, recipient = %item.recipient, "item delivered");
                DeliveryOutcome::Delivered { email_id: delivery.email_id }
            },
            Ok(Err(NotifyError::Rejected(reason))) => {
                self.record_failure(&item, format!("rejected: {reason}")).await
            },
            Ok(Err(NotifyError::Transport(reason))) => {
                self.record_failure(&item, format!("transport: {reason}")).await
            },
            Err(_) => {
                let secs = self.config.notify_timeout.as_secs();
                self.record_failure(&item, format!("delivery timed out after {secs}s")).await
            },
        }
    }

    /// Records the sent status, retrying the write once.
    ///
    /// The message is already out; a claimed item whose terminal write is
    /// lost would be stranded in processing forever, so a failure here is
    /// worth one immediate retry and a loud log line after that.
    async fn record_sent(&self, item: &DeliveryItem, email_id: Option<String>) {
        let sent_at = self.clock.now_utc();
        if let Err(e) = self.store.mark_sent(item.id, sent_at, email_id.clone()).await {
            warn!(item_id = %item.id, error = %e, "failed to record sent status, retrying");
            if let Err(e) = self.store.mark_sent(item.id, sent_at, email_id).await {
                error!(
                    item_id = %item.id,
                    error = %e,
                    "item stranded in processing: sent status could not be recorded"
                );
            }
        }
    }

    async fn record_failure(&self, item: &DeliveryItem, reason: String) -> DeliveryOutcome {
        warn!(item_id = %item.id, reason = %reason, "delivery failed");
        let now = self.clock.now_utc();
        if let Err(e) = self.store.mark_failed(item.id, &reason, now).await {
            warn!(item_id = %item.id, error = %e, "failed to record failure status, retrying");
            if let Err(e) = self.store.mark_failed(item.id, &reason, now).await {
                error!(
                    item_id = %item.id,
                    error = %e,
                    "item stranded in processing: failed status could not be recorded"
                );
            }
        }
        DeliveryOutcome::Rejected { reason }
    }
}

fn validate_recipient(recipient: &str) -> Result<(), String> {
    let trimmed = recipient.trim();
    if trimmed.is_empty() {
        return Err("recipient address is empty".to_string());
    }
    if !trimmed.contains('@') {
        return Err(format!("recipient address is not deliverable: {trimmed}"));
    }
    Ok(())
}
