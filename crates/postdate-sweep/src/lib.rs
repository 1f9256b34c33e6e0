//! Delivery sweep engine for scheduled file deliveries.
//!
//! Implements the discover-due → claim → deliver → record pipeline. The
//! scheduler is invoked by external triggers (timer tick, HTTP request,
//! observer reaction) rather than running its own loop; each invocation is a
//! short, bounded unit of work with no in-process state carried between
//! invocations. All shared state lives in the item store, whose conditional
//! claim update is the sole synchronization primitive.
//!
//! # Pipeline
//!
//! 1. **List due items** — pending items whose schedule has passed.
//! 2. **Claim** — conditional pending→processing update; losing the race
//!    means another trigger owns the item.
//! 3. **Notify** — email the access link with a bounded timeout.
//! 4. **Record** — terminal sent/failed write before the worker returns.
//!
//! Because every trigger path funnels into [`SweepScheduler::sweep`],
//! redundant and concurrent invocations are safe by construction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use postdate_core::{NoOpSink, RealClock};
//! use postdate_sweep::{
//!     notifier::mock::MockNotifier, store::memory::MemoryItemStore, SweepConfig, SweepScheduler,
//! };
//!
//! # async fn example() -> Result<(), postdate_sweep::SweepError> {
//! let scheduler = SweepScheduler::new(
//!     Arc::new(MemoryItemStore::new()),
//!     Arc::new(MockNotifier::new()),
//!     SweepConfig::default(),
//!     Arc::new(RealClock::new()),
//!     Arc::new(NoOpSink::new()),
//! );
//! let report = scheduler.sweep().await?;
//! println!("processed {}", report.processed);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod message;
pub mod notifier;
pub mod store;
pub mod sweep;
pub mod worker;

pub use error::{Result, SweepError};
pub use notifier::{Notifier, NotifyError};
pub use store::ItemStore;
pub use sweep::{SweepConfig, SweepScheduler};
pub use worker::{DeliveryOutcome, DeliveryWorker};

/// Default soft ceiling on items processed per sweep pass.
pub const DEFAULT_MAX_ITEMS_PER_SWEEP: usize = 100;

/// Default timeout for a single notifier call, in seconds.
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;
