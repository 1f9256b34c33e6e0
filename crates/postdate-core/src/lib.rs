//! Core domain types for the postdate scheduled-delivery service.
//!
//! Provides the `DeliveryItem` model with its status state machine, typed
//! identifiers, access token generation, the error taxonomy shared by the
//! other crates, clock abstractions for deterministic tests, and the sweep
//! event types used to notify observers of completed sweeps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{BroadcastHub, EventSink, NoOpSink, SweepEvent, SweepReport};
pub use models::{AccessToken, DeliveryItem, DeliveryStatus, ItemId, ItemPatch, OwnerId};
pub use time::{Clock, RealClock, TestClock};
