//! Postdate HTTP API.
//!
//! Exposes the trigger and management surface over the sweep engine: manual
//! sweep triggering, item CRUD for owners, a realtime event stream, and
//! health probes. Every trigger path funnels into the shared scheduler, so
//! the API never implements delivery logic of its own.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server, AppState};
