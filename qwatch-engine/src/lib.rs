//! qwatch Engine
//!
//! Background synchronization engine that keeps the serverless→runtime job
//! hierarchy current while a slow, rate-limited remote source is polled.
//!
//! Architecture:
//! - Cache: parent→children index plus per-runtime-job status records
//! - Discovery: FIFO queue of parents awaiting runtime job discovery
//! - Lifecycle: per-parent polling regime (active / frozen / one-shot)
//! - Worker: one background task draining discovery batches and refreshing
//!   statuses on independent timers
//!
//! All shared state lives behind a single mutex owned by [`WatchState`];
//! remote calls are never made while it is held. Renderers read consistent
//! point-in-time snapshots via [`WatchState::attach_runtime_rows`].

mod cache;
mod discovery;
mod lifecycle;
mod state;
mod worker;

pub use cache::RuntimeRecord;
pub use state::WatchState;
