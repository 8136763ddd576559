//! Greenscan Queue - Durable outbound work and its drain machinery
//!
//! Three pieces cooperate here:
//!
//! - [`DurableRequestQueue`]: append-only persisted work list; survives
//!   process restart via complete-snapshot writes.
//! - [`QueueProcessor`]: drains the queue through the retry executor once
//!   connectivity returns, applying side effects to the record store and
//!   usage counter. A latch guarantees at most one drain in flight.
//! - [`ConnectivityMonitor`]: turns platform reachability events into
//!   debounced drain triggers.

pub mod monitor;
pub mod processor;
pub mod queue;

pub use monitor::ConnectivityMonitor;
pub use processor::{DrainOutcome, DrainSummary, DrainTarget, QueueProcessor};
pub use queue::DurableRequestQueue;
