//! Connectivity port
//!
//! The platform layer owns the actual reachability subscription (one-time at
//! startup) and feeds [`ConnectivityEvent`]s into the engine through an mpsc
//! channel. This module defines the event type, decoupled from any platform
//! API, plus the [`ConnectivityState`] handle the rest of the engine reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A reachability or lifecycle transition reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The network became reachable
    Online,
    /// The network became unreachable
    Offline,
    /// The app returned to the foreground (treated as a drain trigger)
    Foreground,
}

/// Shared, cheaply cloneable view of the current connectivity
///
/// The monitor task writes it; the processor, synchronizer and usage
/// reconciler read it. An atomic is enough; consumers only need a
/// best-effort answer, and every remote call still handles failure.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    online: Arc<AtomicBool>,
}

impl ConnectivityState {
    /// Creates a state handle with the given initial assumption
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(initially_online)),
        }
    }

    /// Returns the last observed connectivity
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Records a connectivity transition
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        // Assume online until the platform says otherwise; the first failed
        // call will queue work anyway.
        Self::new(true)
    }
}
