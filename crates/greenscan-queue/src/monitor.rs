//! Connectivity monitor
//!
//! Consumes platform reachability events and turns them into debounced
//! drain triggers. The platform owns the real subscription (registered once
//! at startup) and feeds events into an mpsc channel; this task is the only
//! writer of the shared [`ConnectivityState`].
//!
//! ## Flow
//!
//! ```text
//! platform reachability ──→ mpsc::Receiver ──→ ConnectivityMonitor
//!                                                   │ debounce ~2s
//!                                                   ▼
//!                                        DrainTarget::drain_if_idle()
//! ```
//!
//! Online and Foreground events open a debounce window (~2s) so a flapping
//! connection does not cause wasted attempts; triggers landing inside the
//! window are coalesced into one drain. An Offline event inside the window
//! cancels the pending trigger. The drain itself is re-entrancy-safe (the
//! processor's latch), so at most one drain runs regardless of how triggers
//! interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use greenscan_core::ports::{ConnectivityEvent, ConnectivityState};

use crate::processor::DrainTarget;

/// Debounced bridge from reachability events to drain triggers
pub struct ConnectivityMonitor {
    /// Receiver for platform reachability events
    events: mpsc::Receiver<ConnectivityEvent>,
    /// Shared connectivity view, updated by this task
    state: ConnectivityState,
    /// Where coalesced triggers land
    target: Arc<dyn DrainTarget>,
    /// How long an online signal must hold before a drain fires
    debounce: Duration,
    /// Graceful shutdown signal
    shutdown: CancellationToken,
}

impl ConnectivityMonitor {
    /// Creates a monitor over the given event channel and drain target
    pub fn new(
        events: mpsc::Receiver<ConnectivityEvent>,
        state: ConnectivityState,
        target: Arc<dyn DrainTarget>,
        debounce: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            state,
            target,
            debounce,
            shutdown,
        }
    }

    /// Main event loop
    ///
    /// Terminates when the event channel closes (platform dropped the
    /// sender) or the shutdown token fires.
    pub async fn run(mut self) {
        info!(
            debounce_ms = self.debounce.as_millis() as u64,
            "Connectivity monitor starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Connectivity monitor shutting down");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("Connectivity channel closed, monitor stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&mut self, event: ConnectivityEvent) {
        debug!(?event, "Connectivity event");
        match event {
            ConnectivityEvent::Offline => {
                self.state.set_online(false);
            }
            ConnectivityEvent::Online | ConnectivityEvent::Foreground => {
                if matches!(event, ConnectivityEvent::Online) {
                    self.state.set_online(true);
                }
                if self.settle().await {
                    self.trigger_drain().await;
                }
            }
        }
    }

    /// Waits out the debounce window, coalescing further triggers
    ///
    /// Returns false when the window ends offline (an Offline event arrived,
    /// or the state was never online to begin with) or shutdown fired.
    async fn settle(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + self.debounce;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return self.state.is_online();
                }
                _ = self.shutdown.cancelled() => return false,
                event = self.events.recv() => {
                    match event {
                        Some(ConnectivityEvent::Offline) => {
                            debug!("Went offline inside debounce window, trigger cancelled");
                            self.state.set_online(false);
                            return false;
                        }
                        Some(ConnectivityEvent::Online) => {
                            // Flap back online: keep the original deadline so
                            // a bouncing link cannot postpone the drain forever.
                            self.state.set_online(true);
                        }
                        Some(ConnectivityEvent::Foreground) => {}
                        None => return self.state.is_online(),
                    }
                }
            }
        }
    }

    async fn trigger_drain(&self) {
        match self.target.drain_if_idle().await {
            Ok(summary) => {
                debug!(
                    outcome = ?summary.outcome,
                    processed = summary.processed,
                    "Drain trigger handled"
                );
            }
            Err(err) => {
                warn!(error = %err, "Drain pass failed");
            }
        }
    }
}
