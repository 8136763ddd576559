//! Usage counter domain entity
//!
//! Tracks consumption of the rate-limited monthly analysis quota. The
//! counter is split into two fields as reconciliation demands:
//!
//! - `confirmed`: the last value the remote service acknowledged
//! - `pending_delta`: optimistic local increments not yet confirmed
//!
//! `used = confirmed + pending_delta`, so adopting an authoritative remote
//! value is an assignment to `confirmed` and reconciliation is addition,
//! never replacement. `used ≤ limit` holds except for transient offline
//! overshoot while increments await confirmation.
//!
//! ## Per-owner state machine
//!
//! ```text
//!   NoData ──first load──► Loaded ──now > period_end──► Stale
//!                            ▲                            │
//!                            └────────rollover────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::OwnerId;

/// Freshness/lifecycle state of an owner's counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    /// No counter has ever been loaded or stored for this owner
    NoData,
    /// A counter exists and its period covers the current instant
    Loaded,
    /// The stored period has ended; a rollover is due
    Stale,
}

/// One closed accounting period kept for bounded history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPeriod {
    /// Start of the closed period
    pub period_start: DateTime<Utc>,
    /// End of the closed period
    pub period_end: DateTime<Utc>,
    /// Total usage recorded when the period closed
    pub used: u32,
}

/// One offline usage event awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUsage {
    /// When the usage happened locally
    pub recorded_at: DateTime<Utc>,
}

impl PendingUsage {
    /// Creates an event stamped now
    pub fn now() -> Self {
        Self {
            recorded_at: Utc::now(),
        }
    }
}

/// Per-period usage of the rate-limited analysis quota for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// The owner this counter belongs to
    owner_id: OwnerId,
    /// Start of the current accounting period
    period_start: DateTime<Utc>,
    /// End of the current accounting period
    period_end: DateTime<Utc>,
    /// Last remotely acknowledged usage
    confirmed: u32,
    /// Optimistic local increments not yet confirmed
    pending_delta: u32,
    /// Maximum allowed usage for the period
    limit: u32,
    /// Whether the owner is on a paid plan (reported by the backend)
    is_premium: bool,
}

impl UsageCounter {
    /// Opens a fresh counter for a period starting now
    pub fn open(owner_id: OwnerId, limit: u32, period_length: Duration) -> Self {
        let now = Utc::now();
        Self {
            owner_id,
            period_start: now,
            period_end: now + period_length,
            confirmed: 0,
            pending_delta: 0,
            limit,
            is_premium: false,
        }
    }

    /// Reconstructs a counter from fully specified parts
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        owner_id: OwnerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        confirmed: u32,
        pending_delta: u32,
        limit: u32,
        is_premium: bool,
    ) -> Self {
        Self {
            owner_id,
            period_start,
            period_end,
            confirmed,
            pending_delta,
            limit,
            is_premium,
        }
    }

    // --- Getters ---

    /// Returns the owner
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Returns the period start
    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    /// Returns the period end
    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_end
    }

    /// Returns the remotely confirmed usage
    pub fn confirmed(&self) -> u32 {
        self.confirmed
    }

    /// Returns the unconfirmed optimistic increments
    pub fn pending_delta(&self) -> u32 {
        self.pending_delta
    }

    /// Returns the period limit
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns whether the owner is on a paid plan
    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    /// Total local estimate: confirmed plus pending
    pub fn used(&self) -> u32 {
        self.confirmed.saturating_add(self.pending_delta)
    }

    /// Uses remaining before the limit, saturating at zero
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used())
    }

    /// True when the local estimate has reached the limit
    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.limit
    }

    /// True when the current instant is past the period end
    pub fn needs_rollover(&self, now: DateTime<Utc>) -> bool {
        now > self.period_end
    }

    // --- Mutators ---

    /// Records one optimistic offline use
    pub fn note_offline_use(&mut self) {
        self.pending_delta = self.pending_delta.saturating_add(1);
    }

    /// Adopts an authoritative remote value for the confirmed count
    ///
    /// Pending increments are left alone; they are confirmed separately as
    /// the pending-sync list drains.
    pub fn adopt_confirmed(&mut self, used: u32, limit: u32, is_premium: bool) {
        self.confirmed = used;
        self.limit = limit;
        self.is_premium = is_premium;
    }

    /// Adopts remote period bounds when the backend reports them
    pub fn adopt_period(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.period_start = start;
        self.period_end = end;
    }

    /// Marks `n` pending increments as remotely confirmed
    pub fn confirm_pending(&mut self, n: u32) {
        self.pending_delta = self.pending_delta.saturating_sub(n);
    }

    /// Closes the current period and opens the next one
    ///
    /// The new period has the same duration as the closed one and carries
    /// forward only `limit` (and the plan flag); `confirmed` resets to zero.
    /// `pending_delta` is deliberately preserved; those events will still
    /// increment the remote counter when they sync, in whatever period is
    /// then current. Returns the archived summary of the closed period.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> ArchivedPeriod {
        let archived = ArchivedPeriod {
            period_start: self.period_start,
            period_end: self.period_end,
            used: self.used(),
        };

        let mut length = self.period_end - self.period_start;
        if length <= Duration::zero() {
            // A malformed stored period must not stall the rollover loop.
            length = Duration::days(30);
        }
        // Advance whole periods until the window covers `now`, so a counter
        // untouched for several months does not need repeated rollovers.
        let mut start = self.period_end;
        while start + length < now {
            start = start + length;
        }
        self.period_start = start;
        self.period_end = start + length;
        self.confirmed = 0;

        archived
    }
}
