//! Usage counter reconciler
//!
//! ## Reconciliation rules
//!
//! - Online `record_usage` increments remotely and adopts the authoritative
//!   response into `confirmed`; it never guesses a value the network just
//!   confirmed.
//! - Offline `record_usage` bumps `pending_delta` and appends a
//!   [`PendingUsage`] event; both writes are complete-snapshot persists.
//! - `sync_pending` drains the event list one increment at a time, so an
//!   interrupted pass leaves exact partial progress behind. Double-counting
//!   is accepted over under-counting: the counter gates a soft quota.
//! - `can_use` prefers a remote read when the cached counter is older than
//!   the freshness window and the device is online; with no backing data at
//!   all it fails OPEN (allow) rather than blocking the core feature on an
//!   observability gap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use greenscan_core::config::{RetryConfig, UsageConfig};
use greenscan_core::domain::{
    ArchivedPeriod, CounterState, OwnerId, PendingUsage, RemoteError, UsageCounter,
};
use greenscan_core::ports::{ConnectivityState, IKeyValueStore, IRemoteBackend, RemoteCounter};
use greenscan_retry::RetryPolicy;

/// Storage key for an owner's counter blob
fn counter_key(owner_id: &OwnerId) -> String {
    format!("usage/{}", owner_id)
}

/// Storage key for an owner's pending-usage list
fn pending_key(owner_id: &OwnerId) -> String {
    format!("usage/{}/pending", owner_id)
}

/// The persisted per-owner counter document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCounter {
    /// The live counter
    counter: UsageCounter,
    /// When a remote value was last adopted; drives the freshness window
    fetched_at: chrono::DateTime<Utc>,
    /// Closed periods, newest last, bounded by config
    history: Vec<ArchivedPeriod>,
}

/// The persisted per-owner pending-usage document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PendingList {
    events: Vec<PendingUsage>,
}

/// Answer to "may this owner run another analysis right now?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStatus {
    /// Whether another analysis is allowed
    pub allowed: bool,
    /// Uses remaining before the limit (saturating)
    pub remaining: u32,
    /// The period limit
    pub limit: u32,
    /// Whether the owner is on a paid plan
    pub is_premium: bool,
}

/// Reconciles local and remote usage counters for every owner
pub struct UsageReconciler {
    backend: Arc<dyn IRemoteBackend>,
    kv: Arc<dyn IKeyValueStore>,
    connectivity: ConnectivityState,
    policy: RetryPolicy,
    /// How long an adopted remote value stays fresh
    freshness: Duration,
    /// Fallback limit when no counter has ever been seen
    default_limit: u32,
    /// Closed periods kept per owner
    history_len: usize,
    /// Serializes counter mutations per owner
    locks: DashMap<OwnerId, Arc<tokio::sync::Mutex<()>>>,
}

impl UsageReconciler {
    /// Creates a reconciler over the given ports
    pub fn new(
        backend: Arc<dyn IRemoteBackend>,
        kv: Arc<dyn IKeyValueStore>,
        connectivity: ConnectivityState,
        usage: &UsageConfig,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            backend,
            kv,
            connectivity,
            policy: RetryPolicy::from(retry),
            freshness: Duration::from_secs(usage.freshness_secs),
            default_limit: usage.default_limit,
            history_len: usage.history_len,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, owner_id: &OwnerId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(owner_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn load_stored(&self, owner_id: &OwnerId) -> anyhow::Result<Option<StoredCounter>> {
        let Some(raw) = self.kv.get(&counter_key(owner_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(stored) => Ok(Some(stored)),
            Err(err) => {
                warn!(owner_id = %owner_id, error = %err, "Corrupt usage counter blob, discarding");
                Ok(None)
            }
        }
    }

    async fn save_stored(&self, owner_id: &OwnerId, stored: &StoredCounter) -> anyhow::Result<()> {
        let raw = serde_json::to_string(stored)?;
        self.kv.set(&counter_key(owner_id), &raw).await
    }

    async fn load_pending(&self, owner_id: &OwnerId) -> anyhow::Result<Vec<PendingUsage>> {
        let Some(raw) = self.kv.get(&pending_key(owner_id)).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<PendingList>(&raw) {
            Ok(list) => Ok(list.events),
            Err(err) => {
                warn!(owner_id = %owner_id, error = %err, "Corrupt pending-usage blob, discarding");
                Ok(Vec::new())
            }
        }
    }

    async fn save_pending(
        &self,
        owner_id: &OwnerId,
        events: &[PendingUsage],
    ) -> anyhow::Result<()> {
        let list = PendingList {
            events: events.to_vec(),
        };
        let raw = serde_json::to_string(&list)?;
        self.kv.set(&pending_key(owner_id), &raw).await
    }

    // ========================================================================
    // Counter lifecycle
    // ========================================================================

    /// Freshness/lifecycle state of the owner's counter
    pub async fn state(&self, owner_id: &OwnerId) -> anyhow::Result<CounterState> {
        Ok(match self.load_stored(owner_id).await? {
            None => CounterState::NoData,
            Some(stored) if stored.counter.needs_rollover(Utc::now()) => CounterState::Stale,
            Some(_) => CounterState::Loaded,
        })
    }

    /// Rolls the counter forward if its period has ended; archives the
    /// closed period into the bounded history
    fn ensure_current(&self, stored: &mut StoredCounter) -> bool {
        let now = Utc::now();
        if !stored.counter.needs_rollover(now) {
            return false;
        }
        let archived = stored.counter.roll_over(now);
        info!(
            owner_id = %stored.counter.owner_id(),
            closed_used = archived.used,
            "Usage period rolled over"
        );
        stored.history.push(archived);
        let overflow = stored.history.len().saturating_sub(self.history_len);
        if overflow > 0 {
            stored.history.drain(..overflow);
        }
        true
    }

    /// Adopts an authoritative remote counter into the stored document
    fn adopt_remote(
        &self,
        owner_id: &OwnerId,
        remote: RemoteCounter,
        stored: Option<StoredCounter>,
    ) -> StoredCounter {
        let mut stored = stored.unwrap_or_else(|| StoredCounter {
            counter: UsageCounter::open(
                owner_id.clone(),
                remote.limit,
                chrono::Duration::days(30),
            ),
            fetched_at: Utc::now(),
            history: Vec::new(),
        });

        stored.counter.adopt_confirmed(
            remote.used,
            remote.limit,
            remote.is_premium.unwrap_or(false),
        );
        if let (Some(start), Some(end)) = (remote.period_start, remote.period_end) {
            stored.counter.adopt_period(start, end);
        }
        stored.fetched_at = Utc::now();
        stored
    }

    fn is_fresh(&self, stored: &StoredCounter) -> bool {
        let age = Utc::now().signed_duration_since(stored.fetched_at);
        match chrono::Duration::from_std(self.freshness) {
            Ok(window) => age <= window,
            Err(_) => false,
        }
    }

    // ========================================================================
    // record_usage
    // ========================================================================

    /// Records one analysis against the owner's quota
    ///
    /// Online: increments remotely and adopts the response. Offline, or when
    /// the retry budget is exhausted on a transient failure: increments the
    /// local optimistic counter and appends a pending-sync event. Terminal
    /// remote errors (quota exceeded, validation) propagate unchanged.
    pub async fn record_usage(&self, owner_id: &OwnerId) -> anyhow::Result<UsageCounter> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut stored = self.load_stored(owner_id).await?;
        if let Some(ref mut s) = stored {
            if self.ensure_current(s) {
                self.save_stored(owner_id, s).await?;
            }
        }

        if self.connectivity.is_online() {
            let backend = self.backend.clone();
            let result = greenscan_retry::execute("record_usage", &self.policy, || {
                let backend = backend.clone();
                let owner = owner_id.clone();
                async move { backend.increment_counter(&owner, 1).await }
            })
            .await;

            match result {
                Ok(remote) => {
                    let updated = self.adopt_remote(owner_id, remote, stored);
                    self.save_stored(owner_id, &updated).await?;
                    return Ok(updated.counter);
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        owner_id = %owner_id,
                        error = %err,
                        "Remote usage increment unreachable, falling back to offline accounting"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Offline path: optimistic local increment plus a pending-sync event
        let mut updated = stored.unwrap_or_else(|| StoredCounter {
            counter: UsageCounter::open(
                owner_id.clone(),
                self.default_limit,
                chrono::Duration::days(30),
            ),
            fetched_at: Utc::now(),
            history: Vec::new(),
        });
        updated.counter.note_offline_use();
        self.save_stored(owner_id, &updated).await?;

        let mut pending = self.load_pending(owner_id).await?;
        pending.push(PendingUsage::now());
        self.save_pending(owner_id, &pending).await?;

        debug!(
            owner_id = %owner_id,
            pending = pending.len(),
            used = updated.counter.used(),
            "Recorded offline usage"
        );
        Ok(updated.counter)
    }

    // ========================================================================
    // can_use
    // ========================================================================

    /// Answers whether the owner may run another analysis right now
    pub async fn can_use(&self, owner_id: &OwnerId) -> anyhow::Result<UsageStatus> {
        let mut stored = self.load_stored(owner_id).await?;

        let wants_refresh = match &stored {
            None => true,
            Some(s) => !self.is_fresh(s) || s.counter.needs_rollover(Utc::now()),
        };

        if wants_refresh && self.connectivity.is_online() {
            let backend = self.backend.clone();
            let result = greenscan_retry::execute("get_usage", &self.policy, || {
                let backend = backend.clone();
                let owner = owner_id.clone();
                async move { backend.get_counter(&owner).await }
            })
            .await;

            match result {
                Ok(remote) => {
                    let updated = self.adopt_remote(owner_id, remote, stored.take());
                    self.save_stored(owner_id, &updated).await?;
                    stored = Some(updated);
                }
                Err(err) => {
                    // Any failure here degrades to the cached counter; the
                    // quota gate never turns a read problem into a hard stop.
                    warn!(owner_id = %owner_id, error = %err, "Counter refresh failed, using cache");
                }
            }
        }

        match stored {
            None => Ok(UsageStatus {
                allowed: true,
                remaining: self.default_limit,
                limit: self.default_limit,
                is_premium: false,
            }),
            Some(mut s) => {
                if self.ensure_current(&mut s) {
                    self.save_stored(owner_id, &s).await?;
                }
                Ok(UsageStatus {
                    allowed: s.counter.used() < s.counter.limit(),
                    remaining: s.counter.remaining(),
                    limit: s.counter.limit(),
                    is_premium: s.counter.is_premium(),
                })
            }
        }
    }

    // ========================================================================
    // sync_pending
    // ========================================================================

    /// Drains the owner's pending-usage list against the remote counter
    ///
    /// One increment per event: an interrupted pass leaves exact partial
    /// progress. Returns how many events were confirmed this pass. A
    /// quota-exceeded response discards the remaining events; the period
    /// they belong to is spent and replaying them later would only inflate a
    /// future period.
    pub async fn sync_pending(&self, owner_id: &OwnerId) -> anyhow::Result<u32> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut pending = self.load_pending(owner_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(
            owner_id = %owner_id,
            pending = pending.len(),
            "Syncing pending usage events"
        );

        let mut confirmed: u32 = 0;
        while !pending.is_empty() {
            let backend = self.backend.clone();
            let result = greenscan_retry::execute("sync_usage", &self.policy, || {
                let backend = backend.clone();
                let owner = owner_id.clone();
                async move { backend.increment_counter(&owner, 1).await }
            })
            .await;

            match result {
                Ok(remote) => {
                    pending.remove(0);
                    confirmed += 1;
                    self.save_pending(owner_id, &pending).await?;

                    let stored = self.load_stored(owner_id).await?;
                    let mut updated = self.adopt_remote(owner_id, remote, stored);
                    updated.counter.confirm_pending(1);
                    self.save_stored(owner_id, &updated).await?;
                }
                Err(RemoteError::QuotaExceeded) => {
                    warn!(
                        owner_id = %owner_id,
                        discarded = pending.len(),
                        "Quota exhausted remotely, discarding remaining pending events"
                    );
                    let discarded = pending.len() as u32;
                    pending.clear();
                    self.save_pending(owner_id, &pending).await?;
                    if let Some(mut s) = self.load_stored(owner_id).await? {
                        s.counter.confirm_pending(discarded);
                        self.save_stored(owner_id, &s).await?;
                    }
                    break;
                }
                Err(err) => {
                    warn!(
                        owner_id = %owner_id,
                        error = %err,
                        confirmed,
                        remaining = pending.len(),
                        "Pending usage sync interrupted, remaining events kept for a later attempt"
                    );
                    break;
                }
            }
        }

        Ok(confirmed)
    }

    /// Number of unsynced offline usage events for diagnostics and tests
    pub async fn pending_len(&self, owner_id: &OwnerId) -> anyhow::Result<usize> {
        Ok(self.load_pending(owner_id).await?.len())
    }
}
