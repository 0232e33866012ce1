use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::policy::DpopPolicy;
use crate::replay::store::{ReplayError, ReplayStore};

const DEFAULT_SWEEP_INTERVAL_SECONDS: i64 = 60;

/// In-process replay cache: `jti` -> first-seen unix seconds.
///
/// Lookup, insert and expiry all happen under one mutex, so two concurrent
/// callers can never both see a `jti` as absent, and a sweep never removes an
/// entry in the middle of a check.
///
/// An entry older than `max_age` no longer counts as seen even before it is
/// swept. That is only safe while `max_age` outlives the verifier's freshness
/// window; build it from the same [`DpopPolicy`] as the verifier.
#[derive(Debug)]
pub struct MemoryReplayCache {
    max_age_seconds: i64,
    sweep_interval_seconds: i64,
    inner: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    seen: HashMap<String, i64>,
    last_sweep: i64,
}

impl Entries {
    fn sweep(&mut self, now: i64, max_age: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, first_seen| now - *first_seen <= max_age);
        self.last_sweep = now;
        before - self.seen.len()
    }
}

impl MemoryReplayCache {
    pub fn new(max_age_seconds: u64) -> Self {
        Self {
            max_age_seconds: i64::try_from(max_age_seconds).unwrap_or(i64::MAX),
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            inner: Mutex::new(Entries::default()),
        }
    }

    pub fn from_policy(policy: &DpopPolicy) -> Self {
        Self::new(policy.replay_ttl_seconds())
    }

    /// How often an access may trigger a full sweep of expired entries.
    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval_seconds = i64::try_from(every.as_secs()).unwrap_or(i64::MAX);
        self
    }

    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    /// `true` if `jti` was already recorded within `max_age` of `now`;
    /// otherwise records it at `now` and returns `false`.
    pub fn seen_and_record_at(&self, jti: &str, now: i64) -> bool {
        let mut entries = self.lock();

        if now - entries.last_sweep >= self.sweep_interval_seconds {
            let removed = entries.sweep(now, self.max_age_seconds);
            if removed > 0 {
                debug!(removed, "swept expired jti entries");
            }
        }

        match entries.seen.get(jti) {
            Some(&first_seen) if now - first_seen <= self.max_age_seconds => true,
            _ => {
                entries.seen.insert(jti.to_owned(), now);
                false
            }
        }
    }

    /// Drop every entry older than `max_age`. Returns how many were removed.
    pub fn purge_expired_at(&self, now: i64) -> usize {
        self.lock().sweep(now, self.max_age_seconds)
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(chrono::Utc::now().timestamp())
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries on the tokio runtime.
    ///
    /// The task stops by itself once the last `Arc` to the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "replay cache sweep");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryReplayCache {
    fn default() -> Self {
        Self::from_policy(&DpopPolicy::default())
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayCache {
    async fn seen_and_record(&self, jti: &str) -> Result<bool, ReplayError> {
        Ok(self.seen_and_record_at(jti, chrono::Utc::now().timestamp()))
    }

    fn retention_seconds(&self) -> u64 {
        u64::try_from(self.max_age_seconds).unwrap_or(0)
    }
}
