//! Quota cooldown governor.
//!
//! The provider resets upload quota on a 24-hour window. After a
//! quota-categorized error, all uploads are suspended until the window (plus
//! a small buffer against clock skew and early retries) has elapsed. Whether
//! the cooldown is active is derived from the persisted hit timestamp on
//! every call, so the answer is consistent across process restarts without
//! extra bookkeeping.

use chrono::{DateTime, TimeDelta, Utc};
use clipship_store::{QUOTA_STORE, QuotaDoc, StateDir, StoreError};
use tracing::{info, warn};

/// Cooldown window after a quota hit: 24 hours.
const COOLDOWN_HOURS: i64 = 24;

/// Safety buffer on top of the window: 5 minutes.
const COOLDOWN_BUFFER_MINUTES: i64 = 5;

/// Tracks and persists the provider quota cooldown.
#[derive(Debug)]
pub struct QuotaGovernor {
    doc: QuotaDoc,
    store: StateDir,
}

impl QuotaGovernor {
    /// Loads the persisted cooldown state from the state directory.
    pub fn load(store: &StateDir) -> Self {
        let doc: QuotaDoc = store.load(QUOTA_STORE);
        if let Some(hit) = doc.last_quota_hit {
            info!(last_quota_hit = %hit, "loaded quota cooldown state");
        }
        Self {
            doc,
            store: store.clone(),
        }
    }

    /// When the current cooldown ends, if one was ever recorded.
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        let hit = self.doc.last_quota_hit?;
        Some(hit + TimeDelta::hours(COOLDOWN_HOURS) + TimeDelta::minutes(COOLDOWN_BUFFER_MINUTES))
    }

    /// True while uploads must stay suspended, computed fresh from `now`.
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until().is_some_and(|end| now < end)
    }

    /// Time left in the cooldown, `None` once it has elapsed (or never hit).
    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let end = self.cooldown_until()?;
        (now < end).then(|| end - now)
    }

    /// Records a quota hit at `now` and persists it immediately.
    pub fn record_hit(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.doc.last_quota_hit = Some(now);
        warn!(until = %self.cooldown_until().unwrap_or(now), "quota exceeded, entering cooldown");
        self.store.save(QUOTA_STORE, &self.doc)
    }

    /// Clears the cooldown (manual operator reset; normally it just expires).
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.doc.last_quota_hit = None;
        self.store.save(QUOTA_STORE, &self.doc)
    }
}
