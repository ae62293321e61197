//! Usage counter storage
//!
//! Implementations must make [`UsageStore::rollover`] and
//! [`UsageStore::try_increment`] atomic per `(subject, resource)` key; the
//! ledger never does read-compute-write on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Active consumption counter for one subject and resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub subject_id: String,
    pub resource_key: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub consumed: u64,
}

/// Result of a conditional increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Added; carries the new total
    Applied(u64),
    /// Would exceed the limit; carries the unchanged total
    Rejected(u64),
    /// No active row for the expected window (rolled over or archived)
    Stale,
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn load(&self, subject: &str, resource: &str) -> Result<Option<UsageCounter>, BoxError>;

    /// Replace the active row with `fresh` if the stored `window_end` still
    /// equals `expected_window_end` (`None`: no row exists). Returns whether
    /// this call performed the swap.
    async fn rollover(
        &self,
        expected_window_end: Option<DateTime<Utc>>,
        fresh: UsageCounter,
    ) -> Result<bool, BoxError>;

    /// Add `units` if the active row ends at `window_end` and the new total
    /// stays within `limit` (`None`: no cap)
    async fn try_increment(
        &self,
        subject: &str,
        resource: &str,
        window_end: DateTime<Utc>,
        units: u64,
        limit: Option<u64>,
    ) -> Result<IncrementOutcome, BoxError>;

    /// Move rows whose window ended at or before `now` to history
    async fn archive_stale(&self, now: DateTime<Utc>) -> Result<u64, BoxError>;
}

/// In-memory usage store
#[derive(Default)]
pub struct MemoryUsageStore {
    active: DashMap<(String, String), UsageCounter>,
    history: Mutex<Vec<UsageCounter>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows replaced by rollover or moved out by archival
    pub fn history(&self) -> Vec<UsageCounter> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn load(&self, subject: &str, resource: &str) -> Result<Option<UsageCounter>, BoxError> {
        Ok(self
            .active
            .get(&(subject.to_string(), resource.to_string()))
            .map(|row| row.clone()))
    }

    async fn rollover(
        &self,
        expected_window_end: Option<DateTime<Utc>>,
        fresh: UsageCounter,
    ) -> Result<bool, BoxError> {
        let key = (fresh.subject_id.clone(), fresh.resource_key.clone());
        match self.active.entry(key) {
            Entry::Occupied(mut row) => {
                if expected_window_end != Some(row.get().window_end) {
                    return Ok(false);
                }
                let previous = std::mem::replace(row.get_mut(), fresh);
                self.history.lock().push(previous);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                if expected_window_end.is_some() {
                    return Ok(false);
                }
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn try_increment(
        &self,
        subject: &str,
        resource: &str,
        window_end: DateTime<Utc>,
        units: u64,
        limit: Option<u64>,
    ) -> Result<IncrementOutcome, BoxError> {
        let key = (subject.to_string(), resource.to_string());
        let Some(mut row) = self.active.get_mut(&key) else {
            return Ok(IncrementOutcome::Stale);
        };
        if row.window_end != window_end {
            return Ok(IncrementOutcome::Stale);
        }

        let Some(next) = row.consumed.checked_add(units) else {
            return Ok(IncrementOutcome::Rejected(row.consumed));
        };
        if limit.is_some_and(|cap| next > cap) {
            return Ok(IncrementOutcome::Rejected(row.consumed));
        }
        row.consumed = next;
        Ok(IncrementOutcome::Applied(next))
    }

    async fn archive_stale(&self, now: DateTime<Utc>) -> Result<u64, BoxError> {
        let mut archived = 0u64;
        self.active.retain(|_, row| {
            if row.window_end <= now {
                self.history.lock().push(row.clone());
                archived += 1;
                false
            } else {
                true
            }
        });
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn counter(end: DateTime<Utc>, consumed: u64) -> UsageCounter {
        UsageCounter {
            subject_id: "u1".into(),
            resource_key: "scans".into(),
            window_start: end - Duration::days(1),
            window_end: end,
            consumed,
        }
    }

    #[tokio::test]
    async fn test_rollover_is_compare_and_swap() {
        let store = MemoryUsageStore::new();
        let d1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let d2 = d1 + Duration::days(1);

        assert!(store.rollover(None, counter(d1, 0)).await.unwrap());
        // Second creator loses
        assert!(!store.rollover(None, counter(d1, 0)).await.unwrap());

        assert!(store.rollover(Some(d1), counter(d2, 0)).await.unwrap());
        // Stale expectation loses
        assert!(!store.rollover(Some(d1), counter(d2, 0)).await.unwrap());
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_respects_limit_and_window() {
        let store = MemoryUsageStore::new();
        let end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        store.rollover(None, counter(end, 0)).await.unwrap();

        assert_eq!(
            store.try_increment("u1", "scans", end, 2, Some(3)).await.unwrap(),
            IncrementOutcome::Applied(2)
        );
        assert_eq!(
            store.try_increment("u1", "scans", end, 2, Some(3)).await.unwrap(),
            IncrementOutcome::Rejected(2)
        );
        assert_eq!(
            store.try_increment("u1", "scans", end, 5, None).await.unwrap(),
            IncrementOutcome::Applied(7)
        );
        assert_eq!(
            store
                .try_increment("u1", "scans", end + Duration::days(1), 1, None)
                .await
                .unwrap(),
            IncrementOutcome::Stale
        );
        assert_eq!(
            store.try_increment("u2", "scans", end, 1, None).await.unwrap(),
            IncrementOutcome::Stale
        );
    }

    #[tokio::test]
    async fn test_archive_moves_only_ended_rows() {
        let store = MemoryUsageStore::new();
        let end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        store.rollover(None, counter(end, 4)).await.unwrap();
        let mut other = counter(end + Duration::days(1), 1);
        other.resource_key = "chat_messages".into();
        store.rollover(None, other).await.unwrap();

        assert_eq!(store.archive_stale(end).await.unwrap(), 1);
        assert!(store.load("u1", "scans").await.unwrap().is_none());
        assert!(store.load("u1", "chat_messages").await.unwrap().is_some());
        assert_eq!(store.history()[0].consumed, 4);
    }
}
