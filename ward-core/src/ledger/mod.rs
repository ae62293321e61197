//! Quota ledger with lazy window rollover
//!
//! Every call first checks the stored counter against the window computed
//! for `now`. A counter is replaced only when the computed window supersedes
//! it: the stored window has ended, or was opened under an earlier anchor or
//! cadence. A counter that starts at or after the computed window's end was
//! opened by a caller whose clock runs ahead; it stays live and is counted
//! against as-is. Replacement goes through [`UsageStore::rollover`], a
//! compare-and-swap on the stored `window_end`, so concurrent callers
//! converge on a single fresh row. Consumption is a conditional increment;
//! nothing here reads, computes and writes unguarded.

mod store;

pub use store::{IncrementOutcome, MemoryUsageStore, UsageCounter, UsageStore};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::plan::Limit;
use crate::window::{Cadence, Window, window_for};

/// Bound on rollover/increment rounds lost to concurrent writers
const MAX_ATTEMPTS: usize = 8;

/// What to count and against which limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meter {
    pub resource_key: String,
    pub limit: Limit,
    pub cadence: Cadence,
    /// Alignment for anchored cadences
    pub anchor: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// `remaining` is `None` for unlimited meters
    Consumed {
        remaining: Option<u64>,
        reset_at: DateTime<Utc>,
    },
    Denied { limit: u64, reset_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    pub consumed: u64,
    pub limit: Limit,
    pub window: Window,
}

pub struct QuotaLedger {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current consumption; never writes
    ///
    /// A superseded or missing counter reads as zero for the current window.
    pub async fn peek(&self, subject: &str, meter: &Meter) -> Result<Usage, EngineError> {
        let window = window_for(meter.cadence, meter.anchor, self.clock.now())?;
        let row = self
            .store
            .load(subject, &meter.resource_key)
            .await
            .map_err(EngineError::Storage)?;
        let (consumed, window) = row
            .as_ref()
            .and_then(|row| live_window(row, &window).map(|live| (row.consumed, live)))
            .unwrap_or((0, window));
        Ok(Usage {
            consumed,
            limit: meter.limit,
            window,
        })
    }

    /// Consume `units` all-or-nothing
    ///
    /// Unlimited meters always succeed; their counter is kept for analytics
    /// and a failure to record it is logged, not returned.
    pub async fn try_consume(
        &self,
        subject: &str,
        meter: &Meter,
        units: u64,
    ) -> Result<ConsumeOutcome, EngineError> {
        if units == 0 {
            return Err(EngineError::InvalidUnits);
        }
        let now = self.clock.now();
        let window = window_for(meter.cadence, meter.anchor, now)?;

        match (meter.limit, self.consume_in(subject, meter, &window, units).await) {
            (Limit::Unlimited, Err(EngineError::Storage(e))) => {
                tracing::warn!(
                    subject = %subject,
                    resource = %meter.resource_key,
                    error = %e,
                    "Failed to record unlimited usage"
                );
                Ok(ConsumeOutcome::Consumed {
                    remaining: None,
                    reset_at: window.end,
                })
            }
            (_, result) => result,
        }
    }

    async fn consume_in(
        &self,
        subject: &str,
        meter: &Meter,
        window: &Window,
        units: u64,
    ) -> Result<ConsumeOutcome, EngineError> {
        let key = meter.resource_key.as_str();
        let cap = meter.limit.cap();

        for _ in 0..MAX_ATTEMPTS {
            let current = self
                .store
                .load(subject, key)
                .await
                .map_err(EngineError::Storage)?;

            let Some(active) = current.as_ref().and_then(|row| live_window(row, window)) else {
                self.roll(subject, key, current, window).await?;
                continue;
            };

            let outcome = self
                .store
                .try_increment(subject, key, active.end, units, cap)
                .await
                .map_err(EngineError::Storage)?;
            match outcome {
                IncrementOutcome::Applied(consumed) => {
                    return Ok(ConsumeOutcome::Consumed {
                        remaining: cap.map(|cap| cap.saturating_sub(consumed)),
                        reset_at: active.end,
                    });
                }
                IncrementOutcome::Rejected(consumed) => {
                    let limit = cap.unwrap_or(u64::MAX);
                    tracing::warn!(
                        subject = %subject,
                        resource = %key,
                        consumed,
                        limit,
                        units,
                        "Quota denied"
                    );
                    return Ok(ConsumeOutcome::Denied {
                        limit,
                        reset_at: active.end,
                    });
                }
                // Rolled over or archived between load and increment
                IncrementOutcome::Stale => continue,
            }
        }

        tracing::error!(subject = %subject, resource = %key, "Counter contention did not settle");
        Err(EngineError::Internal(format!(
            "counter for {key} did not settle after {MAX_ATTEMPTS} attempts"
        )))
    }

    async fn roll(
        &self,
        subject: &str,
        key: &str,
        current: Option<UsageCounter>,
        window: &Window,
    ) -> Result<(), EngineError> {
        let expected = current.as_ref().map(|row| row.window_end);
        let fresh = UsageCounter {
            subject_id: subject.to_string(),
            resource_key: key.to_string(),
            window_start: window.start,
            window_end: window.end,
            consumed: 0,
        };
        let won = self
            .store
            .rollover(expected, fresh)
            .await
            .map_err(EngineError::Storage)?;
        if won {
            tracing::debug!(
                subject = %subject,
                resource = %key,
                window_end = %window.end,
                previous = current.map(|row| row.consumed).unwrap_or(0),
                "Usage window rolled over"
            );
        } else {
            tracing::debug!(subject = %subject, resource = %key, "Lost rollover race");
        }
        Ok(())
    }

    /// Housekeeping: move ended counters to history
    pub async fn archive_stale(&self) -> Result<u64, EngineError> {
        self.store
            .archive_stale(self.clock.now())
            .await
            .map_err(EngineError::Storage)
    }
}

/// Window a stored counter should be counted against, or `None` when the
/// computed window supersedes it and it must be rolled over.
fn live_window(row: &UsageCounter, computed: &Window) -> Option<Window> {
    if row.window_end == computed.end {
        return Some(*computed);
    }
    // Opened by a caller whose clock is ahead of ours; never reset it
    if row.window_start >= computed.end {
        return Some(Window {
            start: row.window_start,
            end: row.window_end,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::BoxError;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn daily(limit: Limit) -> Meter {
        Meter {
            resource_key: "chat_messages".into(),
            limit,
            cadence: Cadence::DailyUtc,
            anchor: start(),
        }
    }

    fn ledger() -> (QuotaLedger, Arc<ManualClock>, Arc<MemoryUsageStore>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryUsageStore::new());
        (QuotaLedger::new(store.clone(), clock.clone()), clock, store)
    }

    #[tokio::test]
    async fn test_consumes_until_limit_then_denies() {
        let (ledger, _, _) = ledger();
        let meter = daily(Limit::Limited(3));

        for expected in [2, 1, 0] {
            let outcome = ledger.try_consume("u1", &meter, 1).await.unwrap();
            assert!(matches!(
                outcome,
                ConsumeOutcome::Consumed { remaining: Some(r), .. } if r == expected
            ));
        }
        let denied = ledger.try_consume("u1", &meter, 1).await.unwrap();
        assert_eq!(
            denied,
            ConsumeOutcome::Denied {
                limit: 3,
                reset_at: Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap(),
            }
        );
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 3);
    }

    #[tokio::test]
    async fn test_oversized_request_is_denied_in_full() {
        let (ledger, _, _) = ledger();
        let meter = daily(Limit::Limited(5));
        ledger.try_consume("u1", &meter, 3).await.unwrap();

        let outcome = ledger.try_consume("u1", &meter, 3).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Denied { limit: 5, .. }));
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 3);
    }

    #[tokio::test]
    async fn test_zero_units_rejected() {
        let (ledger, _, _) = ledger();
        let err = ledger.try_consume("u1", &daily(Limit::Unlimited), 0).await;
        assert!(matches!(err, Err(EngineError::InvalidUnits)));
    }

    #[tokio::test]
    async fn test_rollover_resets_exactly_once() {
        let (ledger, clock, store) = ledger();
        let meter = daily(Limit::Limited(2));
        ledger.try_consume("u1", &meter, 2).await.unwrap();

        clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap());
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 0);
        // peek does not roll over
        assert!(store.history().is_empty());

        ledger.try_consume("u1", &meter, 1).await.unwrap();
        ledger.try_consume("u1", &meter, 1).await.unwrap();
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 2);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].consumed, 2);
    }

    #[tokio::test]
    async fn test_unlimited_counts_without_cap() {
        let (ledger, _, _) = ledger();
        let meter = daily(Limit::Unlimited);
        for _ in 0..50 {
            let outcome = ledger.try_consume("u1", &meter, 1).await.unwrap();
            assert!(matches!(
                outcome,
                ConsumeOutcome::Consumed { remaining: None, .. }
            ));
        }
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 50);
    }

    struct DownStore;

    #[async_trait]
    impl UsageStore for DownStore {
        async fn load(&self, _: &str, _: &str) -> Result<Option<UsageCounter>, BoxError> {
            Err("ledger unreachable".into())
        }
        async fn rollover(&self, _: Option<DateTime<Utc>>, _: UsageCounter) -> Result<bool, BoxError> {
            Err("ledger unreachable".into())
        }
        async fn try_increment(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: u64,
            _: Option<u64>,
        ) -> Result<IncrementOutcome, BoxError> {
            Err("ledger unreachable".into())
        }
        async fn archive_stale(&self, _: DateTime<Utc>) -> Result<u64, BoxError> {
            Err("ledger unreachable".into())
        }
    }

    #[tokio::test]
    async fn test_storage_outage_fails_closed_for_limited_meters() {
        let ledger = QuotaLedger::new(Arc::new(DownStore), Arc::new(ManualClock::new(start())));

        let err = ledger.try_consume("u1", &daily(Limit::Limited(5)), 1).await;
        assert!(matches!(err, Err(EngineError::Storage(_))));

        let outcome = ledger
            .try_consume("u1", &daily(Limit::Unlimited), 1)
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Consumed { remaining: None, .. }));
    }

    #[tokio::test]
    async fn test_changed_anchor_starts_a_fresh_window() {
        let (ledger, clock, _) = ledger();
        let mut meter = Meter {
            resource_key: "scans".into(),
            limit: Limit::Limited(10),
            cadence: Cadence::MonthlyAnchored,
            anchor: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        ledger.try_consume("u1", &meter, 4).await.unwrap();

        clock.advance(Duration::hours(2));
        meter.anchor = clock.now();
        let usage = ledger.peek("u1", &meter).await.unwrap();
        assert_eq!(usage.consumed, 0);
        assert_eq!(
            usage.window.end,
            Utc.with_ymd_and_hms(2026, 4, 10, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_lagging_clock_never_resets_a_newer_window() {
        let (ledger, clock, store) = ledger();
        let meter = daily(Limit::Limited(2));
        ledger.try_consume("u1", &meter, 1).await.unwrap();

        // Another instance already opened the next day
        clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 1).unwrap());
        ledger.try_consume("u1", &meter, 2).await.unwrap();
        assert_eq!(store.history().len(), 1);

        // This one is two seconds behind
        clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 23, 59, 59).unwrap());
        let next_midnight = Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap();
        assert_eq!(
            ledger.try_consume("u1", &meter, 1).await.unwrap(),
            ConsumeOutcome::Denied {
                limit: 2,
                reset_at: next_midnight,
            }
        );
        let usage = ledger.peek("u1", &meter).await.unwrap();
        assert_eq!(usage.consumed, 2);
        assert_eq!(usage.window.end, next_midnight);

        clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 2).unwrap());
        let outcome = ledger.try_consume("u1", &meter, 1).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Denied { limit: 2, .. }));
        assert_eq!(ledger.peek("u1", &meter).await.unwrap().consumed, 2);
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_lagging_clock_counts_against_the_newer_window() {
        let (ledger, clock, store) = ledger();
        let meter = daily(Limit::Limited(3));

        clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 1).unwrap());
        ledger.try_consume("u1", &meter, 1).await.unwrap();

        clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 23, 59, 58).unwrap());
        let outcome = ledger.try_consume("u1", &meter, 1).await.unwrap();
        assert_eq!(
            outcome,
            ConsumeOutcome::Consumed {
                remaining: Some(1),
                reset_at: Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap(),
            }
        );
        assert!(store.history().is_empty());
    }
}
