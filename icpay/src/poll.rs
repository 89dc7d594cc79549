//! Fixed-interval status polling.
//!
//! The poller asks the tracker about one transaction until a record carrying
//! a status shows up, the attempt budget runs out, an optional deadline
//! passes, or the caller cancels. Time is read and spent only through a
//! [`PollClock`], so tests drive the poller without real waits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio_util::sync::CancellationToken;

use crate::error::IcpayError;
use crate::tracking::{TrackerError, TrackingKey, TransactionFilter, TransactionRecord, TransactionTracker};

/// How often and how long to poll.
///
/// Attempts are evenly spaced; there is no backoff. Durations travel as
/// whole milliseconds.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of lookups. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between lookups.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Overall bound on the wait, measured from the first lookup.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Default number of lookups.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
    /// Default pause between lookups.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the pause between lookups.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bounds the whole wait.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            interval: Self::DEFAULT_INTERVAL,
            deadline: None,
        }
    }
}

/// Source of time for the poller.
#[async_trait::async_trait]
pub trait PollClock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl PollClock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Why polling stopped without a status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// Every attempt ran without observing a status.
    #[error("no status after {attempts} attempts")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt, if it failed.
        last_error: Option<TrackerError>,
    },
    /// The overall deadline passed.
    #[error("deadline of {deadline:?} passed after {attempts} attempts")]
    DeadlineExceeded {
        /// Attempts made.
        attempts: u32,
        /// The configured deadline.
        deadline: Duration,
    },
    /// The caller cancelled the wait.
    #[error("cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made.
        attempts: u32,
    },
}

impl PollError {
    /// Attempts made before polling stopped.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Converts into the SDK error for `key`.
    ///
    /// A budget that ran out on a failing lookup reports the lookup failure;
    /// every other stop is a timeout.
    #[must_use]
    pub fn into_error(self, key: &TrackingKey) -> IcpayError {
        match self {
            Self::Exhausted {
                last_error: Some(err),
                ..
            } => IcpayError::TransactionStatusFetchFailed {
                transaction_id: key.to_string(),
                reason: err.to_string(),
            },
            other => IcpayError::TransactionTimeout {
                transaction_id: key.to_string(),
                attempts: other.attempts(),
            },
        }
    }
}

/// Polls the tracker for one transaction.
#[allow(missing_debug_implementations)]
pub struct StatusPoller<'a> {
    tracker: &'a dyn TransactionTracker,
    clock: &'a dyn PollClock,
    policy: RetryPolicy,
    filter: TransactionFilter,
}

impl<'a> StatusPoller<'a> {
    /// Creates a poller using `policy`.
    #[must_use]
    pub fn new(
        tracker: &'a dyn TransactionTracker,
        clock: &'a dyn PollClock,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            tracker,
            clock,
            policy,
            filter: TransactionFilter::default(),
        }
    }

    /// Sets the filter used by the list fallback.
    #[must_use]
    pub fn with_filter(mut self, filter: TransactionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Polls until a record with a status appears.
    ///
    /// # Errors
    ///
    /// Returns a [`PollError`] when the budget, the deadline or `cancel` ends
    /// the wait first. The transfer itself is never affected.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "icpay.poll", skip_all, fields(key = %key, max_attempts = self.policy.max_attempts))
    )]
    pub async fn poll(
        &self,
        key: &TrackingKey,
        cancel: &CancellationToken,
    ) -> Result<TransactionRecord, PollError> {
        let started = self.clock.now();
        let max_attempts = self.policy.attempts();
        let mut attempts = 0;
        let mut last_error = None;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled { attempts });
            }

            attempts += 1;
            match self.lookup(key).await {
                Ok(Some(record)) if record.status.is_some() => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(attempts, status = %record.normalized_status(), "Observed transaction status");
                    return Ok(record);
                }
                Ok(_) => last_error = None,
                Err(err) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(attempts, error = %err, "Status lookup failed");
                    last_error = Some(err);
                }
            }

            if attempts >= max_attempts {
                return Err(PollError::Exhausted {
                    attempts,
                    last_error,
                });
            }

            let mut wait = self.policy.interval;
            if let Some(deadline) = self.policy.deadline {
                let elapsed = self.clock.now().saturating_duration_since(started);
                let Some(remaining) = deadline.checked_sub(elapsed).filter(|r| !r.is_zero()) else {
                    return Err(PollError::DeadlineExceeded { attempts, deadline });
                };
                wait = wait.min(remaining);
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
                () = self.clock.sleep(wait) => {}
            }
        }
    }

    /// One attempt: direct lookup, then the list fallback.
    async fn lookup(&self, key: &TrackingKey) -> Result<Option<TransactionRecord>, TrackerError> {
        let direct = match self.tracker.get_transaction(&key.lookup_id()).await {
            Ok(Some(record)) if !record.matches(key) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(id = %record.id, "Direct lookup returned another transaction");
                None
            }
            Ok(Some(record)) if record.status.is_some() => return Ok(Some(record)),
            Ok(found) => found,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(error = %err, "Direct lookup failed, listing instead");
                drop(err);
                None
            }
        };

        let page = self.tracker.list_transactions(&self.filter).await?;
        let listed = page.transactions.into_iter().find(|record| record.matches(key));
        Ok(listed.or(direct))
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::testing::ManualClock;
    use super::*;
    use crate::ledger::BlockIndex;
    use crate::principal::Principal;
    use crate::tracking::{TransactionId, TransactionPage, TransactionStatus};

    type Lookup = Result<Option<TransactionRecord>, TrackerError>;

    #[derive(Default)]
    struct ScriptedTracker {
        direct: Mutex<VecDeque<Lookup>>,
        listed: Mutex<Vec<TransactionRecord>>,
        list_error: Option<TrackerError>,
        direct_calls: Mutex<u32>,
        list_calls: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl TransactionTracker for ScriptedTracker {
        async fn notify_transfer(
            &self,
            _ledger_id: &Principal,
            _block_index: BlockIndex,
        ) -> Result<TransactionId, TrackerError> {
            unreachable!("the poller never notifies")
        }

        async fn get_transaction(&self, _id: &TransactionId) -> Lookup {
            *self.direct_calls.lock().unwrap() += 1;
            self.direct.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn list_transactions(
            &self,
            _filter: &TransactionFilter,
        ) -> Result<TransactionPage, TrackerError> {
            *self.list_calls.lock().unwrap() += 1;
            if let Some(err) = &self.list_error {
                return Err(err.clone());
            }
            Ok(TransactionPage {
                transactions: self.listed.lock().unwrap().clone(),
                has_more: false,
            })
        }
    }

    fn record(value: serde_json::Value) -> TransactionRecord {
        serde_json::from_value(value).unwrap()
    }

    fn key() -> TrackingKey {
        TrackingKey::Transaction("tx-1".into())
    }

    #[tokio::test]
    async fn first_status_ends_polling() {
        let tracker = ScriptedTracker::default();
        tracker.direct.lock().unwrap().extend([
            Ok(None),
            Ok(Some(record(json!({"id": "tx-1"})))),
            Ok(Some(record(json!({"id": "tx-1", "status": {"Pending": null}})))),
        ]);
        let clock = ManualClock::new();
        let poller = StatusPoller::new(&tracker, &clock, RetryPolicy::default());

        let found = poller.poll(&key(), &CancellationToken::new()).await.unwrap();
        assert_eq!(found.normalized_status(), TransactionStatus::Pending);
        assert_eq!(*tracker.direct_calls.lock().unwrap(), 3);
        assert_eq!(clock.slept(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn list_fallback_finds_record_by_block() {
        let tracker = ScriptedTracker {
            list_error: None,
            ..Default::default()
        };
        tracker
            .direct
            .lock()
            .unwrap()
            .push_back(Err(TrackerError::Transport("reset".into())));
        tracker.listed.lock().unwrap().extend([
            record(json!({"id": "other", "blockIndex": 41, "status": "completed"})),
            record(json!({"id": "tx-9", "blockIndex": 42, "status": {"Completed": null}})),
        ]);
        let clock = ManualClock::new();
        let poller = StatusPoller::new(&tracker, &clock, RetryPolicy::default());

        let found = poller
            .poll(&TrackingKey::Block(BlockIndex(42)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.id, TransactionId::from("tx-9"));
        assert!(clock.slept().is_empty());
    }

    #[tokio::test]
    async fn block_key_skips_records_of_other_blocks() {
        let decoy = record(json!({"id": 42, "blockIndex": 99, "status": {"Failed": "expired"}}));
        let tracker = ScriptedTracker::default();
        tracker.direct.lock().unwrap().push_back(Ok(Some(decoy.clone())));
        tracker.listed.lock().unwrap().extend([
            decoy,
            record(json!({"id": "tx-7", "blockIndex": 42, "status": {"Completed": null}})),
        ]);
        let clock = ManualClock::new();
        let poller = StatusPoller::new(&tracker, &clock, RetryPolicy::default());

        let found = poller
            .poll(&TrackingKey::Block(BlockIndex(42)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.id, TransactionId::from("tx-7"));
        assert_eq!(found.normalized_status(), TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let tracker = ScriptedTracker::default();
        let clock = ManualClock::new();
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_interval(Duration::from_millis(500));
        let poller = StatusPoller::new(&tracker, &clock, policy);

        let err = poller.poll(&key(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err,
            PollError::Exhausted {
                attempts: 3,
                last_error: None
            }
        );
        assert_eq!(*tracker.direct_calls.lock().unwrap(), 3);
        assert_eq!(*tracker.list_calls.lock().unwrap(), 3);
        assert_eq!(clock.slept().len(), 2);
        assert!(matches!(
            err.into_error(&key()),
            IcpayError::TransactionTimeout { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn failing_lookups_surface_as_fetch_failure() {
        let tracker = ScriptedTracker {
            list_error: Some(TrackerError::Transport("down".into())),
            ..Default::default()
        };
        let clock = ManualClock::new();
        let poller = StatusPoller::new(&tracker, &clock, RetryPolicy::default().with_max_attempts(2));

        let err = poller.poll(&key(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.into_error(&key()),
            IcpayError::TransactionStatusFetchFailed { .. }
        ));
    }

    #[tokio::test]
    async fn deadline_shortens_the_last_wait() {
        let tracker = ScriptedTracker::default();
        let clock = ManualClock::new();
        let policy = RetryPolicy::default().with_deadline(Duration::from_secs(5));
        let poller = StatusPoller::new(&tracker, &clock, policy);

        let err = poller.poll(&key(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PollError::DeadlineExceeded { attempts: 4, .. }));
        assert_eq!(
            clock.slept(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_lookup() {
        let tracker = ScriptedTracker::default();
        let clock = ManualClock::new();
        let poller = StatusPoller::new(&tracker, &clock, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller.poll(&key(), &cancel).await.unwrap_err();
        assert_eq!(err, PollError::Cancelled { attempts: 0 });
        assert_eq!(*tracker.direct_calls.lock().unwrap(), 0);
    }

    #[test]
    fn policy_serializes_in_milliseconds() {
        let policy = RetryPolicy::default().with_deadline(Duration::from_secs(90));
        let value = serde_json::to_value(policy).unwrap();
        assert_eq!(value, json!({"maxAttempts": 30, "interval": 2000, "deadline": 90000}));
        let back: RetryPolicy = serde_json::from_value(json!({"maxAttempts": 5, "interval": 100})).unwrap();
        assert_eq!(back.deadline, None);
        assert_eq!(back.interval, Duration::from_millis(100));
    }
}
