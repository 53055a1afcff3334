//! Per-farm sliding-window limit on forecast fetches.

use std::collections::VecDeque;
use std::sync::Arc;

use agritrace_common::FarmId;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

use crate::error::{EwsError, EwsResult};

/// Sliding-log limiter keyed by farm.
///
/// A fetch at `now` is admitted while fewer than `max_requests` earlier
/// fetches for the same farm fall inside `(now - window, now]`.
#[derive(Debug)]
pub struct FetchLimiter {
    window: Duration,
    max_requests: usize,
    log: DashMap<FarmId, VecDeque<DateTime<Utc>>>,
}

impl FetchLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            log: DashMap::new(),
        }
    }

    /// Record a fetch for `farm_id`, or reject it without recording.
    pub fn try_acquire(&self, farm_id: &FarmId, now: DateTime<Utc>) -> EwsResult<()> {
        let mut entry = self.log.entry(farm_id.clone()).or_default();
        let history = entry.value_mut();
        self.expire(history, now);

        if history.len() >= self.max_requests {
            let retry_after_secs = history
                .front()
                .map(|oldest| (*oldest + self.window - now).num_seconds().max(1))
                .unwrap_or(1);
            warn!(
                farm_id = %farm_id,
                max_requests = self.max_requests,
                retry_after_secs,
                "Forecast fetch rate limited"
            );
            return Err(EwsError::RateLimitExceeded {
                farm_id: farm_id.clone(),
                retry_after_secs,
            });
        }

        history.push_back(now);
        Ok(())
    }

    /// Fetches still available to `farm_id` at `now`.
    pub fn remaining(&self, farm_id: &FarmId, now: DateTime<Utc>) -> usize {
        let used = self
            .log
            .get(farm_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|at| now.signed_duration_since(**at) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }

    /// Drop farms with no fetch inside the window.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.log.retain(|_, history| {
            history
                .back()
                .map(|last| now.signed_duration_since(*last) < self.window)
                .unwrap_or(false)
        });
    }

    pub fn tracked_farms(&self) -> usize {
        self.log.len()
    }

    fn expire(&self, history: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = history.front() {
            if now.signed_duration_since(*oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Limiter shared by every adapter in the process.
pub type SharedFetchLimiter = Arc<FetchLimiter>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn farm() -> FarmId {
        FarmId::new("farm-1")
    }

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = FetchLimiter::new(Duration::minutes(30), 3);
        let now = Utc::now();

        for _ in 0..3 {
            assert!(limiter.try_acquire(&farm(), now).is_ok());
        }
        let err = limiter.try_acquire(&farm(), now).unwrap_err();
        assert!(matches!(
            err,
            EwsError::RateLimitExceeded { retry_after_secs: 1800, .. }
        ));
        assert_eq!(limiter.remaining(&farm(), now), 0);
    }

    #[test]
    fn test_window_slides() {
        let limiter = FetchLimiter::new(Duration::minutes(30), 2);
        let start = Utc::now();

        limiter.try_acquire(&farm(), start).unwrap();
        limiter
            .try_acquire(&farm(), start + Duration::minutes(10))
            .unwrap();
        assert!(limiter
            .try_acquire(&farm(), start + Duration::minutes(29))
            .is_err());

        // The first fetch leaves the window at exactly 30 minutes.
        assert!(limiter
            .try_acquire(&farm(), start + Duration::minutes(30))
            .is_ok());
    }

    #[test]
    fn test_farms_are_independent() {
        let limiter = FetchLimiter::new(Duration::minutes(30), 1);
        let now = Utc::now();

        limiter.try_acquire(&farm(), now).unwrap();
        assert!(limiter.try_acquire(&FarmId::new("farm-2"), now).is_ok());
        assert!(limiter.try_acquire(&farm(), now).is_err());
    }

    #[test]
    fn test_prune_drops_idle_farms() {
        let limiter = FetchLimiter::new(Duration::minutes(30), 1);
        let now = Utc::now();
        limiter
            .try_acquire(&farm(), now - Duration::hours(1))
            .unwrap();
        limiter.try_acquire(&FarmId::new("farm-2"), now).unwrap();

        limiter.prune(now);
        assert_eq!(limiter.tracked_farms(), 1);
    }

    proptest! {
        #[test]
        fn prop_never_more_than_max_in_any_window(
            mut offsets in proptest::collection::vec(0i64..7200, 1..60),
            max in 1usize..6,
        ) {
            offsets.sort_unstable();
            let window = Duration::minutes(30);
            let limiter = FetchLimiter::new(window, max);
            let start = Utc::now();

            let admitted: Vec<i64> = offsets
                .into_iter()
                .filter(|offset| limiter.try_acquire(&farm(), start + Duration::seconds(*offset)).is_ok())
                .collect();

            for at in &admitted {
                let in_window = admitted
                    .iter()
                    .filter(|other| **other <= *at && *at - **other < window.num_seconds())
                    .count();
                prop_assert!(in_window <= max);
            }
        }
    }
}
