use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::provider_policy::{BackoffPolicy, ProviderPolicy};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Quota gate for one provider. Requests over budget are buffered and told
/// how long to back off before trying again.
#[derive(Clone)]
pub struct ThrottlingQueue {
    limiter: Arc<DirectRateLimiter>,
    pending: Arc<Mutex<VecDeque<PendingRequest>>>,
    retry_backoff: BackoffPolicy,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    retry_count: u32,
}

impl ThrottlingQueue {
    pub fn new(quota_window: Duration, quota_limit: u32, retry_backoff: BackoffPolicy) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            retry_backoff,
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(
            policy.quota_window,
            policy.quota_limit,
            policy.retry_backoff.clone(),
        )
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes one unit of budget, or buffers the request and returns the delay
    /// to wait before retrying.
    pub fn acquire(&self) -> Result<(), Duration> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        self.pending().push_back(PendingRequest { retry_count: 0 });
        Err(self.retry_delay(0).unwrap_or(self.retry_backoff.max_delay))
    }

    /// Bumps the oldest buffered request and returns its next delay, or `None`
    /// once its retries are spent.
    pub fn register_retry(&self) -> Option<Duration> {
        let mut pending = self.pending();
        let request = pending.front_mut()?;
        request.retry_count = request.retry_count.saturating_add(1);
        self.retry_delay(request.retry_count)
    }

    pub fn complete_one(&self) {
        let _ = self.pending().pop_front();
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    pub fn retry_delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count > self.retry_backoff.max_retries {
            return None;
        }

        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let backoff = &self.retry_backoff;
        let seconds = backoff.initial_delay.as_secs_f64() * backoff.multiplier.powi(exponent);
        let capped = seconds.min(self.retry_backoff.max_delay.as_secs_f64());
        Some(Duration::from_secs_f64(capped))
    }

    /// Waits for budget within the backoff allowance. Returns false when the
    /// allowance runs out first.
    pub async fn wait_for_budget(&self) -> bool {
        let Err(mut delay) = self.acquire() else {
            return true;
        };

        loop {
            debug!(delay_ms = delay.as_millis() as u64, "quota exhausted, backing off");
            tokio::time::sleep(delay).await;
            if self.limiter.check().is_ok() {
                self.complete_one();
                return true;
            }
            match self.register_retry() {
                Some(next) => delay = next,
                None => {
                    self.complete_one();
                    return false;
                }
            }
        }
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
