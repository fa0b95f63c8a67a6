use std::time::Duration;

use crate::ProviderId;

/// Per-provider request budget and backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub request_timeout: Duration,
    pub retry_backoff: BackoffPolicy,
}

/// Backoff used while waiting for quota to refill.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl ProviderPolicy {
    /// Free tier is 5 requests per minute.
    pub fn alphavantage(quota_per_minute: u32) -> Self {
        Self {
            provider_id: ProviderId::Alphavantage,
            quota_window: Duration::from_secs(60),
            quota_limit: quota_per_minute,
            request_timeout: Duration::from_secs(10),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(8),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
