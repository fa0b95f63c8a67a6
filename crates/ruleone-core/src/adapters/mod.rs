//! Upstream source clients.
//!
//! | Source | Provider | Fragment |
//! |--------|----------|----------|
//! | [`YahooProfileSource`] | Yahoo | profile + year-end closes |
//! | [`YahooGrowthSource`] | Yahoo | `+5y` earnings trend |
//! | [`AlphaVantageSource`] | Alpha Vantage | financial statements (critical) |
//! | [`ZacksGrowthSource`] | Zacks | "Next 5 Years" estimate |
//! | [`YahooSymbolSearch`] | Yahoo | ISIN / free-text listing search |

mod alphavantage;
mod yahoo;
mod zacks;

use std::sync::Arc;

use serde::de::DeserializeOwned;

pub use alphavantage::AlphaVantageSource;
pub use yahoo::{YahooGrowthSource, YahooProfileSource, YahooSession, YahooSymbolSearch};
pub use zacks::ZacksGrowthSource;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{HealthStatus, SourceError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::ProviderId;

/// Transport shared by every source of one provider: HTTP client, retry
/// budget and circuit breaker.
#[derive(Clone)]
pub struct Upstream {
    provider: ProviderId,
    http: Arc<dyn HttpClient>,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    timeout_ms: u64,
}

impl Upstream {
    pub fn new(provider: ProviderId, http: Arc<dyn HttpClient>, retry: RetryConfig) -> Self {
        Self {
            provider,
            http,
            retry,
            breaker: Arc::new(CircuitBreaker::with_defaults(provider)),
            timeout_ms: 10_000,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn health(&self) -> HealthStatus {
        self.breaker.health()
    }

    /// Single attempt outside the retry policy and breaker, for session setup
    /// calls whose status is irrelevant.
    async fn touch(&self, request: HttpRequest) {
        let request = request.with_timeout_ms(self.timeout_ms);
        let _ = self.http.execute(request).await;
    }

    /// Sends `request` with retries. Transport failures, 429 and 5xx count
    /// against the breaker; any other status is returned to the caller.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        if !self.breaker.allow_request() {
            return Err(SourceError::unavailable(format!(
                "{} circuit breaker is open; skipping upstream call",
                self.provider
            )));
        }

        let request = request.with_timeout_ms(self.timeout_ms);
        let response = match execute_with_retry(self.http.as_ref(), &request, &self.retry).await {
            Ok(response) => response,
            Err(error) => {
                self.breaker.record_failure();
                return Err(error.into_source_error(self.provider.as_str()));
            }
        };

        if response.status == 429 || response.status >= 500 {
            self.breaker.record_failure();
        } else {
            self.breaker.record_success();
        }
        Ok(response)
    }

    /// Sends `request` and returns the body of a 2xx response.
    async fn get_text(&self, request: HttpRequest) -> Result<String, SourceError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(self.provider, response.status));
        }
        Ok(response.body)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, SourceError> {
        let body = self.get_text(request).await?;
        parse_json(self.provider, &body)
    }
}

fn status_error(provider: ProviderId, status: u16) -> SourceError {
    let message = format!("{provider} returned status {status}");
    match status {
        404 => SourceError::not_found(message),
        429 => SourceError::rate_limited(message),
        400..=499 => SourceError::invalid_request(message),
        _ => SourceError::unavailable(message),
    }
}

fn parse_json<T: DeserializeOwned>(provider: ProviderId, body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|error| {
        SourceError::malformed(format!("failed to parse {provider} response: {error}"))
    })
}

/// Yahoo wraps most numbers as `{"raw": 1.0, "fmt": "1.00"}`.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl RawValue {
    fn value(self) -> Option<f64> {
        self.raw.filter(|value| value.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::data_source::{BoxFuture, SourceErrorKind};
    use crate::http_client::HttpError;

    struct FixedStatus {
        status: u16,
        calls: Mutex<u32>,
    }

    impl HttpClient for FixedStatus {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                *self.calls.lock().expect("lock") += 1;
                Ok(HttpResponse::new(self.status, "{}"))
            })
        }
    }

    fn upstream(status: u16) -> (Upstream, Arc<FixedStatus>) {
        let http = Arc::new(FixedStatus {
            status,
            calls: Mutex::new(0),
        });
        let upstream = Upstream::new(ProviderId::Zacks, http.clone(), RetryConfig::no_retry())
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(
                ProviderId::Zacks,
                CircuitBreakerConfig {
                    failure_threshold: 2,
                    open_timeout: std::time::Duration::from_secs(60),
                },
            )));
        (upstream, http)
    }

    #[tokio::test]
    async fn server_errors_trip_the_breaker_and_block_further_calls() {
        let (upstream, http) = upstream(503);

        for _ in 0..2 {
            let error = upstream
                .get_text(HttpRequest::get("https://x.test"))
                .await
                .expect_err("503 fails");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        }
        assert_eq!(upstream.breaker().state(), CircuitState::Open);

        let error = upstream
            .get_text(HttpRequest::get("https://x.test"))
            .await
            .expect_err("circuit open");
        assert!(error.message().contains("circuit breaker is open"));
        assert_eq!(*http.calls.lock().expect("lock"), 2);
    }

    #[tokio::test]
    async fn not_found_does_not_count_as_provider_failure() {
        let (upstream, _) = upstream(404);

        let error = upstream
            .get_text(HttpRequest::get("https://x.test"))
            .await
            .expect_err("404 fails");

        assert_eq!(error.kind(), SourceErrorKind::NotFound);
        assert_eq!(upstream.breaker().consecutive_failures(), 0);
    }

    #[test]
    fn malformed_json_is_reported_as_malformed() {
        let error = parse_json::<RawValue>(ProviderId::Yahoo, "<html>").expect_err("not json");
        assert_eq!(error.kind(), SourceErrorKind::Malformed);
    }
}
