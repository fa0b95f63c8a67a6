//! Source client contracts.
//!
//! Every upstream provider implements [`FundamentalsSource`] and returns one
//! [`FundamentalsFragment`] per fetch. Failures are [`SourceError`] values; a
//! source never panics on bad upstream data.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`FundamentalsSource`] | Fetch one fragment kind for a symbol |
//! | [`SymbolSearch`] | Look up listings for a free-text query or ISIN |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{FragmentKind, FundamentalsFragment, ProviderId, Symbol};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Health state reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime source health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    pub const fn is_available(self) -> bool {
        !matches!(self.state, HealthState::Unhealthy)
    }

    pub const fn label(self) -> &'static str {
        if !self.rate_available {
            return "rate_limited";
        }
        match self.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    NotFound,
    Malformed,
    Timeout,
    Internal,
}

/// Structured source error recorded in the fetch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message, true)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message, false)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message, false)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Malformed, message, false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message, true)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message, false)
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// One listing returned by a symbol search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuote {
    pub symbol: String,
    pub quote_type: Option<String>,
    pub exchange: Option<String>,
    pub short_name: Option<String>,
}

/// Source client contract.
///
/// `fetch` may perform several sequential upstream calls (session setup, then
/// data) but resolves to exactly one fragment of [`kind`](Self::kind).
pub trait FundamentalsSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn kind(&self) -> FragmentKind;

    /// Whether the request fails when this source does.
    fn critical(&self) -> bool {
        self.kind() == FragmentKind::Statements
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>>;

    /// Reports `Unhealthy` while the source's circuit is open.
    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus>;
}

/// Listing search used to map ISINs to tickers.
pub trait SymbolSearch: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchQuote>, SourceError>>;
}
