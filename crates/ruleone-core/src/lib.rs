//! Core library for ruleone.
//!
//! This crate contains:
//! - Identifier resolution (tickers and ISINs)
//! - Source clients for Yahoo, Alpha Vantage and Zacks
//! - The fetch orchestrator that fans out, bounds and merges source calls
//! - The Rule #1 numeric engine and the valuation step
//! - The [`MetricsService`] façade and its configuration

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod merge;
pub mod orchestrator;
pub mod provider_policy;
pub mod resolver;
pub mod retry;
pub mod rule_one;
pub mod service;
pub mod source;
pub mod throttling;
pub mod valuation;

pub use adapters::{
    AlphaVantageSource, Upstream, YahooGrowthSource, YahooProfileSource, YahooSession,
    YahooSymbolSearch, ZacksGrowthSource,
};
pub use cache::CacheStore;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfigError, LogFormat, Settings};
pub use data_source::{
    BoxFuture, FundamentalsSource, HealthState, HealthStatus, SearchQuote, SourceError,
    SourceErrorKind, SymbolSearch,
};
pub use domain::{
    looks_like_isin, CompanyFundamentals, CompanyProfile, FinancialStatements, FragmentKind,
    FundamentalsFragment, GrowthEstimate, GrowthSource, IdentifierKind, MetricsRecord, Symbol,
    DEBT_EQUITY_UNAVAILABLE,
};
pub use error::ValidationError;
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
    StaticHttpClient,
};
pub use merge::{merge_fragments, SourcedFragment};
pub use orchestrator::{
    FetchFailure, FetchOrchestrator, FetchPhase, FetchReport, FetchSuccess, SourceOutcome,
    SourceReport,
};
pub use provider_policy::{BackoffPolicy, ProviderPolicy};
pub use resolver::{IdentifierResolver, Resolution};
pub use retry::{Backoff, RetryConfig};
pub use rule_one::CalculationError;
pub use service::{
    MetricsService, MetricsServiceBuilder, NotFound, NotFoundReason, ServiceContext, SourceStatus,
};
pub use source::ProviderId;
pub use throttling::ThrottlingQueue;
pub use valuation::build_metrics;
