//! Contract every production source must honor, checked against canned
//! upstreams.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use ruleone_core::{
    AlphaVantageSource, CircuitBreaker, CircuitBreakerConfig, FragmentKind, FundamentalsSource,
    HealthState, ProviderId, ProviderPolicy, RetryConfig, SourceErrorKind, StaticHttpClient,
    Upstream, YahooGrowthSource, YahooProfileSource, YahooSession, ZacksGrowthSource,
};

use support::{acme_upstreams, symbol};

struct SourceCase {
    name: &'static str,
    source: Arc<dyn FundamentalsSource>,
    kind: FragmentKind,
    critical: bool,
}

fn cases_with(client: StaticHttpClient, tripped: bool) -> Vec<SourceCase> {
    let client = Arc::new(client);
    let upstream = |provider| {
        let upstream = Upstream::new(provider, client.clone(), RetryConfig::no_retry());
        if !tripped {
            return upstream;
        }
        let breaker = CircuitBreaker::new(
            provider,
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_timeout: Duration::from_secs(600),
            },
        );
        breaker.record_failure();
        upstream.with_circuit_breaker(Arc::new(breaker))
    };
    let yahoo = upstream(ProviderId::Yahoo);
    let session = Arc::new(YahooSession::default());

    vec![
        SourceCase {
            name: "yahoo profile",
            source: Arc::new(YahooProfileSource::new(yahoo.clone(), Arc::clone(&session))),
            kind: FragmentKind::Profile,
            critical: false,
        },
        SourceCase {
            name: "yahoo growth",
            source: Arc::new(YahooGrowthSource::new(yahoo, session)),
            kind: FragmentKind::GrowthEstimate,
            critical: false,
        },
        SourceCase {
            name: "alphavantage statements",
            source: Arc::new(AlphaVantageSource::new(
                upstream(ProviderId::Alphavantage),
                Some(String::from("demo")),
                &ProviderPolicy::alphavantage(100),
            )),
            kind: FragmentKind::Statements,
            critical: true,
        },
        SourceCase {
            name: "zacks growth",
            source: Arc::new(ZacksGrowthSource::new(upstream(ProviderId::Zacks))),
            kind: FragmentKind::GrowthEstimate,
            critical: false,
        },
    ]
}

fn cases(client: StaticHttpClient) -> Vec<SourceCase> {
    cases_with(client, false)
}

#[tokio::test]
async fn every_source_returns_the_fragment_kind_it_declares() {
    for case in cases(acme_upstreams()) {
        let fragment = case
            .source
            .fetch(&symbol("ACME"))
            .await
            .unwrap_or_else(|error| panic!("{}: fetch failed: {error}", case.name));

        assert_eq!(case.source.kind(), case.kind, "{}: declared kind", case.name);
        assert_eq!(fragment.kind(), case.kind, "{}: fragment kind", case.name);
    }
}

#[test]
fn only_statements_are_critical() {
    for case in cases(StaticHttpClient::new()) {
        assert_eq!(case.source.critical(), case.critical, "{}", case.name);
    }
}

#[tokio::test]
async fn unknown_symbols_fail_with_a_structured_error() {
    // Given: Upstreams that know nothing
    for case in cases(StaticHttpClient::new()) {
        // When: A symbol is fetched
        let error = case
            .source
            .fetch(&symbol("ZZZZ"))
            .await
            .expect_err("nothing to return");

        // Then: The error is classified, not a panic or an empty fragment
        assert!(error.code().starts_with("source."), "{}: {error}", case.name);
        assert!(!error.message().is_empty(), "{}", case.name);
    }
}

#[tokio::test]
async fn fresh_sources_report_healthy() {
    for case in cases(StaticHttpClient::new()) {
        let health = case.source.health().await;
        assert_eq!(health.state, HealthState::Healthy, "{}", case.name);
        assert!(health.is_available(), "{}", case.name);
    }
}

#[tokio::test]
async fn open_circuits_report_unhealthy_and_refuse_upstream_calls() {
    // Given: Every provider's breaker already open
    for case in cases_with(acme_upstreams(), true) {
        // When: Health is checked and a fetch is attempted
        let health = case.source.health().await;
        let error = case
            .source
            .fetch(&symbol("ACME"))
            .await
            .expect_err("circuit open");

        // Then: The source is unavailable without reaching the data endpoint
        assert_eq!(health.state, HealthState::Unhealthy, "{}", case.name);
        assert_eq!(error.kind(), SourceErrorKind::Unavailable, "{}", case.name);
    }
}
