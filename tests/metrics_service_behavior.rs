//! End-to-end behavior of the metrics façade over the production sources,
//! with every upstream answered from canned payloads.

mod support;

use std::sync::Arc;
use std::time::Duration;

use ruleone_core::{
    CacheStore, FetchFailure, HttpResponse, IdentifierKind, MetricsRecord, MetricsService,
    NotFoundReason, ProviderId, ServiceContext, Settings, SourceOutcome, StaticHttpClient,
    DEBT_EQUITY_UNAVAILABLE,
};

use support::{
    acme_upstreams, acme_upstreams_without_yahoo_trend, statements_only_upstreams, ISIN,
};

fn settings() -> Settings {
    Settings {
        alphavantage_api_key: Some(String::from("demo")),
        http_max_retries: 0,
        alphavantage_quota_per_minute: 100,
        ..Settings::default()
    }
}

fn service(
    client: StaticHttpClient,
    cache_ttl: Duration,
) -> (MetricsService, Arc<StaticHttpClient>) {
    let client = Arc::new(client);
    let context = ServiceContext::new(client.clone(), CacheStore::new(cache_ttl));
    (
        MetricsService::builder(context).settings(settings()).build(),
        client,
    )
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value present");
    assert!(
        (actual - expected).abs() <= 0.011,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn when_all_sources_answer_system_returns_a_complete_record() {
    // Given: Yahoo, Alpha Vantage and Zacks all answering for ACME
    let (service, _) = service(acme_upstreams(), Duration::ZERO);

    // When: Metrics are requested by ticker
    let record = service.fetch_company_metrics("ACME").await.expect("record");

    // Then: Identity and profile fields come through
    assert_eq!(record.ticker, "ACME");
    assert_eq!(record.identifier, "ACME");
    assert_eq!(record.identifier_type, IdentifierKind::Ticker);
    assert!(record.identifier_resolution_succeeded);
    assert_eq!(record.name.as_deref(), Some("Acme Corporation"));
    assert_eq!(record.industry.as_deref(), Some("Conglomerates"));
    assert_eq!(record.current_price, Some(25.0));

    // Then: Growth and average sets follow the available history
    assert_eq!(record.eps, vec![100.0, 100.0, 100.0]);
    assert_eq!(record.sales.len(), 3);
    assert_eq!(record.equity.len(), 3);
    assert_eq!(record.cash.len(), 3);
    assert_eq!(record.roic.len(), 4);

    // Then: Cash, debt and valuation metrics are computed
    assert_eq!(record.total_debt, Some(4_690.0));
    assert_eq!(record.free_cash_flow, Some(2_345.0));
    assert_eq!(record.ten_cap_price, Some(234.5));
    assert_eq!(record.debt_payoff_time, Some(2.0));
    assert_eq!(record.debt_equity_ratio, 4.69);
    assert_eq!(record.pe_low, Some(15.0));
    assert_eq!(record.pe_high, Some(20.0));
    assert_eq!(record.five_year_growth_rate, Some(10.0));
    assert_eq!(record.growth_estimate_source.as_deref(), Some("yahoo"));
    assert_close(record.sticker_price, 64.51);
    assert_close(record.margin_of_safety_price, 32.26);
    assert_eq!(record.payback_time, Some(6));
    assert_eq!(record.max_position_shares, Some(12_345));
    assert_eq!(record.max_position_size, Some(308_625));
    assert!(record.degraded_sources.is_empty());
}

#[tokio::test]
async fn when_isin_is_given_system_resolves_then_fetches() {
    let (service, client) = service(acme_upstreams(), Duration::ZERO);

    let record = service.fetch_company_metrics(ISIN).await.expect("record");

    assert_eq!(record.ticker, "ACME");
    assert_eq!(record.identifier, ISIN);
    assert_eq!(record.identifier_type, IdentifierKind::Isin);
    assert!(record.identifier_resolution_succeeded);
    assert_eq!(client.request_count("/v1/finance/search"), 1);
}

#[tokio::test]
async fn when_yahoo_has_no_estimate_system_degrades_to_zacks() {
    // Given: Yahoo's earnings trend is missing
    let (service, _) = service(acme_upstreams_without_yahoo_trend(), Duration::ZERO);

    // When: Metrics are requested
    let record = service.fetch_company_metrics("ACME").await.expect("record");

    // Then: The Zacks estimate is used and Yahoo is flagged
    assert_eq!(record.five_year_growth_rate, Some(12.0));
    assert_eq!(record.growth_estimate_source.as_deref(), Some("zacks"));
    assert_eq!(record.degraded_sources, vec![ProviderId::Yahoo]);
    assert_eq!(record.payback_time, Some(6));
}

#[tokio::test]
async fn when_same_company_is_requested_twice_system_serves_from_cache() {
    // Given: A service with a live cache
    let (service, client) = service(acme_upstreams(), Duration::from_secs(300));

    // When: The ticker and then the ISIN are requested
    let by_ticker = service.fetch_company_metrics("ACME").await.expect("record");
    let by_isin = service.fetch_company_metrics(ISIN).await.expect("record");

    // Then: Alpha Vantage was called for the first request only
    assert_eq!(client.request_count("alphavantage.co"), 5);

    // Then: The cached record is relabeled with the caller's identifier
    assert_eq!(by_isin.identifier, ISIN);
    assert_eq!(by_isin.identifier_type, IdentifierKind::Isin);
    let relabeled = MetricsRecord {
        identifier: by_ticker.identifier.clone(),
        identifier_type: by_ticker.identifier_type,
        ..by_isin
    };
    assert_eq!(relabeled, by_ticker);
}

#[tokio::test]
async fn when_statements_are_unavailable_system_reports_not_found() {
    // Given: Alpha Vantage rejecting the symbol in-band
    let client = StaticHttpClient::new().route(
        "alphavantage.co",
        HttpResponse::ok(r#"{"Error Message":"Invalid API call."}"#),
    );
    let (service, _) = service(client, Duration::from_secs(300));

    // When: Metrics are requested
    let error = service.fetch_company_metrics("ZZZZ").await.expect_err("not found");

    // Then: The failure names the identifier and the critical source
    assert_eq!(error.to_string(), "data unavailable for this identifier: 'ZZZZ'");
    let NotFoundReason::Fetch(FetchFailure::CriticalSource {
        provider, outcome, ..
    }) = &error.reason
    else {
        panic!("critical source failure expected");
    };
    assert_eq!(*provider, ProviderId::Alphavantage);
    assert!(matches!(outcome, SourceOutcome::Failed(_)));
}

#[tokio::test]
async fn when_isin_cannot_be_resolved_system_reports_not_found() {
    let client = StaticHttpClient::new()
        .route("/v1/finance/search", HttpResponse::ok(r#"{"quotes":[]}"#));
    let (service, client) = service(client, Duration::ZERO);

    let error = service.fetch_company_metrics(ISIN).await.expect_err("unresolved");

    assert!(matches!(error.reason, NotFoundReason::Resolution));
    assert_eq!(client.request_count("alphavantage.co"), 0);
}

#[tokio::test]
async fn when_profile_is_missing_system_still_values_from_statements() {
    // Given: Only Alpha Vantage answers
    let client = statements_only_upstreams();
    let (service, _) = service(client, Duration::ZERO);

    // When: Metrics are requested
    let record = service.fetch_company_metrics("ACME").await.expect("record");

    // Then: Statement metrics are present, price-based ones are empty
    assert_eq!(record.name.as_deref(), Some("Acme Overview"));
    assert_eq!(record.current_price, None);
    assert_eq!(record.max_position_size, None);
    assert_eq!(record.pe_low, None);
    assert_eq!(record.sticker_price, None);
    assert_eq!(record.growth_estimate_source.as_deref(), Some("historical_eps"));
    assert_eq!(record.free_cash_flow, Some(2_345.0));
    assert_ne!(record.debt_equity_ratio, DEBT_EQUITY_UNAVAILABLE);
    assert_eq!(
        record.degraded_sources,
        vec![ProviderId::Yahoo, ProviderId::Zacks]
    );
}
