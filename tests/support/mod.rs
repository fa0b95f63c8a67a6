//! Shared doubles for the integration suites: scripted sources and canned
//! upstream payloads for an imaginary company, ACME.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ruleone_core::{
    BoxFuture, CompanyProfile, FinancialStatements, FragmentKind, FundamentalsFragment,
    FundamentalsSource, GrowthEstimate, HealthStatus, HttpResponse, ProviderId, SourceError,
    StaticHttpClient, Symbol,
};

pub const ISIN: &str = "US0000000001";

pub fn symbol(ticker: &str) -> Symbol {
    Symbol::parse(ticker).expect("valid test symbol")
}

// ============================================================================
// Scripted sources
// ============================================================================

/// Tracks how many source fetches run at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Source returning a fixed result after an optional delay.
pub struct ScriptedSource {
    provider: ProviderId,
    kind: FragmentKind,
    result: Result<FundamentalsFragment, SourceError>,
    delay: Duration,
    health: HealthStatus,
    probe: Option<Arc<ConcurrencyProbe>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(
        provider: ProviderId,
        kind: FragmentKind,
        result: Result<FundamentalsFragment, SourceError>,
    ) -> Self {
        Self {
            provider,
            kind,
            result,
            delay: Duration::ZERO,
            health: HealthStatus::healthy(),
            probe: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn statements(provider: ProviderId, statements: FinancialStatements) -> Self {
        Self::new(
            provider,
            FragmentKind::Statements,
            Ok(FundamentalsFragment::Statements(statements)),
        )
    }

    pub fn profile(provider: ProviderId, profile: CompanyProfile) -> Self {
        Self::new(
            provider,
            FragmentKind::Profile,
            Ok(FundamentalsFragment::Profile(profile)),
        )
    }

    pub fn growth(provider: ProviderId, five_year_percent: f64) -> Self {
        let estimate = GrowthEstimate::new(provider, five_year_percent).expect("finite estimate");
        Self::new(
            provider,
            FragmentKind::GrowthEstimate,
            Ok(FundamentalsFragment::GrowthEstimate(estimate)),
        )
    }

    pub fn failing(provider: ProviderId, kind: FragmentKind, error: SourceError) -> Self {
        Self::new(provider, kind, Err(error))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl FundamentalsSource for ScriptedSource {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn kind(&self) -> FragmentKind {
        self.kind
    }

    fn fetch<'a>(
        &'a self,
        _symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(probe) = &self.probe {
                probe.enter();
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(probe) = &self.probe {
                probe.leave();
            }
            self.result.clone()
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
        Box::pin(async move { self.health })
    }
}

/// Six years of statements with equity doubling over five years.
pub fn acme_statements() -> FinancialStatements {
    FinancialStatements {
        revenue_per_share: vec![100.0, 110.0, 120.0, 130.0, 140.0, 150.0],
        equity_per_share: vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
        free_cash_flow_per_share: vec![10.0, 12.0, 14.0, 16.0, 18.0, 23.45],
        roic: vec![10.0, 12.0, 14.0, 16.0, 18.0, 20.0],
        annual_eps: BTreeMap::from([
            (2018, 1.0),
            (2019, 2.0),
            (2020, 4.0),
            (2021, 8.0),
            (2022, 16.0),
            (2023, 32.0),
        ]),
        quarterly_eps: vec![1.0, 1.25, 1.5, 2.0],
        trailing_twelve_month_eps: Some(5.75),
        total_debt: Some(4_690.0),
        last_year_net_income: Some(2_115.0),
        debt_equity_ratio: Some(4.69),
        shares_outstanding: Some(100.0),
        historical_eps_growth: Some(100.0),
        name: Some(String::from("Acme Overview")),
        ..FinancialStatements::default()
    }
}

pub fn acme_profile() -> CompanyProfile {
    CompanyProfile {
        name: Some(String::from("Acme Corporation")),
        description: Some(String::from("Makes everything.")),
        industry: Some(String::from("Conglomerates")),
        current_price: Some(25.0),
        average_volume: Some(1_234_567.0),
        market_cap: Some(17_680.0),
        shares_outstanding: Some(100.0),
        year_end_closes: BTreeMap::from([(2022, 240.0), (2023, 640.0)]),
    }
}

// ============================================================================
// Canned upstream payloads
// ============================================================================

pub const YAHOO_PROFILE: &str = r#"{"quoteSummary":{"result":[{
    "price":{"longName":"Acme Corporation","regularMarketPrice":{"raw":25.0},
             "marketCap":{"raw":17680},"averageDailyVolume3Month":{"raw":1234567}},
    "summaryProfile":{"longBusinessSummary":"Makes everything.","industry":"Conglomerates"},
    "defaultKeyStatistics":{"sharesOutstanding":{"raw":100}}
}],"error":null}}"#;

// 2022-12-01 and 2023-12-01 (UTC)
pub const YAHOO_CHART: &str = r#"{"chart":{"result":[{
    "timestamp":[1669852800,1701388800],
    "indicators":{"quote":[{"close":[240.0,640.0]}]}
}],"error":null}}"#;

pub const YAHOO_TREND: &str = r#"{"quoteSummary":{"result":[{"earningsTrend":{"trend":[
    {"period":"+1y","growth":{"raw":0.3}},
    {"period":"+5y","growth":{"raw":0.1}}
]}}],"error":null}}"#;

pub const YAHOO_SEARCH: &str = r#"{"quotes":[
    {"symbol":"ACME-F","quoteType":"MUTUALFUND","exchange":"NAS"},
    {"symbol":"ACME","quoteType":"EQUITY","exchange":"NYQ","shortname":"Acme"}
]}"#;

pub const AV_OVERVIEW: &str =
    r#"{"Name":"Acme Overview","Industry":"Widgets","SharesOutstanding":"100","MarketCapitalization":"17680"}"#;

pub const AV_INCOME: &str = r#"{"annualReports":[
    {"fiscalDateEnding":"2023-12-31","totalRevenue":"15000","netIncome":"2115","ebit":"2200"},
    {"fiscalDateEnding":"2022-12-31","totalRevenue":"14000","netIncome":"1800","ebit":"1900"},
    {"fiscalDateEnding":"2021-12-31","totalRevenue":"13000","netIncome":"1500","ebit":"1600"},
    {"fiscalDateEnding":"2020-12-31","totalRevenue":"12000","netIncome":"1200","ebit":"1300"},
    {"fiscalDateEnding":"2019-12-31","totalRevenue":"11000","netIncome":"900","ebit":"1000"},
    {"fiscalDateEnding":"2018-12-31","totalRevenue":"10000","netIncome":"600","ebit":"700"}
]}"#;

pub const AV_BALANCE: &str = r#"{"annualReports":[
    {"fiscalDateEnding":"2023-12-31","totalShareholderEquity":"1000","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"},
    {"fiscalDateEnding":"2022-12-31","totalShareholderEquity":"900","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"},
    {"fiscalDateEnding":"2021-12-31","totalShareholderEquity":"800","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"},
    {"fiscalDateEnding":"2020-12-31","totalShareholderEquity":"700","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"},
    {"fiscalDateEnding":"2019-12-31","totalShareholderEquity":"600","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"},
    {"fiscalDateEnding":"2018-12-31","totalShareholderEquity":"500","totalDebt":"4690","cashAndCashEquivalentsAtCarryingValue":"0"}
]}"#;

pub const AV_CASH_FLOW: &str = r#"{"annualReports":[
    {"fiscalDateEnding":"2023-12-31","operatingCashflow":"2845","capitalExpenditures":"500"},
    {"fiscalDateEnding":"2022-12-31","operatingCashflow":"2300","capitalExpenditures":"500"},
    {"fiscalDateEnding":"2021-12-31","operatingCashflow":"2100","capitalExpenditures":"500"},
    {"fiscalDateEnding":"2020-12-31","operatingCashflow":"1900","capitalExpenditures":"500"},
    {"fiscalDateEnding":"2019-12-31","operatingCashflow":"1700","capitalExpenditures":"500"},
    {"fiscalDateEnding":"2018-12-31","operatingCashflow":"1500","capitalExpenditures":"500"}
]}"#;

pub const AV_EARNINGS: &str = r#"{
    "annualEarnings":[
        {"fiscalDateEnding":"2023-12-31","reportedEPS":"32"},
        {"fiscalDateEnding":"2022-12-31","reportedEPS":"16"},
        {"fiscalDateEnding":"2021-12-31","reportedEPS":"8"},
        {"fiscalDateEnding":"2020-12-31","reportedEPS":"4"},
        {"fiscalDateEnding":"2019-12-31","reportedEPS":"2"},
        {"fiscalDateEnding":"2018-12-31","reportedEPS":"1"}
    ],
    "quarterlyEarnings":[
        {"fiscalDateEnding":"2023-12-31","reportedEPS":"2.0"},
        {"fiscalDateEnding":"2023-09-30","reportedEPS":"1.5"},
        {"fiscalDateEnding":"2023-06-30","reportedEPS":"1.25"},
        {"fiscalDateEnding":"2023-03-31","reportedEPS":"1.0"}
    ]}"#;

pub const ZACKS_PAGE: &str = r#"<html><body><table>
<tr><th>Growth Estimates</th><th>ACME</th></tr>
<tr><td>Current Qtr</td><td>25.00%</td></tr>
<tr><td>Next 5 Years</td>
<td class="alpha">12.00%</td></tr>
</table></body></html>"#;

fn yahoo_session(client: StaticHttpClient) -> StaticHttpClient {
    client.route("getcrumb", HttpResponse::ok("crumb42"))
}

fn alphavantage(client: StaticHttpClient) -> StaticHttpClient {
    client
        .route("function=OVERVIEW", HttpResponse::ok(AV_OVERVIEW))
        .route("function=INCOME_STATEMENT", HttpResponse::ok(AV_INCOME))
        .route("function=BALANCE_SHEET", HttpResponse::ok(AV_BALANCE))
        .route("function=CASH_FLOW", HttpResponse::ok(AV_CASH_FLOW))
        .route("function=EARNINGS", HttpResponse::ok(AV_EARNINGS))
}

/// Every upstream answers for ACME. Unmatched URLs get a 404.
pub fn acme_upstreams() -> StaticHttpClient {
    let client = yahoo_session(StaticHttpClient::new())
        .route("modules=price", HttpResponse::ok(YAHOO_PROFILE))
        .route("modules=earningsTrend", HttpResponse::ok(YAHOO_TREND))
        .route("/chart/ACME", HttpResponse::ok(YAHOO_CHART))
        .route("/v1/finance/search", HttpResponse::ok(YAHOO_SEARCH))
        .route("zacks.com/stock/quote/ACME/", HttpResponse::ok(ZACKS_PAGE));
    alphavantage(client)
}

/// Like [`acme_upstreams`] but Yahoo has no earnings trend.
pub fn acme_upstreams_without_yahoo_trend() -> StaticHttpClient {
    let client = yahoo_session(StaticHttpClient::new())
        .route("modules=price", HttpResponse::ok(YAHOO_PROFILE))
        .route("/chart/ACME", HttpResponse::ok(YAHOO_CHART))
        .route("/v1/finance/search", HttpResponse::ok(YAHOO_SEARCH))
        .route("zacks.com/stock/quote/ACME/", HttpResponse::ok(ZACKS_PAGE));
    alphavantage(client)
}

/// Only Alpha Vantage answers; Yahoo and Zacks get 404s.
pub fn statements_only_upstreams() -> StaticHttpClient {
    alphavantage(StaticHttpClient::new())
}
