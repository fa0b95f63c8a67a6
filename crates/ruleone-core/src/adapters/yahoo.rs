use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{parse_json, status_error, RawValue, Upstream};
use crate::data_source::{
    BoxFuture, FundamentalsSource, HealthStatus, SearchQuote, SourceError, SymbolSearch,
};
use crate::http_client::HttpRequest;
use crate::rule_one::round2;
use crate::{
    CompanyProfile, FragmentKind, FundamentalsFragment, GrowthEstimate, ProviderId, Symbol,
};

const REFERER: &str = "https://finance.yahoo.com/";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";

const PROFILE_MODULES: &str = "price,summaryProfile,summaryDetail,defaultKeyStatistics";
const GROWTH_MODULES: &str = "earningsTrend";
const FIVE_YEAR_PERIOD: &str = "+5y";

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

/// Yahoo cookie + crumb session shared by every Yahoo source.
///
/// The session cookie lands in the transport's cookie jar; the crumb is
/// passed as a query parameter. Concurrent callers wait on one refresh.
#[derive(Debug)]
pub struct YahooSession {
    crumb: Mutex<Option<CachedCrumb>>,
    ttl: Duration,
}

impl Default for YahooSession {
    fn default() -> Self {
        Self {
            crumb: Mutex::new(None),
            ttl: Duration::from_secs(3_600),
        }
    }
}

impl YahooSession {
    async fn crumb(&self, upstream: &Upstream) -> Result<String, SourceError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            if crumb.fetched_at.elapsed() < self.ttl {
                return Ok(crumb.value.clone());
            }
        }

        let value = Self::fetch_crumb(upstream).await?;
        *cached = Some(CachedCrumb {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    async fn invalidate(&self) {
        *self.crumb.lock().await = None;
    }

    async fn fetch_crumb(upstream: &Upstream) -> Result<String, SourceError> {
        upstream
            .touch(HttpRequest::get(COOKIE_URL).with_header("referer", REFERER))
            .await;

        for url in CRUMB_URLS {
            let request = HttpRequest::get(url).with_header("referer", REFERER);
            match upstream.get_text(request).await {
                Ok(body) => {
                    let crumb = body.trim();
                    if is_plausible_crumb(crumb) {
                        return Ok(crumb.to_owned());
                    }
                    if crumb.to_ascii_lowercase().contains("too many requests") {
                        return Err(SourceError::rate_limited(
                            "yahoo rate limited while fetching crumb",
                        ));
                    }
                }
                Err(error) => debug!(%url, %error, "crumb endpoint failed"),
            }
        }

        Err(SourceError::unavailable(
            "failed to fetch yahoo crumb from all endpoints",
        ))
    }
}

fn is_plausible_crumb(value: &str) -> bool {
    !value.is_empty()
        && value.len() < 100
        && !value.contains(char::is_whitespace)
        && !value.contains('<')
}

/// Fetches quoteSummary modules, refreshing the crumb once on 401.
async fn quote_summary(
    upstream: &Upstream,
    session: &YahooSession,
    symbol: &Symbol,
    modules: &str,
) -> Result<QuoteSummaryResult, SourceError> {
    let request_for = |crumb: &str| {
        HttpRequest::get(format!(
            "{QUOTE_SUMMARY_URL}/{}",
            urlencoding::encode(symbol.as_str())
        ))
        .with_query("modules", modules)
        .with_query("crumb", crumb)
        .with_header("referer", REFERER)
    };

    let crumb = session.crumb(upstream).await?;
    let mut response = upstream.send(request_for(&crumb)).await?;
    if response.status == 401 {
        session.invalidate().await;
        let crumb = session.crumb(upstream).await?;
        response = upstream.send(request_for(&crumb)).await?;
    }
    if !response.is_success() {
        return Err(status_error(ProviderId::Yahoo, response.status));
    }

    let envelope: QuoteSummaryResponse = parse_json(ProviderId::Yahoo, &response.body)?;
    if let Some(error) = envelope.quote_summary.error.filter(|error| !error.is_null()) {
        return Err(SourceError::not_found(format!(
            "yahoo quoteSummary error for {symbol}: {error}"
        )));
    }
    envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SourceError::not_found(format!("yahoo has no summary for {symbol}")))
}

// ============================================================================
// Profile source
// ============================================================================

/// Company profile from quoteSummary plus year-end closes from the monthly chart.
#[derive(Clone)]
pub struct YahooProfileSource {
    upstream: Upstream,
    session: Arc<YahooSession>,
}

impl YahooProfileSource {
    pub fn new(upstream: Upstream, session: Arc<YahooSession>) -> Self {
        Self { upstream, session }
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<CompanyProfile, SourceError> {
        let summary = quote_summary(&self.upstream, &self.session, symbol, PROFILE_MODULES).await?;
        let mut profile = summary.into_profile();

        match self.year_end_closes(symbol).await {
            Ok(closes) => profile.year_end_closes = closes,
            Err(error) => warn!(%symbol, %error, "yahoo price history unavailable"),
        }
        Ok(profile)
    }

    async fn year_end_closes(&self, symbol: &Symbol) -> Result<BTreeMap<i32, f64>, SourceError> {
        let request = HttpRequest::get(format!(
            "{CHART_URL}/{}",
            urlencoding::encode(symbol.as_str())
        ))
        .with_query("range", "6y")
        .with_query("interval", "1mo")
        .with_header("referer", REFERER);

        let chart: ChartResponse = self.upstream.get_json(request).await?;
        if let Some(error) = chart.chart.error.filter(|error| !error.is_null()) {
            return Err(SourceError::not_found(format!("yahoo chart error: {error}")));
        }
        let result = chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::malformed("no chart data in yahoo response"))?;
        Ok(result.year_end_closes())
    }
}

impl FundamentalsSource for YahooProfileSource {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn kind(&self) -> FragmentKind {
        FragmentKind::Profile
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
        Box::pin(async move {
            self.fetch_profile(symbol)
                .await
                .map(FundamentalsFragment::Profile)
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
        Box::pin(async move { self.upstream.health() })
    }
}

// ============================================================================
// Growth estimate source
// ============================================================================

/// Analyst five-year growth from the `earningsTrend` module.
#[derive(Clone)]
pub struct YahooGrowthSource {
    upstream: Upstream,
    session: Arc<YahooSession>,
}

impl YahooGrowthSource {
    pub fn new(upstream: Upstream, session: Arc<YahooSession>) -> Self {
        Self { upstream, session }
    }
}

impl FundamentalsSource for YahooGrowthSource {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn kind(&self) -> FragmentKind {
        FragmentKind::GrowthEstimate
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
        Box::pin(async move {
            let summary =
                quote_summary(&self.upstream, &self.session, symbol, GROWTH_MODULES).await?;
            let growth = summary
                .five_year_growth()
                .ok_or_else(|| SourceError::not_found(format!("no +5y estimate for {symbol}")))?;
            let estimate = GrowthEstimate::new(ProviderId::Yahoo, round2(growth * 100.0))
                .map_err(|error| SourceError::malformed(error.to_string()))?;
            Ok(FundamentalsFragment::GrowthEstimate(estimate))
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
        Box::pin(async move { self.upstream.health() })
    }
}

// ============================================================================
// Symbol search
// ============================================================================

#[derive(Clone)]
pub struct YahooSymbolSearch {
    upstream: Upstream,
}

impl YahooSymbolSearch {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

impl SymbolSearch for YahooSymbolSearch {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchQuote>, SourceError>> {
        Box::pin(async move {
            let query = query.trim();
            if query.is_empty() {
                return Err(SourceError::invalid_request("search query must not be empty"));
            }

            let request = HttpRequest::get(SEARCH_URL)
                .with_query("q", query)
                .with_query("quotesCount", &limit.to_string())
                .with_query("newsCount", "0");
            let response: SearchResponse = self.upstream.get_json(request).await?;

            Ok(response
                .quotes
                .into_iter()
                .map(|quote| SearchQuote {
                    symbol: quote.symbol.unwrap_or_default(),
                    quote_type: quote.quote_type,
                    exchange: quote.exchange,
                    short_name: quote.short_name,
                })
                .take(limit)
                .collect())
        })
    }
}

// ============================================================================
// Wire structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(rename = "summaryProfile", default)]
    summary_profile: Option<SummaryProfileModule>,
    #[serde(rename = "summaryDetail", default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(rename = "defaultKeyStatistics", default)]
    key_statistics: Option<KeyStatisticsModule>,
    #[serde(rename = "earningsTrend", default)]
    earnings_trend: Option<EarningsTrendModule>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceModule {
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: Option<RawValue>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<RawValue>,
    #[serde(rename = "averageDailyVolume3Month", default)]
    average_daily_volume_3_month: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryProfileModule {
    #[serde(rename = "longBusinessSummary", default)]
    long_business_summary: Option<String>,
    #[serde(default)]
    industry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryDetailModule {
    #[serde(rename = "averageVolume", default)]
    average_volume: Option<RawValue>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct KeyStatisticsModule {
    #[serde(rename = "sharesOutstanding", default)]
    shares_outstanding: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct EarningsTrendModule {
    #[serde(default)]
    trend: Vec<TrendEntry>,
}

#[derive(Debug, Deserialize)]
struct TrendEntry {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    growth: Option<RawValue>,
}

impl QuoteSummaryResult {
    fn into_profile(self) -> CompanyProfile {
        let price = self.price.unwrap_or_default();
        let summary_profile = self.summary_profile.unwrap_or_default();
        let detail = self.summary_detail.unwrap_or_default();
        let statistics = self.key_statistics.unwrap_or_default();

        CompanyProfile {
            name: non_empty(price.long_name).or_else(|| non_empty(price.short_name)),
            description: non_empty(summary_profile.long_business_summary),
            industry: non_empty(summary_profile.industry),
            current_price: price.regular_market_price.and_then(RawValue::value),
            average_volume: price
                .average_daily_volume_3_month
                .and_then(RawValue::value)
                .or_else(|| detail.average_volume.and_then(RawValue::value)),
            market_cap: price
                .market_cap
                .and_then(RawValue::value)
                .or_else(|| detail.market_cap.and_then(RawValue::value)),
            shares_outstanding: statistics.shares_outstanding.and_then(RawValue::value),
            year_end_closes: BTreeMap::new(),
        }
    }

    fn five_year_growth(&self) -> Option<f64> {
        self.earnings_trend
            .as_ref()?
            .trend
            .iter()
            .find(|entry| entry.period.as_deref() == Some(FIVE_YEAR_PERIOD))?
            .growth
            .and_then(RawValue::value)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResult {
    /// Last close seen in each calendar year. Timestamps are chronological.
    fn year_end_closes(&self) -> BTreeMap<i32, f64> {
        let Some(quote) = self.indicators.quote.first() else {
            return BTreeMap::new();
        };

        self.timestamp
            .iter()
            .zip(&quote.close)
            .filter_map(|(timestamp, close)| {
                let year = time::OffsetDateTime::from_unix_timestamp(*timestamp)
                    .ok()?
                    .year();
                Some((year, (*close)?))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuoteWire>,
}

#[derive(Debug, Deserialize)]
struct SearchQuoteWire {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(rename = "quoteType", default)]
    quote_type: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(rename = "shortname", default)]
    short_name: Option<String>,
}
