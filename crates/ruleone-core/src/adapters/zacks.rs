use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::Upstream;
use crate::data_source::{BoxFuture, FundamentalsSource, HealthStatus, SourceError};
use crate::http_client::HttpRequest;
use crate::{FragmentKind, FundamentalsFragment, GrowthEstimate, ProviderId, Symbol};

const ESTIMATES_URL: &str = "https://www.zacks.com/stock/quote";

/// Analyst five-year growth estimate scraped from the Zacks detailed
/// estimates page.
#[derive(Clone)]
pub struct ZacksGrowthSource {
    upstream: Upstream,
}

impl ZacksGrowthSource {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    async fn fetch_estimate(&self, symbol: &Symbol) -> Result<GrowthEstimate, SourceError> {
        let url = format!("{ESTIMATES_URL}/{symbol}/detailed-earning-estimates");
        let html = self.upstream.get_text(HttpRequest::get(url)).await?;

        let percent = next_five_years_estimate(&html).ok_or_else(|| {
            SourceError::not_found(format!("zacks page has no five-year estimate for {symbol}"))
        })?;
        debug!(%symbol, percent, "zacks growth estimate parsed");

        GrowthEstimate::new(ProviderId::Zacks, percent)
            .map_err(|error| SourceError::malformed(format!("zacks estimate rejected: {error}")))
    }
}

impl FundamentalsSource for ZacksGrowthSource {
    fn id(&self) -> ProviderId {
        ProviderId::Zacks
    }

    fn kind(&self) -> FragmentKind {
        FragmentKind::GrowthEstimate
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
        Box::pin(async move {
            self.fetch_estimate(symbol)
                .await
                .map(FundamentalsFragment::GrowthEstimate)
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Matches the "Next 5 Years" label, skips the markup that closes its cell,
/// and captures the first decimal of the following text run.
static NEXT_FIVE_YEARS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Next 5 Years(?:\s|&nbsp;|<[^>]*>)*[^<\d]*(\d+\.?\d*)").ok()
});

fn next_five_years_estimate(html: &str) -> Option<f64> {
    NEXT_FIVE_YEARS
        .as_ref()?
        .captures_iter(html)
        .find_map(|captures| captures.get(1)?.as_str().parse().ok())
}
