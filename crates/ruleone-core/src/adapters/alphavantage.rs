use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{parse_json, Upstream};
use crate::data_source::{BoxFuture, FundamentalsSource, HealthStatus, SourceError};
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::rule_one::{self, round2};
use crate::throttling::ThrottlingQueue;
use crate::{FinancialStatements, FragmentKind, FundamentalsFragment, ProviderId, Symbol};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Annual statements, earnings and company overview from Alpha Vantage.
///
/// One fetch issues five sequential calls, each gated by the provider quota.
#[derive(Clone)]
pub struct AlphaVantageSource {
    upstream: Upstream,
    api_key: Option<String>,
    throttle: ThrottlingQueue,
}

impl AlphaVantageSource {
    /// The policy sets both the request quota and the per-call timeout.
    pub fn new(upstream: Upstream, api_key: Option<String>, policy: &ProviderPolicy) -> Self {
        Self {
            upstream: upstream.with_timeout_ms(policy.request_timeout_ms()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            throttle: ThrottlingQueue::from_policy(policy),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        symbol: &Symbol,
        api_key: &str,
    ) -> Result<T, SourceError> {
        if !self.throttle.wait_for_budget().await {
            return Err(SourceError::rate_limited(
                "alphavantage quota exhausted; request not sent",
            ));
        }

        let request = HttpRequest::get(BASE_URL)
            .with_query("function", function)
            .with_query("symbol", symbol.as_str())
            .with_query("apikey", api_key);
        let body = self.upstream.get_text(request).await?;
        decode_payload(function, &body)
    }

    async fn fetch_statements(&self, symbol: &Symbol) -> Result<FinancialStatements, SourceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SourceError::invalid_request("alphavantage api key is not configured")
        })?;

        let overview: Overview = self.call("OVERVIEW", symbol, api_key).await?;
        let income: AnnualReports<IncomeReport> =
            self.call("INCOME_STATEMENT", symbol, api_key).await?;
        let balance: AnnualReports<BalanceReport> =
            self.call("BALANCE_SHEET", symbol, api_key).await?;
        let cash_flow: AnnualReports<CashFlowReport> =
            self.call("CASH_FLOW", symbol, api_key).await?;
        let earnings: Earnings = self.call("EARNINGS", symbol, api_key).await?;

        if income.annual_reports.is_empty() && earnings.annual_earnings.is_empty() {
            return Err(SourceError::not_found(format!(
                "alphavantage has no statements for {symbol}"
            )));
        }

        let statements = build_statements(overview, income, balance, cash_flow, earnings);
        debug!(
            %symbol,
            years = statements.roic.len(),
            eps_years = statements.annual_eps.len(),
            "alphavantage statements parsed"
        );
        Ok(statements)
    }
}

impl FundamentalsSource for AlphaVantageSource {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn kind(&self) -> FragmentKind {
        FragmentKind::Statements
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<FundamentalsFragment, SourceError>> {
        Box::pin(async move {
            self.fetch_statements(symbol)
                .await
                .map(FundamentalsFragment::Statements)
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, HealthStatus> {
        Box::pin(async move {
            let mut health = self.upstream.health();
            if self.throttle.pending_len() > 0 {
                health.rate_available = false;
            }
            health
        })
    }
}

/// Rejects Alpha Vantage's in-band error payloads before decoding.
fn decode_payload<T: DeserializeOwned>(function: &str, body: &str) -> Result<T, SourceError> {
    let value: serde_json::Value = parse_json(ProviderId::Alphavantage, body)?;
    let message = |key: &str| value.get(key).and_then(serde_json::Value::as_str);

    if let Some(error) = message("Error Message") {
        return Err(SourceError::not_found(format!(
            "alphavantage {function} error: {error}"
        )));
    }
    if let Some(note) = message("Note").or_else(|| message("Information")) {
        return Err(SourceError::rate_limited(format!(
            "alphavantage {function} refused: {note}"
        )));
    }

    serde_json::from_value(value).map_err(|error| {
        SourceError::malformed(format!("failed to decode alphavantage {function}: {error}"))
    })
}

fn build_statements(
    overview: Overview,
    income: AnnualReports<IncomeReport>,
    balance: AnnualReports<BalanceReport>,
    cash_flow: AnnualReports<CashFlowReport>,
    earnings: Earnings,
) -> FinancialStatements {
    let shares = number(&overview.shares_outstanding).filter(|shares| *shares > 0.0);
    let mut statements = FinancialStatements {
        shares_outstanding: shares,
        name: text(overview.name),
        description: text(overview.description),
        industry: text(overview.industry),
        market_cap: number(&overview.market_capitalization),
        ..FinancialStatements::default()
    };

    let income = by_year(income.annual_reports, |report| &report.fiscal_date_ending);
    let balance = by_year(balance.annual_reports, |report| &report.fiscal_date_ending);
    let cash_flow = by_year(cash_flow.annual_reports, |report| &report.fiscal_date_ending);
    let latest_year = income
        .keys()
        .filter(|year| balance.contains_key(year) && cash_flow.contains_key(year))
        .max()
        .copied();

    for (year, income_report) in &income {
        let (Some(balance_report), Some(cash_flow_report)) =
            (balance.get(year), cash_flow.get(year))
        else {
            continue;
        };

        let revenue = number(&income_report.total_revenue).unwrap_or(0.0);
        let net_income = number(&income_report.net_income).unwrap_or(0.0);
        let ebit = number(&income_report.ebit).unwrap_or(net_income);
        let equity = number(&balance_report.total_shareholder_equity).unwrap_or(0.0);
        let debt = number(&balance_report.total_debt)
            .or_else(|| number(&balance_report.short_long_term_debt_total))
            .unwrap_or(0.0);
        let cash = number(&balance_report.cash).unwrap_or(0.0);
        let operating = number(&cash_flow_report.operating_cashflow).unwrap_or(0.0);
        let capital_expenditures = number(&cash_flow_report.capital_expenditures).unwrap_or(0.0);

        if Some(*year) == latest_year {
            statements.total_debt = Some(debt);
            statements.last_year_net_income = Some(net_income);
            if equity > 0.0 {
                statements.debt_equity_ratio = Some((debt / equity * 1_000.0).round() / 1_000.0);
            }
        }

        if let Some(shares) = shares {
            statements.revenue_per_share.push(revenue / shares);
            statements.equity_per_share.push(equity / shares);
            // Capital expenditures are reported as a positive outflow.
            statements
                .free_cash_flow_per_share
                .push((operating - capital_expenditures.abs()) / shares);
        }

        if let Ok(roic) = rule_one::roic(ebit, cash, debt, equity) {
            statements.roic.push(round2(roic));
        }
    }

    statements.annual_eps = earnings
        .annual_earnings
        .iter()
        .filter_map(|entry| {
            Some((
                fiscal_year(&entry.fiscal_date_ending)?,
                number(&entry.reported_eps)?,
            ))
        })
        .collect();
    let eps = statements.annual_eps.values().copied().collect::<Vec<_>>();
    if eps.len() >= 6 {
        statements.historical_eps_growth =
            rule_one::cagr(eps[eps.len() - 6], eps[eps.len() - 1], 5.0).ok();
    }

    let mut quarters = earnings
        .quarterly_earnings
        .iter()
        .filter_map(|entry| Some((entry.fiscal_date_ending.clone()?, number(&entry.reported_eps)?)))
        .collect::<Vec<_>>();
    quarters.sort_by(|left, right| left.0.cmp(&right.0));
    let recent = &quarters[quarters.len().saturating_sub(4)..];
    statements.quarterly_eps = recent.iter().map(|(_, eps)| *eps).collect();
    if !statements.quarterly_eps.is_empty() {
        statements.trailing_twelve_month_eps = Some(statements.quarterly_eps.iter().sum());
    }

    statements
}

fn by_year<T>(reports: Vec<T>, date: impl Fn(&T) -> &Option<String>) -> BTreeMap<i32, T> {
    reports
        .into_iter()
        .filter_map(|report| Some((fiscal_year(date(&report))?, report)))
        .collect()
}

fn fiscal_year(date: &Option<String>) -> Option<i32> {
    date.as_deref()?.get(..4)?.parse().ok()
}

/// Alpha Vantage encodes numbers as strings and missing values as `"None"`.
fn number(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty() && value != "None")
}

// ============================================================================
// Wire structures
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Overview {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "Industry", default)]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization", default)]
    market_capitalization: Option<String>,
    #[serde(rename = "SharesOutstanding", default)]
    shares_outstanding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnnualReports<T> {
    #[serde(rename = "annualReports", default = "Vec::new")]
    annual_reports: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IncomeReport {
    #[serde(rename = "fiscalDateEnding", default)]
    fiscal_date_ending: Option<String>,
    #[serde(rename = "totalRevenue", default)]
    total_revenue: Option<String>,
    #[serde(rename = "netIncome", default)]
    net_income: Option<String>,
    #[serde(default)]
    ebit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceReport {
    #[serde(rename = "fiscalDateEnding", default)]
    fiscal_date_ending: Option<String>,
    #[serde(rename = "totalShareholderEquity", default)]
    total_shareholder_equity: Option<String>,
    #[serde(rename = "totalDebt", default)]
    total_debt: Option<String>,
    #[serde(rename = "shortLongTermDebtTotal", default)]
    short_long_term_debt_total: Option<String>,
    #[serde(rename = "cashAndCashEquivalentsAtCarryingValue", default)]
    cash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CashFlowReport {
    #[serde(rename = "fiscalDateEnding", default)]
    fiscal_date_ending: Option<String>,
    #[serde(rename = "operatingCashflow", default)]
    operating_cashflow: Option<String>,
    #[serde(rename = "capitalExpenditures", default)]
    capital_expenditures: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Earnings {
    #[serde(rename = "annualEarnings", default)]
    annual_earnings: Vec<EarningsEntry>,
    #[serde(rename = "quarterlyEarnings", default)]
    quarterly_earnings: Vec<EarningsEntry>,
}

#[derive(Debug, Deserialize)]
struct EarningsEntry {
    #[serde(rename = "fiscalDateEnding", default)]
    fiscal_date_ending: Option<String>,
    #[serde(rename = "reportedEPS", default)]
    reported_eps: Option<String>,
}
