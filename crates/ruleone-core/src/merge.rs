//! Folds source fragments into one [`CompanyFundamentals`].
//!
//! Profile values win over the overview fallbacks carried by statements,
//! except shares outstanding: the statements count is the divisor behind the
//! per-share series, so it stays authoritative.

use serde::{Deserialize, Serialize};

use crate::rule_one::{average_series, growth_rate_series, pe_range};
use crate::{
    CompanyFundamentals, CompanyProfile, FinancialStatements, FundamentalsFragment,
    GrowthEstimate, GrowthSource, ProviderId, Symbol, DEBT_EQUITY_UNAVAILABLE,
};

/// A fragment tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedFragment {
    pub provider: ProviderId,
    pub fragment: FundamentalsFragment,
}

/// Merges `fragments` in slice order. The first profile and the first
/// statements fragment are used; growth estimates are ranked by
/// `growth_order`, with unlisted providers after the listed ones.
pub fn merge_fragments(
    ticker: Symbol,
    fragments: &[SourcedFragment],
    growth_order: &[ProviderId],
) -> CompanyFundamentals {
    let mut profile = None;
    let mut statements = None;
    let mut estimates = Vec::new();

    for sourced in fragments {
        match &sourced.fragment {
            FundamentalsFragment::Profile(fragment) => {
                profile.get_or_insert(fragment);
            }
            FundamentalsFragment::Statements(fragment) => {
                statements.get_or_insert(fragment);
            }
            FundamentalsFragment::GrowthEstimate(estimate) => estimates.push(*estimate),
        }
    }

    let mut fundamentals = CompanyFundamentals::empty(ticker);
    if let Some(statements) = statements {
        apply_statements(&mut fundamentals, statements);
    }
    if let Some(profile) = profile {
        apply_profile(&mut fundamentals, profile);
    }

    fundamentals.eps_growth_rates = growth_rate_series(&fundamentals.eps);
    fundamentals.equity_growth_rates = growth_rate_series(&fundamentals.equity_per_share);
    fundamentals.revenue_growth_rates = growth_rate_series(&fundamentals.revenue_per_share);
    fundamentals.free_cash_flow_growth_rates =
        growth_rate_series(&fundamentals.free_cash_flow_per_share);
    fundamentals.roic_averages = average_series(&fundamentals.roic);

    if let (Some(profile), Some(statements)) = (profile, statements) {
        if let Some(range) = pe_range(&profile.year_end_closes, &statements.annual_eps) {
            fundamentals.pe_high = Some(range.high);
            fundamentals.pe_low = Some(range.low);
        }
    }

    let historical = statements.and_then(|statements| statements.historical_eps_growth);
    match preferred_estimate(&estimates, growth_order) {
        Some(estimate) => {
            fundamentals.five_year_growth_rate = Some(estimate.five_year_percent);
            fundamentals.growth_estimate_source = Some(GrowthSource::Analyst(estimate.provider));
        }
        None if historical.is_some() => {
            fundamentals.five_year_growth_rate = historical;
            fundamentals.growth_estimate_source = Some(GrowthSource::HistoricalEps);
        }
        None => {}
    }

    fundamentals
}

fn apply_statements(fundamentals: &mut CompanyFundamentals, statements: &FinancialStatements) {
    fundamentals.eps = statements.annual_eps.values().copied().collect();
    fundamentals.equity_per_share = statements.equity_per_share.clone();
    fundamentals.revenue_per_share = statements.revenue_per_share.clone();
    fundamentals.free_cash_flow_per_share = statements.free_cash_flow_per_share.clone();
    fundamentals.roic = statements.roic.clone();
    fundamentals.quarterly_eps = statements.quarterly_eps.clone();
    fundamentals.trailing_twelve_month_eps = statements.trailing_twelve_month_eps;
    fundamentals.total_debt = statements.total_debt;
    fundamentals.last_year_net_income = statements.last_year_net_income;
    fundamentals.debt_equity_ratio = statements
        .debt_equity_ratio
        .filter(|ratio| *ratio >= 0.0)
        .unwrap_or(DEBT_EQUITY_UNAVAILABLE);
    fundamentals.shares_outstanding = statements.shares_outstanding;

    fundamentals.name = statements.name.clone();
    fundamentals.description = statements.description.clone();
    fundamentals.industry = statements.industry.clone();
    fundamentals.market_cap = statements.market_cap;
}

fn apply_profile(fundamentals: &mut CompanyFundamentals, profile: &CompanyProfile) {
    fundamentals.name = profile.name.clone().or(fundamentals.name.take());
    fundamentals.description = profile.description.clone().or(fundamentals.description.take());
    fundamentals.industry = profile.industry.clone().or(fundamentals.industry.take());
    fundamentals.market_cap = profile.market_cap.or(fundamentals.market_cap);
    fundamentals.current_price = profile.current_price;
    fundamentals.average_volume = profile.average_volume;
    fundamentals.shares_outstanding = fundamentals
        .shares_outstanding
        .or(profile.shares_outstanding);
}

fn preferred_estimate(
    estimates: &[GrowthEstimate],
    growth_order: &[ProviderId],
) -> Option<GrowthEstimate> {
    let rank = |provider: ProviderId| {
        growth_order
            .iter()
            .position(|candidate| *candidate == provider)
            .unwrap_or(growth_order.len())
    };
    // min_by_key keeps the first of equal ranks.
    estimates
        .iter()
        .copied()
        .min_by_key(|estimate| rank(estimate.provider))
}
