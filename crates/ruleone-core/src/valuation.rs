//! Reduces merged fundamentals to the flat [`MetricsRecord`].
//!
//! Every calculation that cannot run leaves its field `None` and is logged at
//! debug level; valuation itself never fails.

use tracing::debug;

use crate::resolver::Resolution;
use crate::rule_one::{
    self, conservative_growth_decimal, round2, CalculationError, StickerValuation,
};
use crate::{CompanyFundamentals, MetricsRecord, ProviderId};

pub fn build_metrics(
    fundamentals: &CompanyFundamentals,
    resolution: &Resolution,
    degraded_sources: Vec<ProviderId>,
) -> MetricsRecord {
    let growth = valuation_growth(fundamentals);
    let sticker = growth.and_then(|growth| sticker_valuation(fundamentals, growth));
    let payback_time = growth.and_then(|growth| payback(fundamentals, growth));

    let latest_fcf_per_share = fundamentals.free_cash_flow_per_share.last().copied();
    let free_cash_flow = latest_fcf_per_share
        .zip(fundamentals.shares_outstanding)
        .map(|(per_share, shares)| (per_share * shares).round());
    let debt_payoff_time = free_cash_flow
        .filter(|fcf| *fcf > 0.0)
        .zip(fundamentals.total_debt)
        .map(|(fcf, debt)| (debt / fcf).round());
    let position = fundamentals
        .current_price
        .zip(fundamentals.average_volume)
        .and_then(|(price, volume)| {
            skipped("max_position_size", rule_one::max_position_size(price, volume))
        });

    MetricsRecord {
        ticker: fundamentals.ticker.to_string(),
        identifier: resolution.input.clone(),
        identifier_type: resolution.kind,
        identifier_resolution_succeeded: resolution.succeeded,
        name: fundamentals.name.clone(),
        description: fundamentals.description.clone(),
        industry: fundamentals.industry.clone(),
        roic: fundamentals.roic_averages.clone(),
        eps: fundamentals.eps_growth_rates.clone(),
        sales: fundamentals.revenue_growth_rates.clone(),
        equity: fundamentals.equity_growth_rates.clone(),
        cash: fundamentals.free_cash_flow_growth_rates.clone(),
        total_debt: fundamentals.total_debt,
        free_cash_flow,
        ten_cap_price: latest_fcf_per_share.map(|per_share| round2(10.0 * per_share)),
        debt_payoff_time,
        debt_equity_ratio: fundamentals.debt_equity_ratio,
        margin_of_safety_price: sticker.map(|valuation| round2(valuation.margin_of_safety_price)),
        current_price: fundamentals.current_price,
        sticker_price: sticker.map(|valuation| round2(valuation.sticker_price)),
        payback_time,
        average_volume: fundamentals.average_volume,
        five_year_growth_rate: fundamentals.five_year_growth_rate,
        growth_estimate_source: fundamentals.growth_estimate_source.map(|source| source.label()),
        max_position_size: position.map(|limit| limit.max_position),
        max_position_shares: position.map(|limit| limit.max_shares),
        pe_low: fundamentals.pe_low,
        pe_high: fundamentals.pe_high,
        degraded_sources,
    }
}

/// Conservative growth as a decimal, or `None` when it cannot support a valuation.
fn valuation_growth(fundamentals: &CompanyFundamentals) -> Option<f64> {
    let Some(equity_growth) = fundamentals.long_term_equity_growth() else {
        debug!(ticker = %fundamentals.ticker, "no equity growth history, valuation skipped");
        return None;
    };
    let estimate = fundamentals.five_year_growth_rate.unwrap_or(0.0);

    let growth = conservative_growth_decimal(estimate, equity_growth);
    if growth <= 0.0 {
        debug!(
            ticker = %fundamentals.ticker,
            estimate,
            equity_growth,
            "non-positive growth, valuation skipped"
        );
        return None;
    }
    Some(growth)
}

fn sticker_valuation(fundamentals: &CompanyFundamentals, growth: f64) -> Option<StickerValuation> {
    let (Some(eps), Some(pe_low), Some(pe_high)) =
        (fundamentals.ttm_eps(), fundamentals.pe_low, fundamentals.pe_high)
    else {
        debug!(ticker = %fundamentals.ticker, "missing eps or pe range, sticker price skipped");
        return None;
    };
    skipped(
        "margin_of_safety_price",
        rule_one::margin_of_safety_price(eps, growth, pe_low, pe_high),
    )
}

fn payback(fundamentals: &CompanyFundamentals, growth: f64) -> Option<u32> {
    let (Some(market_cap), Some(net_income)) =
        (fundamentals.market_cap, fundamentals.last_year_net_income)
    else {
        debug!(ticker = %fundamentals.ticker, "missing market cap or net income, payback skipped");
        return None;
    };
    skipped(
        "payback_time",
        rule_one::payback_time(market_cap, net_income, growth),
    )
}

fn skipped<T>(metric: &'static str, result: Result<T, CalculationError>) -> Option<T> {
    result
        .map_err(|error| debug!(metric, %error, "computation skipped"))
        .ok()
}
