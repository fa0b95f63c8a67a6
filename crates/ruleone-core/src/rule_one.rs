//! Rule #1 investing calculations.
//!
//! Pure functions over `f64` inputs. Every precondition failure is reported as a
//! [`CalculationError`] so callers can omit a single derived value instead of
//! rendering a misleading zero.
//!
//! | Function | Result |
//! |----------|--------|
//! | [`cagr`] | compound annual growth rate, percent, 2 dp |
//! | [`growth_rate_series`] | 1y / 3y / 5y / max CAGR set |
//! | [`average_series`] | last / 3y / 5y / all average set |
//! | [`payback_time`] | years of compounded income to cover market cap |
//! | [`margin_of_safety_price`] | sticker and 50 % margin-of-safety price |
//! | [`roic`] | return on invested capital, percent |

use std::collections::BTreeMap;

use thiserror::Error;

/// Years projected forward when valuing earnings.
pub const VALUATION_HORIZON_YEARS: i32 = 10;
/// Minimum acceptable annual rate of return.
pub const TARGET_RATE_OF_RETURN: f64 = 0.15;
/// Discount applied to the sticker price.
pub const MARGIN_OF_SAFETY: f64 = 0.5;
/// Payback iterations before the computation is declared non-convergent.
pub const MAX_PAYBACK_YEARS: u32 = 10_000;
/// Share of average daily volume a position may take.
pub const MAX_VOLUME_SHARE: f64 = 0.01;

/// A precondition of one calculation failed; the derived value is skipped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
    #[error("{field} must be greater than 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("start value must not be 0")]
    ZeroStart,
    #[error("start {start} and end {end} have opposite signs")]
    OppositeSigns { start: f64, end: f64 },
    #[error("at least {required} data points are required, got {actual}")]
    InsufficientData { required: usize, actual: usize },
    #[error("growth rate {value} must be greater than -100%")]
    GrowthBelowTotalLoss { value: f64 },
    #[error("high PE {high} must be greater than or equal to low PE {low}")]
    InvertedPeRange { low: f64, high: f64 },
    #[error("future PE {value} must be greater than 0")]
    NonPositiveFuturePe { value: f64 },
    #[error("invested capital {value} must be greater than 0")]
    NonPositiveInvestedCapital { value: f64 },
    #[error("payback did not converge within {max_years} years")]
    PaybackDidNotConverge { max_years: u32 },
}

/// Sticker price and the discounted price to buy at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickerValuation {
    pub margin_of_safety_price: f64,
    pub sticker_price: f64,
}

/// Largest position that can be entered or exited without moving the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionLimit {
    pub max_position: u64,
    pub max_shares: u64,
}

/// Historical price/earnings bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeRange {
    pub high: f64,
    pub low: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn finite(field: &'static str, value: f64) -> Result<f64, CalculationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalculationError::NonFinite { field })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, CalculationError> {
    let value = finite(field, value)?;
    if value <= 0.0 {
        return Err(CalculationError::NonPositive { field, value });
    }
    Ok(value)
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, CalculationError> {
    let value = finite(field, value)?;
    if value < 0.0 {
        return Err(CalculationError::Negative { field, value });
    }
    Ok(value)
}

/// Compound annual growth rate from `start` to `end` over `years`, in percent.
///
/// Values crossing zero have no defined growth direction and are rejected.
pub fn cagr(start: f64, end: f64, years: f64) -> Result<f64, CalculationError> {
    let start = finite("start", start)?;
    let end = finite("end", end)?;
    let years = positive("years", years)?;
    if start == 0.0 {
        return Err(CalculationError::ZeroStart);
    }
    if start * end < 0.0 {
        return Err(CalculationError::OppositeSigns { start, end });
    }

    let magnitude = ((end / start).powf(1.0 / years) - 1.0).abs();
    let rate = if end < start { -magnitude } else { magnitude };
    Ok(round2(rate * 100.0))
}

/// CAGR over the 1, 3, 5 year and full-history windows that `values`
/// (oldest first) is long enough for. Windows that fail are skipped.
pub fn growth_rate_series(values: &[f64]) -> Vec<f64> {
    let len = values.len();
    if len < 2 {
        return Vec::new();
    }

    let last = values[len - 1];
    let mut windows = vec![(values[len - 2], 1.0)];
    if len >= 4 {
        windows.push((values[len - 4], 3.0));
    }
    if len >= 6 {
        windows.push((values[len - 6], 5.0));
    }
    if len >= 7 {
        windows.push((values[0], (len - 1) as f64));
    }

    windows
        .into_iter()
        .filter_map(|(start, years)| cagr(start, last, years).ok())
        .collect()
}

/// Averages of the last value, last 3, last 5 and all values, 2 dp.
///
/// Entry `i` always covers the `i`-th window; the all-values entry needs more
/// than five values so it never repeats the 5-value window.
pub fn average_series(values: &[f64]) -> Vec<f64> {
    let len = values.len();
    let all = (len > 5).then_some(len);
    [Some(1), Some(3), Some(5), all]
        .into_iter()
        .flatten()
        .filter(|window| len >= *window)
        .map(|window| {
            let tail = &values[len - window..];
            round2(tail.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Years until compounded net income adds up to the market cap.
pub fn payback_time(
    market_cap: f64,
    ttm_net_income: f64,
    growth_rate: f64,
) -> Result<u32, CalculationError> {
    let market_cap = positive("market_cap", market_cap)?;
    let mut yearly_income = positive("ttm_net_income", ttm_net_income)?;
    let growth_rate = non_negative("growth_rate", growth_rate)?;

    let mut total = 0.0;
    let mut years = 0;
    while total < market_cap {
        yearly_income *= 1.0 + growth_rate;
        total += yearly_income;
        years += 1;
        if years > MAX_PAYBACK_YEARS {
            return Err(CalculationError::PaybackDidNotConverge {
                max_years: MAX_PAYBACK_YEARS,
            });
        }
    }
    Ok(years)
}

/// EPS projected over the valuation horizon.
pub fn future_eps(current_eps: f64, growth_rate: f64) -> f64 {
    current_eps * (1.0 + growth_rate).powi(VALUATION_HORIZON_YEARS)
}

/// The smaller of the historical average PE and twice the growth rate in percent.
pub fn future_pe(growth_rate: f64, pe_low: f64, pe_high: f64) -> Result<f64, CalculationError> {
    let growth_rate = finite("growth_rate", growth_rate)?;
    let pe_low = positive("pe_low", pe_low)?;
    let pe_high = positive("pe_high", pe_high)?;
    if pe_high < pe_low {
        return Err(CalculationError::InvertedPeRange {
            low: pe_low,
            high: pe_high,
        });
    }

    let average_pe = (pe_low + pe_high) / 2.0;
    let growth_pe = 2.0 * growth_rate * 100.0;
    let value = average_pe.min(growth_pe);
    if value <= 0.0 {
        return Err(CalculationError::NonPositiveFuturePe { value });
    }
    Ok(value)
}

/// Present value of `future_price` at the target rate of return.
pub fn sticker_price(future_price: f64) -> Result<f64, CalculationError> {
    let future_price = positive("future_price", future_price)?;
    Ok(future_price / (1.0 + TARGET_RATE_OF_RETURN).powi(VALUATION_HORIZON_YEARS))
}

pub fn margin_of_safety(sticker_price: f64) -> Result<f64, CalculationError> {
    Ok(positive("sticker_price", sticker_price)? * (1.0 - MARGIN_OF_SAFETY))
}

/// Sticker price and margin-of-safety price for a stock.
///
/// `growth_rate` is a decimal (0.12 for 12 %).
pub fn margin_of_safety_price(
    current_eps: f64,
    growth_rate: f64,
    pe_low: f64,
    pe_high: f64,
) -> Result<StickerValuation, CalculationError> {
    let current_eps = positive("current_eps", current_eps)?;
    let growth_rate = finite("growth_rate", growth_rate)?;
    if growth_rate <= -1.0 {
        return Err(CalculationError::GrowthBelowTotalLoss { value: growth_rate });
    }

    let pe = future_pe(growth_rate, pe_low, pe_high)?;
    let future_price = future_eps(current_eps, growth_rate) * pe;
    let sticker = sticker_price(future_price)?;
    Ok(StickerValuation {
        margin_of_safety_price: margin_of_safety(sticker)?,
        sticker_price: sticker,
    })
}

/// Return on invested capital in percent.
pub fn roic(net_income: f64, cash: f64, debt: f64, equity: f64) -> Result<f64, CalculationError> {
    let net_income = finite("net_income", net_income)?;
    let invested = finite("equity", equity)? + finite("debt", debt)? - finite("cash", cash)?;
    if invested <= 0.0 {
        return Err(CalculationError::NonPositiveInvestedCapital { value: invested });
    }
    Ok(net_income / invested * 100.0)
}

/// Least-squares slope of `values` plotted against their index, 2 dp.
pub fn slope_of_best_fit_line(values: &[f64]) -> Result<f64, CalculationError> {
    if values.len() < 2 {
        return Err(CalculationError::InsufficientData {
            required: 2,
            actual: values.len(),
        });
    }
    for value in values {
        finite("values", *value)?;
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let (numerator, denominator) = values.iter().enumerate().fold(
        (0.0, 0.0),
        |(num, den), (index, y)| {
            let dx = index as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        },
    );
    Ok(round2(numerator / denominator))
}

/// Position limits at 1 % of average daily volume.
pub fn max_position_size(
    share_price: f64,
    average_volume: f64,
) -> Result<PositionLimit, CalculationError> {
    let share_price = positive("share_price", share_price)?;
    let average_volume = positive("average_volume", average_volume)?;

    let max_shares = (average_volume * MAX_VOLUME_SHARE).floor();
    let max_position = (share_price * max_shares).floor();
    Ok(PositionLimit {
        max_position: max_position as u64,
        max_shares: max_shares as u64,
    })
}

/// High and low of `round(close / eps, 2)` over years present in both maps.
pub fn pe_range(
    year_end_closes: &BTreeMap<i32, f64>,
    annual_eps: &BTreeMap<i32, f64>,
) -> Option<PeRange> {
    let ratios = year_end_closes
        .iter()
        .filter_map(|(year, close)| {
            let eps = annual_eps.get(year)?;
            (*eps != 0.0 && eps.is_finite() && close.is_finite()).then(|| round2(close / eps))
        })
        .collect::<Vec<_>>();

    let high = ratios.iter().copied().reduce(f64::max)?;
    let low = ratios.iter().copied().reduce(f64::min)?;
    Some(PeRange { high, low })
}

/// The lower of the analyst estimate and the historical equity growth, as a
/// non-negative decimal.
pub fn conservative_growth_decimal(analyst_percent: f64, equity_growth_percent: f64) -> f64 {
    analyst_percent.min(equity_growth_percent).max(0.0) / 100.0
}
