use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol};

/// Sentinel stored in `debt_equity_ratio` when the ratio is unknown.
pub const DEBT_EQUITY_UNAVAILABLE: f64 = -1.0;

/// Merged view of every fragment fetched for one company.
///
/// Series are ordered oldest first. Growth and average sets hold at most four
/// entries in window order: 1 year, 3 years, 5 years, full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFundamentals {
    pub ticker: Symbol,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,

    pub current_price: Option<f64>,
    pub average_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub total_debt: Option<f64>,
    pub last_year_net_income: Option<f64>,
    pub debt_equity_ratio: f64,

    pub eps: Vec<f64>,
    pub equity_per_share: Vec<f64>,
    pub revenue_per_share: Vec<f64>,
    pub free_cash_flow_per_share: Vec<f64>,
    pub roic: Vec<f64>,
    pub quarterly_eps: Vec<f64>,

    pub eps_growth_rates: Vec<f64>,
    pub equity_growth_rates: Vec<f64>,
    pub revenue_growth_rates: Vec<f64>,
    pub free_cash_flow_growth_rates: Vec<f64>,
    pub roic_averages: Vec<f64>,

    pub pe_low: Option<f64>,
    pub pe_high: Option<f64>,
    pub trailing_twelve_month_eps: Option<f64>,
    pub five_year_growth_rate: Option<f64>,
    pub growth_estimate_source: Option<GrowthSource>,
}

impl CompanyFundamentals {
    pub fn empty(ticker: Symbol) -> Self {
        Self {
            ticker,
            name: None,
            industry: None,
            description: None,
            current_price: None,
            average_volume: None,
            market_cap: None,
            shares_outstanding: None,
            total_debt: None,
            last_year_net_income: None,
            debt_equity_ratio: DEBT_EQUITY_UNAVAILABLE,
            eps: Vec::new(),
            equity_per_share: Vec::new(),
            revenue_per_share: Vec::new(),
            free_cash_flow_per_share: Vec::new(),
            roic: Vec::new(),
            quarterly_eps: Vec::new(),
            eps_growth_rates: Vec::new(),
            equity_growth_rates: Vec::new(),
            revenue_growth_rates: Vec::new(),
            free_cash_flow_growth_rates: Vec::new(),
            roic_averages: Vec::new(),
            pe_low: None,
            pe_high: None,
            trailing_twelve_month_eps: None,
            five_year_growth_rate: None,
            growth_estimate_source: None,
        }
    }

    /// Equity growth over the longest available window.
    pub fn long_term_equity_growth(&self) -> Option<f64> {
        self.equity_growth_rates.last().copied()
    }

    /// Reported TTM EPS, else the sum of the last four quarters.
    pub fn ttm_eps(&self) -> Option<f64> {
        self.trailing_twelve_month_eps.or_else(|| {
            (!self.quarterly_eps.is_empty()).then(|| self.quarterly_eps.iter().sum())
        })
    }
}

/// Where the five year growth rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthSource {
    Analyst(ProviderId),
    HistoricalEps,
}

impl GrowthSource {
    pub fn label(self) -> String {
        match self {
            Self::Analyst(provider) => provider.as_str().to_owned(),
            Self::HistoricalEps => String::from("historical_eps"),
        }
    }
}
