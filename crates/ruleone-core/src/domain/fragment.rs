use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, ValidationError};

/// Portion of a company's fundamentals a source is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Profile,
    Statements,
    GrowthEstimate,
}

impl FragmentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Statements => "statements",
            Self::GrowthEstimate => "growth_estimate",
        }
    }
}

impl Display for FragmentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, market data and price history for one company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub current_price: Option<f64>,
    pub average_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    /// Last monthly close of each calendar year.
    pub year_end_closes: BTreeMap<i32, f64>,
}

impl CompanyProfile {
    fn normalized(mut self) -> Self {
        self.current_price = finite(self.current_price);
        self.average_volume = finite(self.average_volume);
        self.market_cap = finite(self.market_cap);
        self.shares_outstanding = positive(self.shares_outstanding);
        self.year_end_closes.retain(|_, close| close.is_finite());
        self
    }
}

/// Per-year statement series and balance sheet scalars. All series are
/// ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub revenue_per_share: Vec<f64>,
    pub equity_per_share: Vec<f64>,
    pub free_cash_flow_per_share: Vec<f64>,
    pub roic: Vec<f64>,
    pub annual_eps: BTreeMap<i32, f64>,
    /// Last four reported quarters, oldest first.
    pub quarterly_eps: Vec<f64>,
    pub trailing_twelve_month_eps: Option<f64>,
    pub total_debt: Option<f64>,
    pub last_year_net_income: Option<f64>,
    pub debt_equity_ratio: Option<f64>,
    pub shares_outstanding: Option<f64>,
    /// Five year CAGR of annual EPS, percent.
    pub historical_eps_growth: Option<f64>,

    // Company overview values, used when no profile is available.
    pub name: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
}

impl FinancialStatements {
    fn normalized(mut self) -> Self {
        for series in [
            &mut self.revenue_per_share,
            &mut self.equity_per_share,
            &mut self.free_cash_flow_per_share,
            &mut self.roic,
            &mut self.quarterly_eps,
        ] {
            series.retain(|value| value.is_finite());
        }
        self.annual_eps.retain(|_, eps| eps.is_finite());
        self.trailing_twelve_month_eps = finite(self.trailing_twelve_month_eps);
        self.total_debt = finite(self.total_debt);
        self.last_year_net_income = finite(self.last_year_net_income);
        self.debt_equity_ratio = finite(self.debt_equity_ratio);
        self.shares_outstanding = positive(self.shares_outstanding);
        self.historical_eps_growth = finite(self.historical_eps_growth);
        self.market_cap = finite(self.market_cap);
        self
    }
}

/// Analyst consensus for annual growth over the next five years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthEstimate {
    pub provider: ProviderId,
    pub five_year_percent: f64,
}

impl GrowthEstimate {
    pub fn new(provider: ProviderId, five_year_percent: f64) -> Result<Self, ValidationError> {
        if !five_year_percent.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                field: "five_year_percent",
            });
        }
        Ok(Self {
            provider,
            five_year_percent,
        })
    }
}

/// Partial result returned by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FundamentalsFragment {
    Profile(CompanyProfile),
    Statements(FinancialStatements),
    GrowthEstimate(GrowthEstimate),
}

impl FundamentalsFragment {
    pub const fn kind(&self) -> FragmentKind {
        match self {
            Self::Profile(_) => FragmentKind::Profile,
            Self::Statements(_) => FragmentKind::Statements,
            Self::GrowthEstimate(_) => FragmentKind::GrowthEstimate,
        }
    }

    /// Drops non-finite numbers and treats non-positive share counts as unavailable.
    pub fn normalized(self) -> Self {
        match self {
            Self::Profile(profile) => Self::Profile(profile.normalized()),
            Self::Statements(statements) => Self::Statements(statements.normalized()),
            Self::GrowthEstimate(estimate) => Self::GrowthEstimate(estimate),
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

fn positive(value: Option<f64>) -> Option<f64> {
    finite(value).filter(|value| *value > 0.0)
}
