use serde::{Deserialize, Serialize};

use crate::{IdentifierKind, ProviderId};

/// Flat per-company result handed to callers.
///
/// Missing numbers serialize as `null`; `debt_equity_ratio` uses `-1` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub ticker: String,
    pub identifier: String,
    pub identifier_type: IdentifierKind,
    pub identifier_resolution_succeeded: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,

    pub roic: Vec<f64>,
    pub eps: Vec<f64>,
    pub sales: Vec<f64>,
    pub equity: Vec<f64>,
    pub cash: Vec<f64>,

    pub total_debt: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub ten_cap_price: Option<f64>,
    pub debt_payoff_time: Option<f64>,
    pub debt_equity_ratio: f64,
    pub margin_of_safety_price: Option<f64>,
    pub current_price: Option<f64>,
    pub sticker_price: Option<f64>,
    pub payback_time: Option<u32>,
    pub average_volume: Option<f64>,

    pub five_year_growth_rate: Option<f64>,
    pub growth_estimate_source: Option<String>,
    pub max_position_size: Option<u64>,
    pub max_position_shares: Option<u64>,
    pub pe_low: Option<f64>,
    pub pe_high: Option<f64>,
    /// Non-critical sources that failed, timed out or were skipped.
    pub degraded_sources: Vec<ProviderId>,
}

impl MetricsRecord {
    /// Copies this record under another caller supplied identifier.
    pub fn relabeled(&self, identifier: &str, kind: IdentifierKind, succeeded: bool) -> Self {
        Self {
            identifier: identifier.to_owned(),
            identifier_type: kind,
            identifier_resolution_succeeded: succeeded,
            ..self.clone()
        }
    }
}
