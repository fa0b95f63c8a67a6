//! # Domain Models
//!
//! Typed values that flow between the sources, the orchestrator and the
//! valuation step.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated exchange ticker |
//! | [`IdentifierKind`] | Ticker / ISIN classification of user input |
//! | [`FundamentalsFragment`] | Partial result from one source |
//! | [`CompanyFundamentals`] | Merged view of all fragments |
//! | [`MetricsRecord`] | Flat record returned to callers |

mod fragment;
mod fundamentals;
mod identifier;
mod metrics;
mod symbol;

pub use fragment::{
    CompanyProfile, FinancialStatements, FragmentKind, FundamentalsFragment, GrowthEstimate,
};
pub use fundamentals::{CompanyFundamentals, GrowthSource, DEBT_EQUITY_UNAVAILABLE};
pub use identifier::{looks_like_isin, IdentifierKind};
pub use metrics::MetricsRecord;
pub use symbol::Symbol;
