use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::data_source::{SearchQuote, SymbolSearch};
use crate::{looks_like_isin, IdentifierKind};

/// Listings requested per ISIN lookup.
pub const SEARCH_LIMIT: usize = 6;

const ACCEPTED_QUOTE_TYPES: [&str; 2] = ["equity", "etf"];

/// Outcome of mapping user input to a ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub input: String,
    /// Ticker to fetch; the trimmed input when nothing better was found.
    pub symbol: String,
    pub kind: IdentifierKind,
    pub succeeded: bool,
}

/// Maps tickers and ISINs to exchange tickers.
#[derive(Clone)]
pub struct IdentifierResolver {
    search: Arc<dyn SymbolSearch>,
}

impl IdentifierResolver {
    pub fn new(search: Arc<dyn SymbolSearch>) -> Self {
        Self { search }
    }

    /// Never fails: search errors leave `succeeded` false.
    pub async fn resolve(&self, identifier: &str) -> Resolution {
        let input = identifier.trim();
        if input.is_empty() {
            return Resolution {
                input: String::new(),
                symbol: String::new(),
                kind: IdentifierKind::Unknown,
                succeeded: false,
            };
        }

        if !looks_like_isin(input) {
            return Resolution {
                input: input.to_owned(),
                symbol: input.to_owned(),
                kind: IdentifierKind::Ticker,
                succeeded: true,
            };
        }

        let matched = match self.search.search(input, SEARCH_LIMIT).await {
            Ok(quotes) => first_listing(&quotes),
            Err(error) => {
                warn!(identifier = input, error = %error, "symbol search failed");
                None
            }
        };
        debug!(identifier = input, symbol = ?matched, "isin lookup finished");

        Resolution {
            input: input.to_owned(),
            succeeded: matched.is_some(),
            symbol: matched.unwrap_or_else(|| input.to_owned()),
            kind: IdentifierKind::Isin,
        }
    }
}

fn first_listing(quotes: &[SearchQuote]) -> Option<String> {
    quotes
        .iter()
        .filter(|quote| !quote.symbol.trim().is_empty())
        .find(|quote| {
            quote.quote_type.as_deref().map_or(true, |quote_type| {
                ACCEPTED_QUOTE_TYPES
                    .iter()
                    .any(|accepted| quote_type.eq_ignore_ascii_case(accepted))
            })
        })
        .map(|quote| quote.symbol.trim().to_owned())
}
