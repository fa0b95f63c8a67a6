use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream providers a fundamentals fragment can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Yahoo,
    Alphavantage,
    Zacks,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Yahoo, Self::Alphavantage, Self::Zacks];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Alphavantage => "alphavantage",
            Self::Zacks => "zacks",
        }
    }

    /// Parses a comma separated provider list, dropping duplicates but keeping order.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ValidationError> {
        let mut providers = Vec::new();
        for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
            let provider = raw.parse::<Self>()?;
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        Ok(providers)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "alphavantage" | "alpha_vantage" => Ok(Self::Alphavantage),
            "zacks" => Ok(Self::Zacks),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_list_in_order_without_duplicates() {
        let providers = ProviderId::parse_list("zacks, yahoo,zacks").expect("valid list");
        assert_eq!(providers, vec![ProviderId::Zacks, ProviderId::Yahoo]);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = ProviderId::parse_list("yahoo,msn").expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::InvalidSource {
                value: String::from("msn")
            }
        );
    }
}
