use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

const ISIN_LEN: usize = 12;

/// Classification of a user supplied identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Ticker,
    Isin,
    Unknown,
}

impl IdentifierKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Isin => "isin",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for IdentifierKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true when `input` has the ISIN shape: two letters, nine
/// alphanumerics and a trailing digit. Case-insensitive; the check digit
/// itself is not verified.
pub fn looks_like_isin(input: &str) -> bool {
    let bytes = input.trim().as_bytes();
    if bytes.len() != ISIN_LEN {
        return false;
    }

    bytes[..2].iter().all(u8::is_ascii_alphabetic)
        && bytes[2..11].iter().all(u8::is_ascii_alphanumeric)
        && bytes[11].is_ascii_digit()
}
