//! Trading symbol validation.

use std::fmt::{Display, Formatter};

use crate::error::DatasetError;

const MAX_SYMBOL_LEN: usize = 20;

/// Upper-cased trading symbol, safe to place in a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Trim, upper-case and validate user input.
    pub fn parse(input: &str) -> Result<Self, DatasetError> {
        let normalized = input.trim().to_ascii_uppercase();
        let invalid = || DatasetError::InvalidSymbol(input.to_string());

        if normalized.is_empty() || normalized.len() > MAX_SYMBOL_LEN {
            return Err(invalid());
        }

        if !normalized.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        let valid = normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(invalid());
        }

        Ok(Self(normalized))
    }

    /// Symbol text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(Symbol::parse("  btcusdt ").unwrap().as_str(), "BTCUSDT");
    }

    #[test]
    fn accepts_separators() {
        assert!(Symbol::parse("BTC-PERP").is_ok());
        assert!(Symbol::parse("eth_usdt").is_ok());
        assert!(Symbol::parse("1000PEPE.P").is_ok());
    }

    #[test]
    fn rejects_path_characters() {
        assert!(Symbol::parse("../auth").is_err());
        assert!(Symbol::parse("BTC/USDT").is_err());
        assert!(Symbol::parse("BTC USDT").is_err());
        assert!(Symbol::parse("BTC?limit=1").is_err());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(Symbol::parse("   ").is_err());
        assert!(Symbol::parse(&"A".repeat(21)).is_err());
    }
}
