//! Ticker symbols and trading date ranges.
//!
//! Tickers follow the exchange-suffix convention used by the Jakarta
//! exchange and its data vendors: four uppercase letters, a dot, and a
//! 2-3 letter market suffix (e.g. `BBCA.JK`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing symbols or date ranges
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("invalid ticker '{0}': expected four uppercase letters, a dot, and a 2-3 letter market suffix")]
    InvalidTicker(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// A validated exchange-suffixed ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TickerSymbol(String);

impl TickerSymbol {
    /// Parse and validate a ticker symbol.
    ///
    /// Input is trimmed and uppercased before validation, so `bbca.jk`
    /// is accepted and canonicalized to `BBCA.JK`.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let candidate = raw.trim().to_uppercase();

        let mut parts = candidate.splitn(2, '.');
        let code = parts.next().unwrap_or("");
        let suffix = parts.next().unwrap_or("");

        let code_ok = code.len() == 4 && code.chars().all(|c| c.is_ascii_uppercase());
        let suffix_ok =
            (2..=3).contains(&suffix.len()) && suffix.chars().all(|c| c.is_ascii_uppercase());

        if code_ok && suffix_ok {
            Ok(Self(candidate))
        } else {
            Err(SymbolError::InvalidTicker(raw.to_string()))
        }
    }

    /// Full symbol, e.g. `BBCA.JK`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bare exchange code without the suffix, e.g. `BBCA`
    pub fn code(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Market suffix, e.g. `JK`
    pub fn suffix(&self) -> &str {
        self.0.split('.').nth(1).unwrap_or("")
    }
}

impl std::fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TickerSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TickerSymbol::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, validating `start <= end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SymbolError> {
        if start > end {
            return Err(SymbolError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whether a date falls within the range (inclusive on both ends).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days covered, inclusive.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn valid_tickers() {
        assert_eq!(TickerSymbol::parse("BBCA.JK").unwrap().as_str(), "BBCA.JK");
        assert_eq!(TickerSymbol::parse("goto.jk").unwrap().as_str(), "GOTO.JK");
        assert_eq!(TickerSymbol::parse(" TLKM.JK ").unwrap().as_str(), "TLKM.JK");
        // Other market suffixes are allowed
        assert!(TickerSymbol::parse("BBCA.IDX").is_ok());
    }

    #[test]
    fn invalid_tickers() {
        for raw in ["BBCA", "BBCA.", ".JK", "BB.JK", "BBCAA.JK", "BB1A.JK", "BBCA.J", "BBCA.JKRT"] {
            assert!(TickerSymbol::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn code_and_suffix() {
        let t = TickerSymbol::parse("BUMI.JK").unwrap();
        assert_eq!(t.code(), "BUMI");
        assert_eq!(t.suffix(), "JK");
    }

    #[test]
    fn range_validation() {
        assert!(DateRange::new(date(2024, 1, 10), date(2024, 1, 1)).is_err());

        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 10)).unwrap();
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 1, 10)));
        assert!(!range.contains(date(2024, 1, 11)));
        assert_eq!(range.num_days(), 10);
    }
}
