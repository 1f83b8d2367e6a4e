//! Source dialect detection and column aliasing
//!
//! Each external source names its columns differently. A dialect is
//! detected from the header fingerprint (case- and space-insensitive),
//! and a fixed alias table maps every known column name (including the
//! Indonesian names used by the IDX exports) onto the canonical field
//! set.

/// Canonical fields a payload column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
    AdjClose,
    Ticker,
}

/// A source's native column naming and layout convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Yahoo Finance CSV: Date, Open, High, Low, Close, Adj Close, Volume
    Yahoo,
    /// Stooq CSV: exactly Date, Open, High, Low, Close, Volume
    Stooq,
    /// IDX exports, recognizable by a Kode/Code column and localized names
    Idx,
    /// Alpha Vantage CSV, led by a `timestamp` column
    AlphaVantage,
    /// No recognized fingerprint; best-effort alias mapping still applies
    #[default]
    Unknown,
}

impl Dialect {
    /// Short identifier used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Yahoo => "yahoo",
            Dialect::Stooq => "stooq",
            Dialect::Idx => "idx",
            Dialect::AlphaVantage => "alphavantage",
            Dialect::Unknown => "unknown",
        }
    }

    /// Detect the dialect from a header row.
    ///
    /// Matching is case- and space-insensitive. Fingerprints are checked
    /// from most to least specific: an adjusted-close column marks Yahoo,
    /// a Kode/Code column marks IDX, a leading `timestamp` column marks
    /// Alpha Vantage, and the exact six-column daily layout marks Stooq.
    pub fn detect(headers: &[String]) -> Dialect {
        let keys: Vec<String> = headers.iter().map(|h| normalize_column(h)).collect();
        let has = |name: &str| keys.iter().any(|k| k == name);

        if has("adj_close") {
            return Dialect::Yahoo;
        }
        if has("kode") || has("code") {
            return Dialect::Idx;
        }
        if keys.first().map(|k| k == "timestamp").unwrap_or(false) {
            return Dialect::AlphaVantage;
        }

        let stooq_layout = ["date", "open", "high", "low", "close", "volume"];
        if keys.len() == 6 && stooq_layout.iter().all(|c| has(c)) {
            return Dialect::Stooq;
        }

        Dialect::Unknown
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a raw column name for alias lookup: trim, lowercase, and
/// join interior whitespace and dots with underscores. "Adj. Close" and
/// "adj close" both become `adj_close`.
pub fn normalize_column(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Map a normalized column name to its canonical field.
///
/// The alias table covers every source dialect, including the localized
/// IDX column names (Tanggal, Pembukaan, Tertinggi, Terendah, Penutupan).
pub fn canonical_field(normalized: &str) -> Option<CanonicalField> {
    let field = match normalized {
        "date" | "timestamp" | "tanggal" | "tgl" => CanonicalField::Date,
        "open" | "pembukaan" | "open_price" => CanonicalField::Open,
        "high" | "tertinggi" | "highest" => CanonicalField::High,
        "low" | "terendah" | "lowest" => CanonicalField::Low,
        "close" | "penutupan" | "close_price" | "last" => CanonicalField::Close,
        "volume" | "vol" => CanonicalField::Volume,
        "adj_close" | "adjusted_close" | "adjclose" => CanonicalField::AdjClose,
        "ticker" | "symbol" | "kode" | "code" => CanonicalField::Ticker,
        _ => return None,
    };
    Some(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_column_names() {
        assert_eq!(normalize_column(" Adj Close "), "adj_close");
        assert_eq!(normalize_column("Adj. Close"), "adj_close");
        assert_eq!(normalize_column("VOLUME"), "volume");
        assert_eq!(normalize_column("Tanggal"), "tanggal");
    }

    #[test]
    fn detects_yahoo_by_adjusted_close() {
        let d = Dialect::detect(&headers(&[
            "Date", "Open", "High", "Low", "Close", "Adj Close", "Volume",
        ]));
        assert_eq!(d, Dialect::Yahoo);
    }

    #[test]
    fn detects_stooq_by_exact_layout() {
        let d = Dialect::detect(&headers(&["Date", "Open", "High", "Low", "Close", "Volume"]));
        assert_eq!(d, Dialect::Stooq);
    }

    #[test]
    fn detects_idx_by_kode_column() {
        let d = Dialect::detect(&headers(&[
            "Tanggal", "Kode", "Pembukaan", "Tertinggi", "Terendah", "Penutupan", "Volume",
        ]));
        assert_eq!(d, Dialect::Idx);
    }

    #[test]
    fn detects_alphavantage_by_timestamp() {
        let d = Dialect::detect(&headers(&[
            "timestamp", "open", "high", "low", "close", "volume",
        ]));
        assert_eq!(d, Dialect::AlphaVantage);
    }

    #[test]
    fn seven_unrecognized_columns_fall_back_to_unknown() {
        let d = Dialect::detect(&headers(&["a", "b", "c", "d", "e", "f", "g"]));
        assert_eq!(d, Dialect::Unknown);
    }

    #[test]
    fn alias_table_covers_localized_names() {
        assert_eq!(canonical_field("tanggal"), Some(CanonicalField::Date));
        assert_eq!(canonical_field("pembukaan"), Some(CanonicalField::Open));
        assert_eq!(canonical_field("tertinggi"), Some(CanonicalField::High));
        assert_eq!(canonical_field("terendah"), Some(CanonicalField::Low));
        assert_eq!(canonical_field("penutupan"), Some(CanonicalField::Close));
        assert_eq!(canonical_field("vol"), Some(CanonicalField::Volume));
        assert_eq!(canonical_field("kode"), Some(CanonicalField::Ticker));
        assert_eq!(canonical_field("nonsense"), None);
    }
}
