//! Schema normalization
//!
//! Converts a raw source payload (any adapter's native CSV shape, or a
//! manually dropped file) into a `CanonicalSeries`. Dialect detection is
//! signature-based; column names go through a fixed alias table; dates
//! and prices are parsed permissively. Rows whose date or close cannot
//! be parsed are dropped and counted, never fatal.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::schema::{
    canonical_field, normalize_column, CanonicalBar, CanonicalField, CanonicalSeries, Dialect,
};
use crate::source::{FetchRequest, RawPayload, SourceError, SourceResult};
use crate::symbol::TickerSymbol;

/// Date formats tried in order, most common first.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y"];

/// Result of normalizing one payload.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// The canonical series (sorted, deduplicated, range-clipped)
    pub series: CanonicalSeries,
    /// Detected or declared dialect the mapping used
    pub dialect: Dialect,
    /// Data rows seen in the payload
    pub rows_seen: usize,
    /// Rows dropped for unparseable date/close, ticker mismatch, or
    /// falling outside the requested range
    pub rows_dropped: usize,
}

/// Converts heterogeneous raw payloads into the canonical record shape.
///
/// Stateless; normalizing the same payload twice yields identical
/// output.
#[derive(Debug, Clone, Default)]
pub struct SchemaNormalizer;

impl SchemaNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a payload against its originating request.
    ///
    /// The request supplies the ticker when the payload carries none
    /// (the ticker is never invented) and the date range rows are
    /// clipped to.
    pub fn normalize(&self, payload: &RawPayload, request: &FetchRequest) -> SourceResult<Normalized> {
        let text = String::from_utf8_lossy(&payload.bytes);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SourceError::Parse(format!("unreadable header row: {e}")))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        // A declared dialect from the adapter wins; otherwise detect
        // from the header fingerprint.
        let dialect = match payload.dialect {
            Dialect::Unknown => Dialect::detect(&headers),
            declared => declared,
        };

        let columns = Self::map_columns(&headers);
        debug!(
            source = %payload.source,
            %dialect,
            mapped = columns.len(),
            "normalizing payload"
        );

        let date_col = *columns.get(&CanonicalField::Date).ok_or_else(|| {
            SourceError::Parse(format!(
                "no date column after mapping (dialect {dialect}, headers {headers:?})"
            ))
        })?;
        let close_col = *columns.get(&CanonicalField::Close).ok_or_else(|| {
            SourceError::Parse(format!(
                "no close column after mapping (dialect {dialect}, headers {headers:?})"
            ))
        })?;

        let open_col = columns.get(&CanonicalField::Open).copied();
        let high_col = columns.get(&CanonicalField::High).copied();
        let low_col = columns.get(&CanonicalField::Low).copied();
        let volume_col = columns.get(&CanonicalField::Volume).copied();
        let adj_col = columns.get(&CanonicalField::AdjClose).copied();
        let ticker_col = columns.get(&CanonicalField::Ticker).copied();

        let expected_ticker = &request.ticker;
        let mut bars = Vec::new();
        let mut rows_seen = 0usize;
        let mut rows_dropped = 0usize;

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(_) => {
                    rows_seen += 1;
                    rows_dropped += 1;
                    continue;
                }
            };
            rows_seen += 1;

            let date = record.get(date_col).and_then(parse_date);
            let close = record.get(close_col).and_then(parse_decimal);

            let (date, close) = match (date, close) {
                (Some(date), Some(close)) => (date, close),
                _ => {
                    rows_dropped += 1;
                    continue;
                }
            };

            // A payload ticker that contradicts the request is bad data
            // for this row, not a reason to relabel the series.
            if let Some(col) = ticker_col {
                if let Some(raw) = record.get(col) {
                    if !ticker_matches(raw, expected_ticker) {
                        rows_dropped += 1;
                        continue;
                    }
                }
            }

            if !request.range.contains(date) {
                rows_dropped += 1;
                continue;
            }

            bars.push(CanonicalBar {
                date,
                open: open_col.and_then(|c| record.get(c)).and_then(parse_decimal),
                high: high_col.and_then(|c| record.get(c)).and_then(parse_decimal),
                low: low_col.and_then(|c| record.get(c)).and_then(parse_decimal),
                close,
                volume: volume_col.and_then(|c| record.get(c)).and_then(parse_volume),
                adjusted_close: adj_col.and_then(|c| record.get(c)).and_then(parse_decimal),
            });
        }

        if rows_dropped > 0 {
            warn!(
                ticker = %expected_ticker,
                source = %payload.source,
                rows_dropped,
                rows_seen,
                "dropped unusable rows during normalization"
            );
        }

        let series = CanonicalSeries::new(expected_ticker.clone(), bars);
        Ok(Normalized {
            series,
            dialect,
            rows_seen,
            rows_dropped,
        })
    }

    /// Map header positions to canonical fields through the alias table.
    /// The first column claiming a field wins; later duplicates are
    /// ignored.
    fn map_columns(headers: &[String]) -> HashMap<CanonicalField, usize> {
        let mut columns = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            if let Some(field) = canonical_field(&normalize_column(header)) {
                columns.entry(field).or_insert(index);
            }
        }
        columns
    }
}

/// Parse a date trying multiple formats, then an ISO datetime prefix
/// ("2024-01-02 00:00:00" and RFC 3339 both reduce to their date part).
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Parse a decimal permissively: thousands separators stripped,
/// scientific notation accepted via an f64 round-trip.
fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "null" || cleaned == "-" || cleaned == "N/A" {
        return None;
    }

    if let Ok(d) = Decimal::from_str(&cleaned) {
        return Some(d);
    }

    // Scientific notation ("7.314e-05") falls back through f64.
    let f: f64 = cleaned.parse().ok()?;
    Decimal::try_from(f).ok()
}

/// Volume appears as integers, decimals ("1234.0"), or with separators.
fn parse_volume(raw: &str) -> Option<i64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "null" || cleaned == "-" || cleaned == "N/A" {
        return None;
    }

    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    parse_decimal(&cleaned).and_then(|d| i64::try_from(d.trunc()).ok())
}

/// Payload tickers match with or without the exchange suffix, in any
/// case ("BBCA", "bbca.jk", "BBCA.JK" all match BBCA.JK).
fn ticker_matches(raw: &str, expected: &TickerSymbol) -> bool {
    let raw = raw.trim().to_uppercase();
    raw.is_empty() || raw == expected.as_str() || raw == expected.code()
}
