//! Canonical daily bar types
//!
//! These types represent the canonical format for all price-bar data in
//! the system. Source-specific payloads are normalized to these types
//! before validation, storage, or export.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbol::TickerSymbol;

/// Normalized daily OHLCV bar
///
/// `close` is always present; rows without a parseable date or close are
/// dropped during normalization. The remaining fields stay optional so
/// the quality gates can observe the gaps instead of silently filling
/// them. Volume is signed for the same reason: a negative value from a
/// source must survive long enough for the consistency check to count it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBar {
    /// Trading date (no time component)
    pub date: NaiveDate,
    /// Opening price
    pub open: Option<Decimal>,
    /// High price
    pub high: Option<Decimal>,
    /// Low price
    pub low: Option<Decimal>,
    /// Closing price
    pub close: Decimal,
    /// Traded volume in shares
    pub volume: Option<i64>,
    /// Adjusted closing price, when the source provides one
    pub adjusted_close: Option<Decimal>,
}

impl CanonicalBar {
    /// Create a bar carrying only the required fields.
    pub fn new(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
            adjusted_close: None,
        }
    }

    /// `low <= high`, vacuously true when either side is missing.
    pub fn range_ordered(&self) -> bool {
        match (self.low, self.high) {
            (Some(low), Some(high)) => low <= high,
            _ => true,
        }
    }

    /// `low <= close <= high`, checked per available bound.
    pub fn close_within_range(&self) -> bool {
        let above_low = self.low.map(|low| self.close >= low).unwrap_or(true);
        let below_high = self.high.map(|high| self.close <= high).unwrap_or(true);
        above_low && below_high
    }

    /// `volume >= 0`, vacuously true when missing.
    pub fn volume_non_negative(&self) -> bool {
        self.volume.map(|v| v >= 0).unwrap_or(true)
    }
}

/// A ticker-scoped, date-ordered series of canonical bars.
///
/// Construction sorts ascending by date and deduplicates so that exactly
/// one bar exists per date, with the last occurrence in the input winning.
/// There is no mutating API; a series handed to the validator is final.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSeries {
    ticker: TickerSymbol,
    bars: Vec<CanonicalBar>,
}

impl CanonicalSeries {
    /// Build a series from unordered, possibly duplicated bars.
    pub fn new(ticker: TickerSymbol, mut bars: Vec<CanonicalBar>) -> Self {
        // Stable sort keeps input order within a date, so keeping the
        // last entry per date below implements last-write-wins.
        bars.sort_by_key(|bar| bar.date);

        let mut deduped: Vec<CanonicalBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }

        Self {
            ticker,
            bars: deduped,
        }
    }

    pub fn ticker(&self) -> &TickerSymbol {
        &self.ticker
    }

    pub fn bars(&self) -> &[CanonicalBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Date of the most recent bar
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }

    /// First and last bar dates
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.bars.first(), self.bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    /// Whether any bar carries an adjusted close.
    pub fn has_adjusted_close(&self) -> bool {
        self.bars.iter().any(|bar| bar.adjusted_close.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ticker() -> TickerSymbol {
        TickerSymbol::parse("BBCA.JK").unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn bar(d: u32, close: Decimal) -> CanonicalBar {
        CanonicalBar::new(date(d), close)
    }

    #[test]
    fn series_sorts_by_date() {
        let series = CanonicalSeries::new(
            ticker(),
            vec![bar(3, dec!(10)), bar(1, dec!(8)), bar(2, dec!(9))],
        );

        let dates: Vec<_> = series.bars().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(3)]);
    }

    #[test]
    fn series_dedupes_last_write_wins() {
        let series = CanonicalSeries::new(
            ticker(),
            vec![bar(1, dec!(8)), bar(2, dec!(9)), bar(2, dec!(11))],
        );

        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[1].close, dec!(11));
    }

    #[test]
    fn latest_date_and_span() {
        let series = CanonicalSeries::new(ticker(), vec![bar(5, dec!(1)), bar(2, dec!(2))]);
        assert_eq!(series.latest_date(), Some(date(5)));
        assert_eq!(series.date_span(), Some((date(2), date(5))));

        let empty = CanonicalSeries::new(ticker(), vec![]);
        assert_eq!(empty.latest_date(), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn invariant_predicates() {
        let mut b = bar(1, dec!(50));
        b.low = Some(dec!(40));
        b.high = Some(dec!(60));
        b.volume = Some(1000);
        assert!(b.range_ordered());
        assert!(b.close_within_range());
        assert!(b.volume_non_negative());

        b.high = Some(dec!(30));
        assert!(!b.range_ordered());
        assert!(!b.close_within_range()); // close 50 > high 30

        b.high = Some(dec!(60));
        b.volume = Some(-5);
        assert!(!b.volume_non_negative());
    }

    #[test]
    fn missing_bounds_are_vacuously_valid() {
        let b = bar(1, dec!(50));
        assert!(b.range_ordered());
        assert!(b.close_within_range());
        assert!(b.volume_non_negative());
    }

    proptest! {
        /// The structural predicates must agree with the arithmetic they
        /// claim to check, for any combination of present/absent fields.
        #[test]
        fn predicates_match_arithmetic(
            low in proptest::option::of(1i64..10_000),
            high in proptest::option::of(1i64..10_000),
            close in 1i64..10_000,
            volume in proptest::option::of(-1_000i64..1_000_000),
        ) {
            let b = CanonicalBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: None,
                low: low.map(Decimal::from),
                high: high.map(Decimal::from),
                close: Decimal::from(close),
                volume,
                adjusted_close: None,
            };

            let expect_range = match (low, high) {
                (Some(l), Some(h)) => l <= h,
                _ => true,
            };
            prop_assert_eq!(b.range_ordered(), expect_range);

            let expect_close = low.map(|l| close >= l).unwrap_or(true)
                && high.map(|h| close <= h).unwrap_or(true);
            prop_assert_eq!(b.close_within_range(), expect_close);

            prop_assert_eq!(b.volume_non_negative(), volume.map(|v| v >= 0).unwrap_or(true));
        }

        /// One bar per date after construction, dates strictly ascending.
        #[test]
        fn series_is_strictly_ascending_and_unique(
            days in proptest::collection::vec(1u32..28, 0..40),
        ) {
            let bars: Vec<_> = days
                .iter()
                .map(|d| bar(*d, Decimal::from(*d)))
                .collect();
            let series = CanonicalSeries::new(ticker(), bars);

            let dates: Vec<_> = series.bars().iter().map(|b| b.date).collect();
            for pair in dates.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
