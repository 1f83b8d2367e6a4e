//! Canonical market data schema
//!
//! All source-specific payloads are normalized into these types before
//! validation or export.

mod bars;
mod dialect;

pub use bars::{CanonicalBar, CanonicalSeries};
pub use dialect::{canonical_field, normalize_column, CanonicalField, Dialect};
