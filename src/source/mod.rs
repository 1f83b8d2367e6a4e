//! Source adapter abstractions and implementations
//!
//! This module defines the pluggable source interface and implements the
//! concrete adapters: Stooq and Yahoo CSV downloads, the Alpha Vantage
//! API, the browser-automation scraper, the filesystem manual-drop
//! reader, and a scripted mock for testing.

mod alphavantage;
mod browser;
pub mod factory;
mod http;
mod manual;
mod mock;
mod stooq;
mod traits;
mod yahoo;

pub use alphavantage::AlphaVantageAdapter;
pub use browser::BrowserAdapter;
pub use manual::ManualDropAdapter;
pub use mock::MockAdapter;
pub use stooq::StooqAdapter;
pub use traits::*;
pub use yahoo::YahooAdapter;
