//! Currency and rate types shared by the rate store and the streaming server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code of the reference currency. Its rate is pinned to exactly 1.0 and
/// every other rate in the table is expressed relative to it.
pub const REFERENCE_CURRENCY: &str = "EUR";

/// Short currency code such as `USD`.
///
/// Codes are case-sensitive: the canonical form is uppercase and no folding
/// is applied, so `usd` and `USD` are different codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new currency code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The reference currency.
    pub fn reference() -> Self {
        Self::new(REFERENCE_CURRENCY)
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reference currency.
    pub fn is_reference(&self) -> bool {
        self.0 == REFERENCE_CURRENCY
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An ordered `(base, destination)` pair. `EUR/USD` and `USD/EUR` are
/// different pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatePair {
    /// Currency the rate is quoted from.
    pub base: CurrencyCode,
    /// Currency the rate is quoted into.
    pub destination: CurrencyCode,
}

impl RatePair {
    /// Create a new rate pair.
    pub fn new(base: impl Into<CurrencyCode>, destination: impl Into<CurrencyCode>) -> Self {
        Self {
            base: base.into(),
            destination: destination.into(),
        }
    }

    /// A pair quoting a currency into itself carries no information and is
    /// never accepted for lookup or subscription.
    pub fn is_same_currency(&self) -> bool {
        self.base == self.destination
    }
}

impl fmt::Display for RatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.destination)
    }
}

/// A computed cross rate for one pair at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateUpdate {
    /// The pair the rate applies to.
    pub pair: RatePair,
    /// Units of `destination` per one unit of `base`.
    pub rate: f64,
    /// When the underlying table was last refreshed.
    pub as_of: DateTime<Utc>,
}

impl RateUpdate {
    /// Create a new rate update.
    pub fn new(pair: RatePair, rate: f64, as_of: DateTime<Utc>) -> Self {
        Self { pair, rate, as_of }
    }
}
