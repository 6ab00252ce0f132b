//! Rate store and rate source error types.

use fxstream_common::CurrencyCode;
use thiserror::Error;

/// Errors returned by rate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// The currency code is not present in the rate table.
    #[error("Rate not found for currency {0}")]
    CurrencyNotFound(CurrencyCode),
}

impl RateError {
    /// The code that caused the failure.
    pub fn currency(&self) -> &CurrencyCode {
        match self {
            RateError::CurrencyNotFound(code) => code,
        }
    }
}

/// Result type for rate lookups.
pub type RateResult<T> = Result<T, RateError>;

/// Errors raised while pulling the initial rates from a rate source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The HTTP request could not be completed.
    #[error("Rate source request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The rate source answered with an unexpected status code.
    #[error("Expected success code 200, got {0}")]
    Status(u16),

    /// The rate document could not be parsed.
    #[error("Malformed rate document: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Result type for rate source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Raised by the ticker when nobody is left to take its notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Tick listener has gone away")]
pub struct ListenerGone;
