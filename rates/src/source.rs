//! Rate source trait and implementations.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use crate::error::{SourceError, SourceResult};

/// Daily euro foreign exchange reference rates published by the ECB.
pub const ECB_DAILY_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";

/// Raw rates as published by a source: currency code to decimal rate string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRates {
    /// Publication date of the document, if the source states one.
    pub as_of: Option<NaiveDate>,
    /// Rates in document order. Values are left unparsed.
    pub rates: Vec<(String, String)>,
}

/// Trait for initial rate sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Pull the current rates.
    async fn fetch(&self) -> SourceResult<SourceRates>;
}

/// Pulls the ECB daily reference-rate document over HTTP.
pub struct EcbRateSource {
    url: String,
    client: reqwest::Client,
}

impl EcbRateSource {
    /// Create a source reading from `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Get the endpoint this source reads from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for EcbRateSource {
    fn default() -> Self {
        Self {
            url: ECB_DAILY_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RateSource for EcbRateSource {
    fn name(&self) -> &str {
        "ECB"
    }

    async fn fetch(&self) -> SourceResult<SourceRates> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let rates = parse_ecb_document(&body)?;

        debug!(
            url = %self.url,
            count = rates.rates.len(),
            "Fetched reference rates"
        );

        Ok(rates)
    }
}

/// Extract `(currency, rate)` pairs from an ECB reference-rate document.
///
/// Every `Cube` element carrying both a `currency` and a `rate` attribute is
/// taken; the `time` attribute of the enclosing cube becomes `as_of`.
pub fn parse_ecb_document(xml: &str) -> SourceResult<SourceRates> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut parsed = SourceRates::default();

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"Cube" =>
            {
                let mut currency = None;
                let mut rate = None;

                for attr in element.attributes() {
                    let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
                    let value = attr.unescape_value()?.into_owned();

                    match attr.key.local_name().as_ref() {
                        b"currency" => currency = Some(value),
                        b"rate" => rate = Some(value),
                        b"time" => parsed.as_of = NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok(),
                        _ => {}
                    }
                }

                if let (Some(currency), Some(rate)) = (currency, rate) {
                    parsed.rates.push((currency, rate));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(parsed)
}

/// Serves a fixed set of rates. Used for offline runs and tests.
pub struct StaticRateSource {
    rates: BTreeMap<String, String>,
}

impl StaticRateSource {
    /// Create a source from `(code, rate)` pairs.
    pub fn new<I, K, V>(rates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Self {
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.into(), rate.to_string()))
                .collect(),
        }
    }

    /// A small built-in table of major currencies against EUR.
    pub fn majors() -> Self {
        Self::new([
            ("USD", "1.0842"),
            ("JPY", "163.12"),
            ("GBP", "0.8571"),
            ("CHF", "0.9608"),
            ("AUD", "1.6493"),
            ("CAD", "1.4738"),
            ("SEK", "11.4470"),
            ("NOK", "11.6545"),
        ])
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch(&self) -> SourceResult<SourceRates> {
        Ok(SourceRates {
            as_of: None,
            rates: self
                .rates
                .iter()
                .map(|(code, rate)| (code.clone(), rate.clone()))
                .collect(),
        })
    }
}
