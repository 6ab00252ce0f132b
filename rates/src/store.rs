//! The in-memory rate table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fxstream_common::{CurrencyCode, RatePair, RateUpdate};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{RateError, RateResult};
use crate::mutator::RateMutator;
use crate::source::RateSource;
use crate::ticker::TickNotice;

#[derive(Debug, Clone)]
struct RateTable {
    rates: HashMap<CurrencyCode, f64>,
    updated_at: DateTime<Utc>,
    ticks: u64,
}

impl RateTable {
    fn lookup(&self, code: &CurrencyCode) -> RateResult<f64> {
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| RateError::CurrencyNotFound(code.clone()))
    }
}

/// Thread-safe rate table keyed by currency code.
///
/// All values are relative to the reference currency, which is pinned at
/// exactly 1.0. Codes are only ever added at load time; ticks update values in
/// place and never remove a code.
pub struct RateStore {
    table: RwLock<RateTable>,
}

impl RateStore {
    /// Create a store from already-parsed rates. The reference currency is
    /// always present at 1.0, whatever `rates` says about it.
    pub fn from_rates<I, K>(rates: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<CurrencyCode>,
    {
        let mut table: HashMap<CurrencyCode, f64> = HashMap::new();

        for (code, rate) in rates {
            let code = code.into();
            if is_usable_rate(rate) {
                table.insert(code, rate);
            } else {
                warn!(currency = %code, rate, "Ignoring non-positive rate");
            }
        }

        table.insert(CurrencyCode::reference(), 1.0);

        Self {
            table: RwLock::new(RateTable {
                rates: table,
                updated_at: Utc::now(),
                ticks: 0,
            }),
        }
    }

    /// Load the initial table from a rate source.
    ///
    /// A failing source does not fail the load: the store starts with only
    /// the reference currency and the failure is logged.
    pub async fn load(source: &dyn RateSource) -> Self {
        let fetched = match source.fetch().await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(source = source.name(), error = %e, "Unable to fetch initial rates");
                return Self::from_rates(std::iter::empty::<(CurrencyCode, f64)>());
            }
        };

        let mut parsed = Vec::with_capacity(fetched.rates.len());
        for (code, raw) in fetched.rates {
            match raw.trim().parse::<f64>() {
                Ok(rate) => parsed.push((CurrencyCode::new(code), rate)),
                Err(e) => {
                    warn!(source = source.name(), currency = %code, rate = %raw, error = %e, "Skipping unparsable rate");
                }
            }
        }

        let store = Self::from_rates(parsed);

        info!(
            source = source.name(),
            as_of = ?fetched.as_of,
            currencies = store.len(),
            "Loaded initial rates"
        );

        store
    }

    /// Get the cross rate from `base` to `destination`:
    /// `rate[destination] / rate[base]`.
    pub fn get_rate(&self, base: &CurrencyCode, destination: &CurrencyCode) -> RateResult<f64> {
        let table = self.table.read();
        let base_rate = table.lookup(base)?;
        let destination_rate = table.lookup(destination)?;

        Ok(destination_rate / base_rate)
    }

    /// Get the cross rate for a pair together with the table's update time.
    pub fn quote(&self, pair: &RatePair) -> RateResult<RateUpdate> {
        let table = self.table.read();
        let base_rate = table.lookup(&pair.base)?;
        let destination_rate = table.lookup(&pair.destination)?;

        Ok(RateUpdate::new(
            pair.clone(),
            destination_rate / base_rate,
            table.updated_at,
        ))
    }

    /// Apply one tick: replace every rate with the mutator's output.
    ///
    /// The whole pass runs under one write guard, so readers observe either
    /// the previous table or the new one. Results that are not strictly
    /// positive and finite are discarded and the previous rate is kept.
    pub fn apply_tick(&self, mutator: &dyn RateMutator) -> TickNotice {
        let mut table = self.table.write();

        for (code, rate) in table.rates.iter_mut() {
            if code.is_reference() {
                *rate = 1.0;
                continue;
            }

            let next = mutator.mutate(code, *rate);
            if is_usable_rate(next) {
                *rate = next;
            } else {
                warn!(currency = %code, current = *rate, proposed = next, "Mutator produced an unusable rate");
            }
        }

        table.ticks += 1;
        table.updated_at = Utc::now();

        debug!(tick = table.ticks, currencies = table.rates.len(), "Applied rate tick");

        TickNotice {
            sequence: table.ticks,
            at: table.updated_at,
        }
    }

    /// Copy of the whole table, sorted by code.
    pub fn snapshot(&self) -> Vec<(CurrencyCode, f64)> {
        let mut rates: Vec<(CurrencyCode, f64)> = self
            .table
            .read()
            .rates
            .iter()
            .map(|(code, rate)| (code.clone(), *rate))
            .collect();
        rates.sort_by(|a, b| a.0.cmp(&b.0));
        rates
    }

    /// All known currency codes, sorted.
    pub fn codes(&self) -> Vec<CurrencyCode> {
        self.snapshot().into_iter().map(|(code, _)| code).collect()
    }

    /// Check whether a code is present.
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.table.read().rates.contains_key(code)
    }

    /// Get the number of currencies in the table.
    pub fn len(&self) -> usize {
        self.table.read().rates.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.read().rates.is_empty()
    }

    /// Number of ticks applied so far.
    pub fn tick_count(&self) -> u64 {
        self.table.read().ticks
    }

    /// When the table was last loaded or ticked.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.table.read().updated_at
    }
}

fn is_usable_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}
