//! fxstream Rates
//!
//! The in-memory rate table and everything that feeds it.
//!
//! # Features
//!
//! - A rate table keyed by currency code, relative to a pinned reference
//!   currency, with atomic whole-table ticks
//! - Cross rates computed on lookup
//! - Pluggable initial rate sources (ECB daily reference rates, static maps)
//! - Pluggable per-tick rate mutators
//! - A fixed-interval ticker that hands every tick to one listener through a
//!   rendezvous, so a slow listener always sees the freshest table
//!
//! # Example
//!
//! ```rust,ignore
//! use fxstream_rates::{EcbRateSource, RandomWalkMutator, RateStore, RateTicker};
//!
//! let store = Arc::new(RateStore::load(&EcbRateSource::default()).await);
//! let rate = store.get_rate(&"USD".into(), &"GBP".into())?;
//!
//! let (notices, listener) = fxstream_rates::rendezvous();
//! let ticker = RateTicker::new(store.clone(), Arc::new(RandomWalkMutator::new(0.1)), interval);
//! tokio::spawn(ticker.run(notices, shutdown_rx));
//! ```

pub mod error;
pub mod mutator;
pub mod source;
pub mod store;
pub mod ticker;

pub use error::{ListenerGone, RateError, RateResult, SourceError, SourceResult};
pub use mutator::{RandomWalkMutator, RateMutator};
pub use source::{EcbRateSource, RateSource, SourceRates, StaticRateSource, ECB_DAILY_URL};
pub use store::RateStore;
pub use ticker::{rendezvous, RateTicker, TickNotice, TickReceiver, TickSender};
