//! fxstream Server
//!
//! Serves currency exchange rates over gRPC: single lookups through `GetRate`
//! and live updates through the bidirectional `SubscribeRates` stream. Every
//! tick of the rate table is fanned out to exactly the sessions that
//! subscribed to the affected pairs.

pub mod config;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;
pub mod state;

pub use config::{LogFormat, RateSourceKind, ServerConfig};
pub use error::{DeliveryError, ServerError, ServerResult, SubscriptionError};
pub use fanout::{FanoutEngine, FanoutReport};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use registry::{StreamEvent, SubscriberSnapshot, SubscriptionRegistry};
pub use server::RateServer;
pub use service::CurrencyService;
pub use session::{SessionState, SubscriptionSession};
pub use state::ServerState;
