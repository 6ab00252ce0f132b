//! fxstream Protocol
//!
//! Message types and the `fxstream.Currency` gRPC service. Messages are
//! declared with prost derives in [`messages`]; client and server stubs are
//! generated at build time into [`currency`].

pub mod convert;
pub mod messages;
pub mod status;

/// Generated client and server for the `fxstream.Currency` service.
pub mod currency {
    include!(concat!(env!("OUT_DIR"), "/fxstream.Currency.rs"));
}

pub use currency::currency_client::CurrencyClient;
pub use currency::currency_server::{Currency, CurrencyServer};
pub use messages::*;
pub use status::{status_from_details, validation_status};
