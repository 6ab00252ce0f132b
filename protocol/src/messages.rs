//! Protocol message types.
//!
//! Hand-declared prost messages matching `proto/currency.proto`.

/// A pair of currency codes, used both for `GetRate` and as one subscription
/// on the `SubscribeRates` stream.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct RateRequest {
    #[prost(string, tag = "1")]
    pub base: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub destination: ::prost::alloc::string::String,
}

/// A cross rate for one pair.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RateResponse {
    #[prost(string, tag = "1")]
    pub base: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub destination: ::prost::alloc::string::String,
    #[prost(double, tag = "3")]
    pub rate: f64,
    /// When the server's rate table was last refreshed.
    #[prost(message, optional, tag = "4")]
    pub updated_at: ::core::option::Option<::prost_types::Timestamp>,
}

/// Error report, wire-compatible with `google.rpc.Status`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    /// A `tonic::Code` value.
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub details: ::prost::alloc::vec::Vec<::prost_types::Any>,
}

/// One message on the server side of `SubscribeRates`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamingRateResponse {
    #[prost(oneof = "streaming_rate_response::Message", tags = "1, 2")]
    pub message: ::core::option::Option<streaming_rate_response::Message>,
}

/// Nested message and enum types in `StreamingRateResponse`.
pub mod streaming_rate_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        RateResponse(super::RateResponse),
        #[prost(message, tag = "2")]
        Error(super::RpcStatus),
    }
}

/// Fully qualified name of [`RateRequest`], used in `Any` type URLs.
pub const RATE_REQUEST_TYPE_URL: &str = "type.googleapis.com/fxstream.RateRequest";

impl StreamingRateResponse {
    /// Wrap a rate update.
    pub fn rate(response: RateResponse) -> Self {
        Self {
            message: Some(streaming_rate_response::Message::RateResponse(response)),
        }
    }

    /// Wrap an error report.
    pub fn error(status: RpcStatus) -> Self {
        Self {
            message: Some(streaming_rate_response::Message::Error(status)),
        }
    }
}
