//! Server error types.

use fxstream_common::{RatePair, SessionId};
use thiserror::Error;
use tonic::Code;

/// Reasons a subscription request is refused. These are reported to the
/// client over its stream and never end the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Base and destination are the same currency.
    #[error("Base currency {} cannot be the same as the destination currency {}", .0.base, .0.destination)]
    SameCurrency(RatePair),

    /// The session already subscribes to this pair.
    #[error("Unable to subscribe for {0} as subscription already exists")]
    AlreadyExists(RatePair),

    /// The session is not (or no longer) registered.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}

impl SubscriptionError {
    /// gRPC status code reported to the client.
    pub fn grpc_code(&self) -> Code {
        match self {
            SubscriptionError::SameCurrency(_) => Code::InvalidArgument,
            SubscriptionError::AlreadyExists(_) => Code::AlreadyExists,
            SubscriptionError::UnknownSession(_) => Code::NotFound,
        }
    }
}

/// Failure to push a message onto a client's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The client's stream has gone away.
    #[error("Stream for session {0} is closed")]
    Closed(SessionId),

    /// The client's stream did not accept the message in time.
    #[error("Stream for session {0} did not accept the update in time")]
    Timeout(SessionId),
}

impl DeliveryError {
    /// Whether later messages to the same session are bound to fail too.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Closed(_))
    }
}

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The listener could not be set up.
    #[error("Unable to listen: {0}")]
    Bind(String),

    /// The gRPC transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
