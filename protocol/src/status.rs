//! Structured error reports carried on the wire.
//!
//! The same [`RpcStatus`] message is used as the `error` arm of a
//! `StreamingRateResponse` and, encoded, as the `grpc-status-details-bin`
//! payload of unary errors.

use bytes::Bytes;
use prost::Message;
use tonic::{Code, Status};

use crate::messages::{RateRequest, RpcStatus, RATE_REQUEST_TYPE_URL};

/// Build a report for a rejected request, with the request itself attached
/// as a detail.
pub fn validation_status(code: Code, message: impl Into<String>, request: &RateRequest) -> RpcStatus {
    RpcStatus {
        code: code as i32,
        message: message.into(),
        details: vec![prost_types::Any {
            type_url: RATE_REQUEST_TYPE_URL.to_string(),
            value: request.encode_to_vec(),
        }],
    }
}

/// Decode the structured report attached to a unary error, if any.
pub fn status_from_details(status: &Status) -> Option<RpcStatus> {
    if status.details().is_empty() {
        return None;
    }
    RpcStatus::decode(status.details()).ok()
}

impl RpcStatus {
    /// The status code as a `tonic::Code`.
    pub fn grpc_code(&self) -> Code {
        Code::from(self.code)
    }

    /// The offending request, if one was attached.
    pub fn rate_request(&self) -> Option<RateRequest> {
        self.details
            .iter()
            .find(|detail| detail.type_url == RATE_REQUEST_TYPE_URL)
            .and_then(|detail| RateRequest::decode(detail.value.as_slice()).ok())
    }

    /// Convert into a `tonic::Status` carrying this report as its details.
    pub fn into_status(self) -> Status {
        let code = self.grpc_code();
        let message = self.message.clone();
        Status::with_details(code, message, Bytes::from(self.encode_to_vec()))
    }
}
