//! Conversions between wire messages and domain types.

use chrono::{DateTime, Utc};
use fxstream_common::{RatePair, RateUpdate};

use crate::messages::{RateRequest, RateResponse};

impl From<&RatePair> for RateRequest {
    fn from(pair: &RatePair) -> Self {
        Self {
            base: pair.base.to_string(),
            destination: pair.destination.to_string(),
        }
    }
}

impl From<RateRequest> for RatePair {
    fn from(request: RateRequest) -> Self {
        RatePair::new(request.base, request.destination)
    }
}

impl From<&RateRequest> for RatePair {
    fn from(request: &RateRequest) -> Self {
        RatePair::new(request.base.as_str(), request.destination.as_str())
    }
}

impl From<RateUpdate> for RateResponse {
    fn from(update: RateUpdate) -> Self {
        Self {
            base: update.pair.base.to_string(),
            destination: update.pair.destination.to_string(),
            rate: update.rate,
            updated_at: Some(timestamp(update.as_of)),
        }
    }
}

impl RateResponse {
    /// The pair this rate applies to.
    pub fn pair(&self) -> RatePair {
        RatePair::new(self.base.as_str(), self.destination.as_str())
    }

    /// The table refresh time as a UTC timestamp.
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.updated_at
            .as_ref()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.seconds, u32::try_from(ts.nanos).ok()?))
    }
}

/// Convert a UTC timestamp to its protobuf representation.
pub fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}
