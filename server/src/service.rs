//! gRPC `fxstream.Currency` service.

use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use fxstream_common::RatePair;
use fxstream_protocol::{
    validation_status, Currency, RateRequest, RateResponse, StreamingRateResponse,
};
use fxstream_rates::RateStore;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::{debug, info, instrument, warn};

use crate::metrics::SharedMetrics;
use crate::registry::{StreamEvent, SubscriptionRegistry};
use crate::session::SubscriptionSession;
use crate::state::ServerState;

/// Outbound half of a `SubscribeRates` call.
pub type RateStream = Pin<Box<dyn Stream<Item = Result<StreamingRateResponse, Status>> + Send>>;

/// Serves rate lookups and subscriptions from the shared rate table.
#[derive(Clone)]
pub struct CurrencyService {
    store: Arc<RateStore>,
    registry: Arc<SubscriptionRegistry>,
    metrics: SharedMetrics,
    state: Arc<RwLock<ServerState>>,
    shutdown: watch::Receiver<bool>,
}

impl CurrencyService {
    /// Create a new service.
    pub fn new(
        store: Arc<RateStore>,
        registry: Arc<SubscriptionRegistry>,
        metrics: SharedMetrics,
        state: Arc<RwLock<ServerState>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            registry,
            metrics,
            state,
            shutdown,
        }
    }

    fn ensure_running(&self) -> Result<(), Status> {
        let state = *self.state.read();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(Status::unavailable(format!("Server is {:?}", state)))
        }
    }

    /// Look up the current rate for one pair.
    pub fn quote(&self, request: &RateRequest) -> Result<RateResponse, Status> {
        let pair = RatePair::from(request);

        if pair.is_same_currency() {
            let message = format!(
                "Base currency {} cannot be the same as the destination currency {}",
                pair.base, pair.destination
            );
            return Err(validation_status(Code::InvalidArgument, message, request).into_status());
        }

        self.store.quote(&pair).map(RateResponse::from).map_err(|e| {
            debug!(pair = %pair, error = %e, "Rate lookup failed");
            validation_status(Code::NotFound, e.to_string(), request).into_status()
        })
    }

    fn outbound(&self, events: mpsc::Receiver<StreamEvent>) -> RateStream {
        let mut shutdown = self.shutdown.clone();

        let responses = stream::unfold(events, |mut events| async move {
            let event = events.recv().await?;
            Some((Ok(to_wire(event)), events))
        });

        let stopped = async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
        };

        Box::pin(responses.take_until(stopped))
    }
}

/// Map a session event onto the wire.
pub fn to_wire(event: StreamEvent) -> StreamingRateResponse {
    match event {
        StreamEvent::Rate(update) => StreamingRateResponse::rate(update.into()),
        StreamEvent::Rejected { pair, error } => StreamingRateResponse::error(validation_status(
            error.grpc_code(),
            error.to_string(),
            &RateRequest::from(&pair),
        )),
    }
}

#[tonic::async_trait]
impl Currency for CurrencyService {
    #[instrument(skip(self, request), fields(base, destination))]
    async fn get_rate(
        &self,
        request: Request<RateRequest>,
    ) -> Result<Response<RateResponse>, Status> {
        self.ensure_running()?;
        self.metrics.rate_request();

        let request = request.into_inner();
        let span = tracing::Span::current();
        span.record("base", request.base.as_str());
        span.record("destination", request.destination.as_str());

        self.quote(&request).map(Response::new)
    }

    type SubscribeRatesStream = RateStream;

    #[instrument(skip(self, request))]
    async fn subscribe_rates(
        &self,
        request: Request<Streaming<RateRequest>>,
    ) -> Result<Response<Self::SubscribeRatesStream>, Status> {
        self.ensure_running()?;

        let inbound = request
            .into_inner()
            .map(|message| message.map(RatePair::from));

        let (session, events) = SubscriptionSession::open(self.registry.clone(), self.metrics.clone());
        let session_id = session.id();
        info!(session = %session_id, "Subscription stream opened");

        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = session.run(inbound) => {
                    if let Err(status) = result {
                        warn!(
                            session = %session_id,
                            code = ?status.code(),
                            "Subscription stream ended with error"
                        );
                    }
                }
                _ = shutdown.wait_for(|stopping| *stopping) => {
                    debug!(session = %session_id, "Subscription stream cut by shutdown");
                }
            }
        });

        Ok(Response::new(self.outbound(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscriptionError;
    use crate::metrics::Metrics;
    use chrono::Utc;
    use fxstream_common::RateUpdate;
    use fxstream_protocol::{status_from_details, streaming_rate_response::Message};

    fn service(state: ServerState) -> (CurrencyService, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let service = CurrencyService::new(
            Arc::new(RateStore::from_rates([("USD", 1.1), ("GBP", 0.9)])),
            Arc::new(SubscriptionRegistry::new(8)),
            Arc::new(Metrics::new()),
            Arc::new(RwLock::new(state)),
            shutdown_rx,
        );
        (service, shutdown_tx)
    }

    fn request(base: &str, destination: &str) -> RateRequest {
        RateRequest {
            base: base.to_string(),
            destination: destination.to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_rate_cross_rate() {
        let (service, _shutdown) = service(ServerState::Running);

        let response = service
            .get_rate(Request::new(request("USD", "GBP")))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.base, "USD");
        assert_eq!(response.destination, "GBP");
        assert!((response.rate - 0.818).abs() < 1e-3);
        assert!(response.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_get_rate_same_currency() {
        let (service, _shutdown) = service(ServerState::Running);

        let status = service
            .get_rate(Request::new(request("EUR", "EUR")))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::InvalidArgument);
        let details = status_from_details(&status).unwrap();
        assert_eq!(details.rate_request(), Some(request("EUR", "EUR")));
    }

    #[tokio::test]
    async fn test_get_rate_unknown_code() {
        let (service, _shutdown) = service(ServerState::Running);

        let status = service
            .get_rate(Request::new(request("EUR", "XYZ")))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("XYZ"));
        assert!(status_from_details(&status).is_some());
    }

    #[tokio::test]
    async fn test_unavailable_unless_running() {
        let (service, _shutdown) = service(ServerState::Starting);

        let status = service
            .get_rate(Request::new(request("EUR", "USD")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[test]
    fn test_to_wire() {
        let update = RateUpdate::new(RatePair::new("EUR", "USD"), 1.21, Utc::now());
        match to_wire(StreamEvent::Rate(update)).message {
            Some(Message::RateResponse(rate)) => assert_eq!(rate.rate, 1.21),
            other => panic!("unexpected message {:?}", other),
        }

        let pair = RatePair::new("EUR", "EUR");
        let rejected = StreamEvent::Rejected {
            pair: pair.clone(),
            error: SubscriptionError::SameCurrency(pair),
        };
        match to_wire(rejected).message {
            Some(Message::Error(status)) => {
                assert_eq!(status.grpc_code(), Code::InvalidArgument);
                assert_eq!(status.rate_request(), Some(request("EUR", "EUR")));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outbound_ends_on_shutdown() {
        let (service, shutdown) = service(ServerState::Running);
        let (_tx, rx) = mpsc::channel(1);

        let mut outbound = service.outbound(rx);
        shutdown.send(true).unwrap();

        assert!(outbound.next().await.is_none());
    }
}
