//! Per-connection subscription sessions.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use fxstream_common::{RatePair, SessionId};
use tokio::sync::mpsc;
use tonic::Status;
use tracing::{debug, info, instrument, warn};

use crate::metrics::SharedMetrics;
use crate::registry::{StreamEvent, SubscriptionRegistry};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading subscription requests.
    Open,
    /// Subscriptions have been dropped.
    Closed,
}

/// Reads one client's subscription requests and registers them.
///
/// The session's subscriptions are removed when `run` returns or, if the task
/// is cancelled first, when the session is dropped.
pub struct SubscriptionSession {
    id: SessionId,
    state: SessionState,
    registry: Arc<SubscriptionRegistry>,
    metrics: SharedMetrics,
}

impl SubscriptionSession {
    /// Register a new session, returning it together with the receiving end
    /// of its outbound stream.
    pub fn open(
        registry: Arc<SubscriptionRegistry>,
        metrics: SharedMetrics,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let id = SessionId::new();
        let events = registry.open(id);
        metrics.session_opened();

        let session = Self {
            id,
            state: SessionState::Open,
            registry,
            metrics,
        };

        (session, events)
    }

    /// Session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consume subscription requests until the client closes its side.
    ///
    /// Refused requests are reported on the outbound stream and reading
    /// continues. An inbound transport error ends the session and is returned.
    #[instrument(skip(self, inbound), fields(session = %self.id))]
    pub async fn run<S>(mut self, mut inbound: S) -> Result<(), Status>
    where
        S: Stream<Item = Result<RatePair, Status>> + Unpin + Send,
    {
        info!("Subscription session started");

        let result = loop {
            match inbound.next().await {
                Some(Ok(pair)) => self.subscribe(pair).await,
                Some(Err(status)) => {
                    warn!(code = ?status.code(), message = %status.message(), "Inbound stream failed");
                    break Err(status);
                }
                None => {
                    debug!("Client closed subscription stream");
                    break Ok(());
                }
            }
        };

        self.close();
        result
    }

    async fn subscribe(&mut self, pair: RatePair) {
        match self.registry.register(&self.id, pair.clone()) {
            Ok(()) => {
                self.metrics.subscription_accepted();
                info!(pair = %pair, "Subscribed");
            }
            Err(error) => {
                self.metrics.subscription_rejected();
                debug!(pair = %pair, error = %error, "Subscription refused");

                let Some(sender) = self.registry.sender(&self.id) else {
                    return;
                };
                if sender
                    .send(StreamEvent::Rejected { pair, error })
                    .await
                    .is_err()
                {
                    debug!("Outbound stream closed before refusal could be sent");
                }
            }
        }
    }

    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.state = SessionState::Closed;
        self.registry.remove(&self.id);
        self.metrics.session_closed();
        info!(session = %self.id, "Subscription session closed");
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscriptionError;
    use crate::metrics::Metrics;
    use futures::channel::mpsc::unbounded;
    use tonic::Code;

    fn setup() -> (Arc<SubscriptionRegistry>, SharedMetrics) {
        (Arc::new(SubscriptionRegistry::new(8)), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_session_registers_pairs() {
        let (registry, metrics) = setup();
        let (session, _events) = SubscriptionSession::open(registry.clone(), metrics.clone());
        let id = session.id();

        let (tx, rx) = unbounded();
        let task = tokio::spawn(session.run(rx));

        tx.unbounded_send(Ok(RatePair::new("EUR", "USD"))).unwrap();
        tx.unbounded_send(Ok(RatePair::new("GBP", "JPY"))).unwrap();

        while registry.subscriptions(&id).map_or(0, |p| p.len()) < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            registry.subscriptions(&id).unwrap(),
            vec![RatePair::new("EUR", "USD"), RatePair::new("GBP", "JPY")]
        );

        drop(tx);
        assert!(task.await.unwrap().is_ok());
        assert!(!registry.contains(&id));
        assert_eq!(metrics.snapshot().sessions_active, 0);
    }

    #[tokio::test]
    async fn test_same_currency_reported_and_stream_stays_open() {
        let (registry, metrics) = setup();
        let (session, mut events) = SubscriptionSession::open(registry.clone(), metrics);
        let id = session.id();

        let (tx, rx) = unbounded();
        let task = tokio::spawn(session.run(rx));

        tx.unbounded_send(Ok(RatePair::new("EUR", "EUR"))).unwrap();
        match events.recv().await.unwrap() {
            StreamEvent::Rejected { pair, error } => {
                assert_eq!(pair, RatePair::new("EUR", "EUR"));
                assert_eq!(error.grpc_code(), Code::InvalidArgument);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Still reading.
        tx.unbounded_send(Ok(RatePair::new("EUR", "USD"))).unwrap();
        while registry.subscriptions(&id).map_or(0, |p| p.len()) < 1 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        drop(tx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_reported() {
        let (registry, metrics) = setup();
        let (session, mut events) = SubscriptionSession::open(registry, metrics.clone());

        let (tx, rx) = unbounded();
        let task = tokio::spawn(session.run(rx));

        tx.unbounded_send(Ok(RatePair::new("EUR", "USD"))).unwrap();
        tx.unbounded_send(Ok(RatePair::new("EUR", "USD"))).unwrap();

        match events.recv().await.unwrap() {
            StreamEvent::Rejected { error, .. } => {
                assert_eq!(
                    error,
                    SubscriptionError::AlreadyExists(RatePair::new("EUR", "USD"))
                );
            }
            other => panic!("unexpected event {:?}", other),
        }

        drop(tx);
        task.await.unwrap().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.subscriptions_accepted, 1);
        assert_eq!(snapshot.subscriptions_rejected, 1);
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let (registry, metrics) = setup();
        let (session, mut events) = SubscriptionSession::open(registry.clone(), metrics);
        let id = session.id();

        let (tx, rx) = unbounded();
        tx.unbounded_send(Ok(RatePair::new("EUR", "USD"))).unwrap();
        tx.unbounded_send(Err(Status::cancelled("client went away"))).unwrap();

        let result = session.run(rx).await;
        assert_eq!(result.unwrap_err().code(), Code::Cancelled);
        assert!(!registry.contains(&id));

        // Every sender is gone, so the outbound stream ends.
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_session_is_removed() {
        let (registry, metrics) = setup();
        let (session, _events) = SubscriptionSession::open(registry.clone(), metrics.clone());
        let id = session.id();

        let (_tx, rx) = unbounded::<Result<RatePair, Status>>();
        let task = tokio::spawn(session.run(rx));
        tokio::task::yield_now().await;
        assert!(registry.contains(&id));

        task.abort();
        let _ = task.await;

        assert!(!registry.contains(&id));
        assert_eq!(metrics.snapshot().sessions_closed, 1);
    }
}
