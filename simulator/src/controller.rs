//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::channel::mpsc::unbounded;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{watch, RwLock};
use tonic::transport::Channel;
use tonic::Status;
use tracing::{debug, info, warn};

use fxstream_common::RatePair;
use fxstream_protocol::{streaming_rate_response::Message, CurrencyClient, RateRequest};

use crate::metrics::{ClientStats, SimulationMetrics};

/// Currencies the simulated clients pick pairs from.
pub const CURRENCIES: &[&str] = &["EUR", "USD", "JPY", "GBP", "CHF", "AUD", "CAD", "SEK", "NOK"];

/// Draw `count` pairs uniformly from [`CURRENCIES`].
///
/// Same-currency pairs and repeats are kept so that the server's validation
/// paths get exercised too.
pub fn random_pairs(rng: &mut StdRng, count: usize) -> Vec<RatePair> {
    (0..count)
        .map(|_| {
            let base = CURRENCIES[rng.gen_range(0..CURRENCIES.len())];
            let destination = CURRENCIES[rng.gen_range(0..CURRENCIES.len())];
            RatePair::new(base, destination)
        })
        .collect()
}

/// Drives a set of streaming clients against one server.
pub struct SimulationController {
    /// Server endpoint, e.g. `http://127.0.0.1:9092`.
    endpoint: String,
    /// Number of clients.
    client_count: usize,
    /// Pairs each client subscribes to.
    pairs_per_client: usize,
    /// Random number generator.
    rng: StdRng,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        endpoint: impl Into<String>,
        client_count: usize,
        pairs_per_client: usize,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            endpoint: endpoint.into(),
            client_count,
            pairs_per_client,
            rng,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
        }
    }

    /// Run every client until `duration` elapses, or until Ctrl+C when no
    /// duration is given.
    pub async fn run(&mut self, duration: Option<Duration>) -> anyhow::Result<Duration> {
        info!(
            endpoint = %self.endpoint,
            clients = self.client_count,
            pairs_per_client = self.pairs_per_client,
            "Starting simulation"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let started = Instant::now();

        let mut handles = Vec::with_capacity(self.client_count);
        for client in 0..self.client_count {
            let pairs = random_pairs(&mut self.rng, self.pairs_per_client);
            let endpoint = self.endpoint.clone();
            let metrics = self.metrics.clone();
            let stop = stop_rx.clone();

            handles.push(tokio::spawn(async move {
                match connect(&endpoint).await {
                    Ok(channel) => match run_client(client, channel, pairs, stop).await {
                        Ok(stats) => metrics.write().await.record_client(&stats),
                        Err(_) => metrics.write().await.record_connect_failure(),
                    },
                    Err(e) => {
                        warn!(client, error = %e, "Unable to connect");
                        metrics.write().await.record_connect_failure();
                    }
                }
            }));
        }

        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                info!("Press Ctrl+C to stop");
                tokio::signal::ctrl_c().await?;
            }
        }

        let _ = stop_tx.send(true);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Client task failed");
            }
        }

        Ok(started.elapsed())
    }

    /// Get a copy of the collected metrics.
    pub async fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }
}

async fn connect(endpoint: &str) -> anyhow::Result<Channel> {
    let channel = Channel::from_shared(endpoint.to_string())?.connect().await?;
    Ok(channel)
}

/// Subscribe to `pairs` and count what comes back until `stop` flips.
///
/// Returns the refusing status if the server would not open the stream.
async fn run_client(
    client: usize,
    channel: Channel,
    pairs: Vec<RatePair>,
    mut stop: watch::Receiver<bool>,
) -> Result<ClientStats, Status> {
    let mut stats = ClientStats::default();
    let mut rates = CurrencyClient::new(channel);

    let (requests, outbound) = unbounded();
    for pair in &pairs {
        if requests.unbounded_send(RateRequest::from(pair)).is_ok() {
            stats.subscriptions_sent += 1;
        }
    }

    let opened = Instant::now();
    let mut inbound = match rates.subscribe_rates(outbound).await {
        Ok(response) => response.into_inner(),
        Err(status) => {
            warn!(client, code = ?status.code(), "Subscription call refused");
            return Err(status);
        }
    };

    loop {
        tokio::select! {
            message = inbound.message() => match message {
                Ok(Some(response)) => match response.message {
                    Some(Message::RateResponse(rate)) => {
                        if stats.first_update_ms.is_none() {
                            stats.first_update_ms = Some(opened.elapsed().as_millis() as u64);
                        }
                        stats.updates_received += 1;
                        debug!(client, base = %rate.base, destination = %rate.destination, rate = rate.rate, "Rate update");
                    }
                    Some(Message::Error(status)) => {
                        stats.validation_errors += 1;
                        debug!(client, code = ?status.grpc_code(), message = %status.message, "Validation error");
                    }
                    None => {}
                },
                Ok(None) => break,
                Err(status) => {
                    warn!(client, code = ?status.code(), "Stream failed");
                    stats.stream_failed = true;
                    break;
                }
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    drop(requests);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;

    use futures::Stream;
    use fxstream_protocol::{Currency, CurrencyServer, RateResponse, StreamingRateResponse};
    use tokio::net::TcpListener;
    use tonic::transport::server::TcpIncoming;
    use tonic::transport::Server;
    use tonic::{Request, Response, Streaming};

    #[test]
    fn test_random_pairs_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);

        let pairs = random_pairs(&mut a, 20);
        assert_eq!(pairs.len(), 20);
        assert_eq!(pairs, random_pairs(&mut b, 20));
        assert!(pairs
            .iter()
            .all(|p| CURRENCIES.contains(&p.base.as_str()) && CURRENCIES.contains(&p.destination.as_str())));
    }

    struct RefusingService;

    #[tonic::async_trait]
    impl Currency for RefusingService {
        async fn get_rate(
            &self,
            _request: Request<RateRequest>,
        ) -> Result<Response<RateResponse>, Status> {
            Err(Status::unavailable("shutting down"))
        }

        type SubscribeRatesStream =
            Pin<Box<dyn Stream<Item = Result<StreamingRateResponse, Status>> + Send>>;

        async fn subscribe_rates(
            &self,
            _request: Request<Streaming<RateRequest>>,
        ) -> Result<Response<Self::SubscribeRatesStream>, Status> {
            Err(Status::unavailable("shutting down"))
        }
    }

    #[tokio::test]
    async fn test_refused_stream_counts_as_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let incoming = TcpIncoming::from_listener(listener, true, None).unwrap();
        let server = tokio::spawn(
            Server::builder()
                .add_service(CurrencyServer::new(RefusingService))
                .serve_with_incoming(incoming),
        );

        let mut controller = SimulationController::new(format!("http://{}", addr), 2, 3, Some(1));
        controller.run(Some(Duration::from_millis(200))).await.unwrap();

        let metrics = controller.get_metrics().await;
        assert_eq!(metrics.connect_failures, 2);
        assert_eq!(metrics.clients_connected, 0);
        assert_eq!(metrics.stream_errors, 0);

        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_server_counts_failures() {
        let mut controller = SimulationController::new("http://127.0.0.1:1", 2, 3, Some(1));

        controller.run(Some(Duration::from_millis(50))).await.unwrap();

        let metrics = controller.get_metrics().await;
        assert_eq!(metrics.connect_failures, 2);
        assert_eq!(metrics.clients_connected, 0);
    }
}
