//! Server lifecycle: background tasks, the gRPC listener and shutdown.

use std::future::Future;
use std::sync::Arc;

use fxstream_protocol::CurrencyServer;
use fxstream_rates::{rendezvous, RateMutator, RateStore, RateTicker};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::fanout::FanoutEngine;
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::SubscriptionRegistry;
use crate::service::CurrencyService;
use crate::state::ServerState;

/// Owns the shared rate table and subscription registry and runs the ticker,
/// the fan-out engine and the gRPC listener around them.
pub struct RateServer {
    /// Configuration.
    config: ServerConfig,
    /// Current lifecycle state.
    state: Arc<RwLock<ServerState>>,
    store: Arc<RateStore>,
    registry: Arc<SubscriptionRegistry>,
    metrics: SharedMetrics,
    mutator: Arc<dyn RateMutator>,
    /// Flipped to `true` once shutdown starts.
    shutdown_tx: watch::Sender<bool>,
    /// Ticker and fan-out tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RateServer {
    /// Create a new server around an already loaded rate table.
    pub fn new(config: ServerConfig, store: Arc<RateStore>, mutator: Arc<dyn RateMutator>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let registry = Arc::new(SubscriptionRegistry::new(config.session_buffer));

        Self {
            config,
            state: Arc::new(RwLock::new(ServerState::Starting)),
            store,
            registry,
            metrics: Arc::new(Metrics::new()),
            mutator,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build the gRPC service over this server's shared state.
    pub fn service(&self) -> CurrencyService {
        CurrencyService::new(
            self.store.clone(),
            self.registry.clone(),
            self.metrics.clone(),
            self.state.clone(),
            self.shutdown_tx.subscribe(),
        )
    }

    /// Start the ticker and the fan-out engine and begin accepting calls.
    ///
    /// Only the first call from `Starting` spawns anything; later calls are
    /// ignored.
    #[instrument(skip(self))]
    pub fn start(&self) {
        {
            let mut state = self.state.write();
            if *state != ServerState::Starting {
                warn!(state = ?*state, "Rate server already started");
                return;
            }
            *state = ServerState::Running;
        }

        let (notices, listener) = rendezvous();

        let ticker = RateTicker::new(
            self.store.clone(),
            self.mutator.clone(),
            self.config.refresh_interval,
        );
        let fanout = FanoutEngine::new(
            self.store.clone(),
            self.registry.clone(),
            self.metrics.clone(),
            self.config.delivery_timeout,
        );

        let ticker_shutdown = self.shutdown_tx.subscribe();
        let fanout_shutdown = self.shutdown_tx.subscribe();

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(ticker.run(notices, ticker_shutdown)));
        tasks.push(tokio::spawn(async move {
            fanout.run(listener, fanout_shutdown).await;
        }));

        info!(
            currencies = self.store.len(),
            refresh_interval_ms = self.config.refresh_interval.as_millis() as u64,
            "Rate server started"
        );
    }

    /// Serve on `listener` until `signal` resolves, then shut down.
    pub async fn run<F>(&self, listener: TcpListener, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        self.start();
        info!(addr = %local_addr, "Serving fxstream.Currency");

        let mut stopping = self.shutdown_tx.subscribe();
        let shutdown = async {
            tokio::select! {
                _ = signal => {
                    info!("Shutdown signal received");
                }
                _ = stopping.wait_for(|stopping| *stopping) => {}
            }
            self.begin_shutdown();
        };

        let served = Server::builder()
            .add_service(CurrencyServer::new(self.service()))
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await;

        if let Err(e) = &served {
            error!(error = %e, "gRPC transport failed");
        }

        self.stop().await;
        served.map_err(ServerError::from)
    }

    /// Stop accepting calls and signal every background task and open stream
    /// to wind down.
    pub fn begin_shutdown(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, ServerState::ShuttingDown | ServerState::Stopped) {
                return;
            }
            *state = ServerState::ShuttingDown;
        }

        info!("Rate server shutting down");
        self.shutdown_tx.send_replace(true);
    }

    /// Shut down and wait for the background tasks to finish.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.begin_shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task failed");
            }
        }

        *self.state.write() = ServerState::Stopped;

        let snapshot = self.metrics.snapshot();
        info!(
            ticks = snapshot.ticks_total,
            updates_delivered = snapshot.updates_delivered,
            lookup_failures = snapshot.lookup_failures,
            delivery_failures = snapshot.delivery_failures,
            subscriptions_accepted = snapshot.subscriptions_accepted,
            subscriptions_rejected = snapshot.subscriptions_rejected,
            sessions_opened = snapshot.sessions_opened,
            rate_requests = snapshot.rate_requests,
            "Rate server stopped"
        );
        debug!(metrics = %self.metrics.to_prometheus(), "Final metrics");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Check if the server is accepting calls.
    pub fn is_accepting_requests(&self) -> bool {
        self.state.read().accepts_requests()
    }

    /// Shared rate table.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Shared subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Server metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxstream_common::CurrencyCode;
    use std::time::Duration;

    fn server() -> RateServer {
        let config = ServerConfig {
            refresh_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        RateServer::new(
            config,
            Arc::new(RateStore::from_rates([("USD", 1.1)])),
            Arc::new(|_: &CurrencyCode, rate: f64| rate),
        )
    }

    #[tokio::test]
    async fn test_server_start_stop() {
        let server = server();
        assert_eq!(server.state(), ServerState::Starting);

        server.start();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.is_accepting_requests());

        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!server.is_accepting_requests());
    }

    #[tokio::test]
    async fn test_ticks_reach_fanout() {
        let server = server();
        server.start();

        while server.metrics().snapshot().ticks_total < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(server.store().tick_count() >= 2);

        server.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_spawns_nothing() {
        let config = ServerConfig {
            refresh_interval: Duration::from_millis(100),
            ..ServerConfig::default()
        };
        let server = RateServer::new(
            config,
            Arc::new(RateStore::from_rates([("USD", 1.1)])),
            Arc::new(|_: &CurrencyCode, rate: f64| rate),
        );

        server.start();
        server.start();
        assert_eq!(server.tasks.lock().len(), 2);
        assert_eq!(server.state(), ServerState::Running);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let ticks = server.store().tick_count();
        assert!((9..=11).contains(&ticks), "ticks = {}", ticks);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_start_after_stop_is_ignored() {
        let server = server();
        server.start();
        server.stop().await;

        server.start();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.tasks.lock().is_empty());

        // Stopping again is a no-op.
        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let server = server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        server.run(listener, async {}).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
