//! fxstream Server Binary
//!
//! Loads the initial rate table, then serves `fxstream.Currency` until Ctrl+C
//! or SIGTERM.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxstream_rates::{EcbRateSource, RandomWalkMutator, RateSource, RateStore, StaticRateSource};
use fxstream_server::{LogFormat, RateServer, RateSourceKind, ServerConfig, ServerError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!("Starting fxstream server");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(ServerError::Config(e).into());
    }

    // Initial rates
    let source: Box<dyn RateSource> = match config.rate_source {
        RateSourceKind::Ecb => {
            match EcbRateSource::new(config.rate_source_url.clone(), config.source_timeout) {
                Ok(source) => {
                    info!(url = source.url(), "Loading rates from ECB");
                    Box::new(source)
                }
                Err(e) => {
                    warn!(error = %e, "Unable to build ECB client, using static rates");
                    Box::new(StaticRateSource::majors())
                }
            }
        }
        RateSourceKind::Static => Box::new(StaticRateSource::majors()),
    };
    let store = Arc::new(RateStore::load(source.as_ref()).await);

    let mutator = Arc::new(RandomWalkMutator::new(config.max_rate_change));

    let addr = config.socket_addr().map_err(ServerError::Config)?;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind listener");
            return Err(ServerError::Bind(e.to_string()).into());
        }
    };

    let server = RateServer::new(config, store, mutator);
    server.run(listener, shutdown_signal()).await?;

    info!("fxstream server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
