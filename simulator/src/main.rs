//! fxstream Simulator
//!
//! Opens many concurrent rate subscriptions against a running server and
//! reports what came back.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;

use controller::SimulationController;

/// fxstream Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "fxstream-simulator")]
#[command(about = "Load simulator for the fxstream rate server")]
struct Args {
    /// Number of concurrent streaming clients
    #[arg(short, long, default_value = "10")]
    clients: usize,

    /// Pairs each client subscribes to
    #[arg(short, long, default_value = "3")]
    pairs_per_client: usize,

    /// Server endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:9092")]
    endpoint: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut controller =
        SimulationController::new(args.endpoint, args.clients, args.pairs_per_client, args.seed);

    let duration = if args.duration > 0 {
        Some(Duration::from_secs(args.duration))
    } else {
        None
    };

    let elapsed = controller.run(duration).await?;

    // Print metrics
    let metrics = controller.get_metrics().await;
    let report = metrics.report(elapsed.as_secs_f64());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!("Simulation complete");
        info!("Clients connected: {}", metrics.clients_connected);
        info!("Connect failures: {}", metrics.connect_failures);
        info!("Subscriptions sent: {}", metrics.subscriptions_sent);
        info!("Updates received: {}", metrics.updates_received);
        info!("Validation errors: {}", metrics.validation_errors);
        info!("Stream errors: {}", metrics.stream_errors);
        info!("Throughput: {:.1} updates/s", report.updates_per_sec);
        info!("Time to first update: avg {}ms, p99 {}ms", report.average_first_update_ms, report.p99_first_update_ms);
    }

    Ok(())
}
