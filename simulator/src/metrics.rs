//! Simulation metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Totals collected across every simulated client.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Clients that opened a subscription stream.
    pub clients_connected: u64,
    /// Clients that could not connect or open a stream.
    pub connect_failures: u64,
    /// Subscription requests sent.
    pub subscriptions_sent: u64,
    /// Rate updates received.
    pub updates_received: u64,
    /// Validation errors received on streams.
    pub validation_errors: u64,
    /// Streams that ended with a transport error.
    pub stream_errors: u64,
    /// Time from opening a stream to its first rate update (ms).
    #[serde(skip)]
    first_update_samples: VecDeque<u64>,
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            clients_connected: 0,
            connect_failures: 0,
            subscriptions_sent: 0,
            updates_received: 0,
            validation_errors: 0,
            stream_errors: 0,
            first_update_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Fold one client's totals into the run totals.
    pub fn record_client(&mut self, client: &ClientStats) {
        self.clients_connected += 1;
        self.subscriptions_sent += client.subscriptions_sent;
        self.updates_received += client.updates_received;
        self.validation_errors += client.validation_errors;
        if client.stream_failed {
            self.stream_errors += 1;
        }

        if let Some(ms) = client.first_update_ms {
            if self.first_update_samples.len() >= self.max_samples {
                self.first_update_samples.pop_front();
            }
            self.first_update_samples.push_back(ms);
        }
    }

    /// Record a client that never got a stream.
    pub fn record_connect_failure(&mut self) {
        self.connect_failures += 1;
    }

    /// Average time to first update in ms.
    pub fn average_first_update_ms(&self) -> u64 {
        if self.first_update_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.first_update_samples.iter().sum();
        sum / self.first_update_samples.len() as u64
    }

    /// p99 time to first update in ms.
    pub fn p99_first_update_ms(&self) -> u64 {
        if self.first_update_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.first_update_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * 99 / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Updates received per second.
    pub fn throughput(&self, duration_secs: f64) -> f64 {
        if duration_secs <= 0.0 {
            return 0.0;
        }

        self.updates_received as f64 / duration_secs
    }

    /// Summary suitable for JSON output.
    pub fn report(&self, duration_secs: f64) -> SimulationReport {
        SimulationReport {
            totals: self.clone(),
            duration_secs,
            updates_per_sec: self.throughput(duration_secs),
            average_first_update_ms: self.average_first_update_ms(),
            p99_first_update_ms: self.p99_first_update_ms(),
        }
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// What one simulated client saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub subscriptions_sent: u64,
    pub updates_received: u64,
    pub validation_errors: u64,
    pub first_update_ms: Option<u64>,
    pub stream_failed: bool,
}

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    #[serde(flatten)]
    pub totals: SimulationMetrics,
    pub duration_secs: f64,
    pub updates_per_sec: f64,
    pub average_first_update_ms: u64,
    pub p99_first_update_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(updates: u64, errors: u64, first: Option<u64>) -> ClientStats {
        ClientStats {
            subscriptions_sent: 3,
            updates_received: updates,
            validation_errors: errors,
            first_update_ms: first,
            stream_failed: false,
        }
    }

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_client(&client(10, 1, Some(100)));
        metrics.record_client(&client(20, 0, Some(200)));
        metrics.record_client(&client(0, 3, None));
        metrics.record_connect_failure();

        assert_eq!(metrics.clients_connected, 3);
        assert_eq!(metrics.connect_failures, 1);
        assert_eq!(metrics.subscriptions_sent, 9);
        assert_eq!(metrics.updates_received, 30);
        assert_eq!(metrics.validation_errors, 4);
        assert_eq!(metrics.average_first_update_ms(), 150);
        assert_eq!(metrics.p99_first_update_ms(), 200);
        assert_eq!(metrics.throughput(10.0), 3.0);
    }

    #[test]
    fn test_report_serializes() {
        let mut metrics = SimulationMetrics::new();
        metrics.record_client(&client(5, 0, Some(50)));

        let json = serde_json::to_value(metrics.report(5.0)).unwrap();
        assert_eq!(json["updates_received"], 5);
        assert_eq!(json["updates_per_sec"], 1.0);
        assert!(json.get("first_update_samples").is_none());
    }
}
