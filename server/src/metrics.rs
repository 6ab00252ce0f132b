//! Metrics collection for server monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Server metrics.
pub struct Metrics {
    /// Fan-out passes run.
    pub ticks_total: AtomicU64,
    /// Rate updates pushed onto client streams.
    pub updates_delivered: AtomicU64,
    /// Subscribed pairs whose rate could not be looked up.
    pub lookup_failures: AtomicU64,
    /// Updates that could not be pushed onto a client stream.
    pub delivery_failures: AtomicU64,
    /// Subscriptions registered.
    pub subscriptions_accepted: AtomicU64,
    /// Subscriptions refused.
    pub subscriptions_rejected: AtomicU64,
    /// Streaming sessions opened.
    pub sessions_opened: AtomicU64,
    /// Streaming sessions closed.
    pub sessions_closed: AtomicU64,
    /// Unary rate requests served.
    pub rate_requests: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            updates_delivered: AtomicU64::new(0),
            lookup_failures: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            subscriptions_accepted: AtomicU64::new(0),
            subscriptions_rejected: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            rate_requests: AtomicU64::new(0),
        }
    }

    /// Record a fan-out pass.
    pub fn tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered update.
    pub fn update_delivered(&self) {
        self.updates_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed rate lookup during fan-out.
    pub fn lookup_failed(&self) {
        self.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed delivery.
    pub fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted subscription.
    pub fn subscription_accepted(&self) {
        self.subscriptions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refused subscription.
    pub fn subscription_rejected(&self) {
        self.subscriptions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session opening.
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closing.
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a unary rate request.
    pub fn rate_request(&self) {
        self.rate_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let sessions_opened = self.sessions_opened.load(Ordering::Relaxed);
        let sessions_closed = self.sessions_closed.load(Ordering::Relaxed);

        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            updates_delivered: self.updates_delivered.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            subscriptions_accepted: self.subscriptions_accepted.load(Ordering::Relaxed),
            subscriptions_rejected: self.subscriptions_rejected.load(Ordering::Relaxed),
            sessions_opened,
            sessions_closed,
            sessions_active: sessions_opened.saturating_sub(sessions_closed),
            rate_requests: self.rate_requests.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP fxstream_ticks_total Total number of fan-out passes
# TYPE fxstream_ticks_total counter
fxstream_ticks_total {}

# HELP fxstream_updates_delivered Total rate updates pushed to clients
# TYPE fxstream_updates_delivered counter
fxstream_updates_delivered {}

# HELP fxstream_lookup_failures Total subscribed pairs that failed rate lookup
# TYPE fxstream_lookup_failures counter
fxstream_lookup_failures {}

# HELP fxstream_delivery_failures Total updates that could not be delivered
# TYPE fxstream_delivery_failures counter
fxstream_delivery_failures {}

# HELP fxstream_subscriptions_accepted Total subscriptions registered
# TYPE fxstream_subscriptions_accepted counter
fxstream_subscriptions_accepted {}

# HELP fxstream_subscriptions_rejected Total subscriptions refused
# TYPE fxstream_subscriptions_rejected counter
fxstream_subscriptions_rejected {}

# HELP fxstream_sessions_active Current open streaming sessions
# TYPE fxstream_sessions_active gauge
fxstream_sessions_active {}

# HELP fxstream_rate_requests Total unary rate requests
# TYPE fxstream_rate_requests counter
fxstream_rate_requests {}
"#,
            snapshot.ticks_total,
            snapshot.updates_delivered,
            snapshot.lookup_failures,
            snapshot.delivery_failures,
            snapshot.subscriptions_accepted,
            snapshot.subscriptions_rejected,
            snapshot.sessions_active,
            snapshot.rate_requests,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub updates_delivered: u64,
    pub lookup_failures: u64,
    pub delivery_failures: u64,
    pub subscriptions_accepted: u64,
    pub subscriptions_rejected: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_active: u64,
    pub rate_requests: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauge() {
        let metrics = Metrics::new();

        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.sessions_closed, 1);
        assert_eq!(snapshot.sessions_active, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.tick();
        metrics.update_delivered();
        metrics.update_delivered();

        let output = metrics.to_prometheus();
        assert!(output.contains("fxstream_ticks_total 1"));
        assert!(output.contains("fxstream_updates_delivered 2"));
    }
}
