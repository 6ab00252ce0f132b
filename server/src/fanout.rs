//! Fan-out of rate updates to subscribed sessions.

use std::sync::Arc;
use std::time::Duration;

use fxstream_common::{RatePair, RateUpdate, SessionId};
use fxstream_rates::{RateStore, TickNotice, TickReceiver};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::DeliveryError;
use crate::metrics::SharedMetrics;
use crate::registry::{EventSender, StreamEvent, SubscriptionRegistry};

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Tick the pass was run for.
    pub tick: u64,
    /// Sessions with at least one subscription at snapshot time.
    pub subscribers: usize,
    /// Updates pushed onto client streams.
    pub delivered: usize,
    /// Pairs whose rate could not be computed.
    pub lookup_failures: usize,
    /// Sessions whose stream refused an update.
    pub delivery_failures: usize,
}

/// Pushes fresh rates to every subscribed session after each tick.
pub struct FanoutEngine {
    store: Arc<RateStore>,
    registry: Arc<SubscriptionRegistry>,
    metrics: SharedMetrics,
    delivery_timeout: Duration,
}

impl FanoutEngine {
    /// Create a new fan-out engine.
    pub fn new(
        store: Arc<RateStore>,
        registry: Arc<SubscriptionRegistry>,
        metrics: SharedMetrics,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            metrics,
            delivery_timeout,
        }
    }

    /// Broadcast once per tick notice until the ticker goes away or shutdown
    /// is signalled.
    pub async fn run(&self, mut notices: TickReceiver, mut shutdown: watch::Receiver<bool>) {
        info!("Fan-out engine started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                notice = notices.recv() => {
                    match notice {
                        Some(notice) => {
                            self.broadcast(notice).await;
                        }
                        None => {
                            debug!("Rate ticker gone");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Fan-out engine stopped");
    }

    /// Deliver the current rate of every subscribed pair to its session.
    ///
    /// A pair whose rate cannot be computed is skipped. A session whose stream
    /// refuses an update gets nothing more in this pass; the other sessions
    /// are unaffected.
    #[instrument(skip(self, notice), fields(tick = notice.sequence))]
    pub async fn broadcast(&self, notice: TickNotice) -> FanoutReport {
        self.metrics.tick();

        let subscribers = self.registry.snapshot();
        let mut report = FanoutReport {
            tick: notice.sequence,
            subscribers: subscribers.len(),
            ..FanoutReport::default()
        };

        for subscriber in subscribers {
            for pair in &subscriber.pairs {
                let update = match self.store.quote(pair) {
                    Ok(update) => update,
                    Err(e) => {
                        warn!(
                            session = %subscriber.session,
                            pair = %pair,
                            error = %e,
                            "Unable to compute rate for subscription"
                        );
                        self.metrics.lookup_failed();
                        report.lookup_failures += 1;
                        continue;
                    }
                };

                match self
                    .deliver(subscriber.session, &subscriber.sender, update)
                    .await
                {
                    Ok(()) => {
                        self.metrics.update_delivered();
                        report.delivered += 1;
                    }
                    Err(e) => {
                        self.log_delivery_failure(pair, &e);
                        self.metrics.delivery_failed();
                        report.delivery_failures += 1;
                        break;
                    }
                }
            }
        }

        debug!(
            subscribers = report.subscribers,
            delivered = report.delivered,
            lookup_failures = report.lookup_failures,
            delivery_failures = report.delivery_failures,
            "Fan-out pass complete"
        );

        report
    }

    async fn deliver(
        &self,
        session: SessionId,
        sender: &EventSender,
        update: RateUpdate,
    ) -> Result<(), DeliveryError> {
        sender
            .send_timeout(StreamEvent::Rate(update), self.delivery_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Closed(_) => DeliveryError::Closed(session),
                SendTimeoutError::Timeout(_) => DeliveryError::Timeout(session),
            })
    }

    fn log_delivery_failure(&self, pair: &RatePair, error: &DeliveryError) {
        if error.is_terminal() {
            debug!(pair = %pair, error = %error, "Skipping closed stream");
        } else {
            warn!(pair = %pair, error = %error, "Skipping slow stream for this tick");
        }
    }
}
