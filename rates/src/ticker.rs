//! Periodic rate refresh and the tick rendezvous.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ListenerGone;
use crate::mutator::RateMutator;
use crate::store::RateStore;

/// Emitted once per tick, after the table has been updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickNotice {
    /// Tick number, starting at 1.
    pub sequence: u64,
    /// When the tick was applied.
    pub at: DateTime<Utc>,
}

struct Handoff {
    notice: TickNotice,
    taken: oneshot::Sender<()>,
}

/// Sending half of a tick rendezvous.
pub struct TickSender {
    tx: mpsc::Sender<Handoff>,
}

/// Receiving half of a tick rendezvous.
pub struct TickReceiver {
    rx: mpsc::Receiver<Handoff>,
}

/// Create a rendezvous for tick notices.
///
/// `TickSender::send` only returns once the receiver has taken the notice, so
/// there is never more than one notice in flight and nothing queues up behind
/// a slow receiver.
pub fn rendezvous() -> (TickSender, TickReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TickSender { tx }, TickReceiver { rx })
}

impl TickSender {
    /// Hand a notice to the receiver, waiting until it has been taken.
    pub async fn send(&self, notice: TickNotice) -> Result<(), ListenerGone> {
        let (taken_tx, taken_rx) = oneshot::channel();

        self.tx
            .send(Handoff {
                notice,
                taken: taken_tx,
            })
            .await
            .map_err(|_| ListenerGone)?;

        taken_rx.await.map_err(|_| ListenerGone)
    }
}

impl TickReceiver {
    /// Wait for the next notice. Returns `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<TickNotice> {
        let handoff = self.rx.recv().await?;
        let _ = handoff.taken.send(());
        Some(handoff.notice)
    }
}

/// Background loop that mutates the rate table on a fixed period.
pub struct RateTicker {
    store: Arc<RateStore>,
    mutator: Arc<dyn RateMutator>,
    period: Duration,
}

impl RateTicker {
    /// Create a new ticker.
    pub fn new(store: Arc<RateStore>, mutator: Arc<dyn RateMutator>, period: Duration) -> Self {
        Self {
            store,
            mutator,
            period,
        }
    }

    /// Run until `shutdown` flips to `true` or the listener goes away.
    ///
    /// Every period performs exactly one `apply_tick` followed by exactly one
    /// notice handed to `notices`. While the handoff is pending the next tick
    /// does not start.
    pub async fn run(self, notices: TickSender, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick of an interval completes immediately.
        interval.tick().await;

        info!(period_ms = self.period.as_millis() as u64, "Rate ticker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let notice = self.store.apply_tick(self.mutator.as_ref());

            tokio::select! {
                result = notices.send(notice) => {
                    if result.is_err() {
                        warn!(tick = notice.sequence, "No listener for rate ticks, stopping ticker");
                        break;
                    }
                    debug!(tick = notice.sequence, "Tick handed off");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        info!(ticks = self.store.tick_count(), "Rate ticker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxstream_common::CurrencyCode;

    fn store() -> Arc<RateStore> {
        Arc::new(RateStore::from_rates([("USD", 1.0)]))
    }

    fn growth() -> Arc<dyn RateMutator> {
        Arc::new(|_: &CurrencyCode, rate: f64| rate * 1.1)
    }

    #[tokio::test]
    async fn test_rendezvous_blocks_until_taken() {
        let (tx, mut rx) = rendezvous();
        let notice = TickNotice {
            sequence: 1,
            at: Utc::now(),
        };

        let mut send = tokio_test::task::spawn(tx.send(notice));
        tokio_test::assert_pending!(send.poll());

        assert_eq!(rx.recv().await, Some(notice));
        assert!(send.is_woken());
        tokio_test::assert_ready_ok!(send.poll());
    }

    #[tokio::test]
    async fn test_send_fails_without_listener() {
        let (tx, rx) = rendezvous();
        drop(rx);

        let notice = TickNotice {
            sequence: 1,
            at: Utc::now(),
        };
        assert_eq!(tx.send(notice).await, Err(ListenerGone));
    }

    #[tokio::test]
    async fn test_recv_ends_with_sender() {
        let (tx, mut rx) = rendezvous();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_emits_one_notice_per_tick() {
        let store = store();
        let (tx, mut rx) = rendezvous();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let ticker = RateTicker::new(store.clone(), growth(), Duration::from_secs(5));
        tokio::spawn(ticker.run(tx, shutdown_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(store.tick_count(), 1);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert!((store.get_rate(&"EUR".into(), &"USD".into()).unwrap() - 1.21).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listener_holds_back_ticks() {
        let store = store();
        let (tx, mut rx) = rendezvous();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let ticker = RateTicker::new(store.clone(), growth(), Duration::from_secs(1));
        tokio::spawn(ticker.run(tx, shutdown_rx));

        // Nobody receives for many periods: only the first tick is applied and
        // it waits in the handoff.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.tick_count(), 1);

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_shutdown() {
        let (tx, mut rx) = rendezvous();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ticker = RateTicker::new(store(), growth(), Duration::from_secs(1));
        let handle = tokio::spawn(ticker.run(tx, shutdown_rx));

        assert!(rx.recv().await.is_some());
        shutdown_tx.send(true).unwrap();

        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_listener_dropped() {
        let (tx, rx) = rendezvous();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(rx);

        let ticker = RateTicker::new(store(), growth(), Duration::from_secs(1));
        tokio::spawn(ticker.run(tx, shutdown_rx)).await.unwrap();
    }
}
