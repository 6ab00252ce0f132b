//! Per-session subscription bookkeeping.

use std::collections::HashSet;

use dashmap::DashMap;
use fxstream_common::{RatePair, RateUpdate, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SubscriptionError;

/// A message destined for one client stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fresh rate for a subscribed pair.
    Rate(RateUpdate),
    /// A subscription request was refused.
    Rejected {
        pair: RatePair,
        error: SubscriptionError,
    },
}

/// Channel for pushing events onto a client stream.
pub type EventSender = mpsc::Sender<StreamEvent>;

/// Registry entry for one open session.
#[derive(Debug)]
struct Subscriber {
    sender: EventSender,
    /// Pairs in the order they were subscribed.
    pairs: Vec<RatePair>,
    index: HashSet<RatePair>,
}

/// Point-in-time copy of one session's subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriberSnapshot {
    /// The session.
    pub session: SessionId,
    /// Where to deliver the session's updates.
    pub sender: EventSender,
    /// Subscribed pairs, in subscription order.
    pub pairs: Vec<RatePair>,
}

/// Maps every open session to the ordered set of pairs it subscribed to.
pub struct SubscriptionRegistry {
    subscribers: DashMap<SessionId, Subscriber>,
    buffer: usize,
}

impl SubscriptionRegistry {
    /// Create a registry whose sessions buffer up to `buffer` outbound events.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a new session with no subscriptions, returning the receiving
    /// end of its outbound event channel.
    pub fn open(&self, session: SessionId) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(
            session,
            Subscriber {
                sender: tx,
                pairs: Vec::new(),
                index: HashSet::new(),
            },
        );

        info!(session = %session, "Session opened");
        rx
    }

    /// Get a sender for the session's stream.
    pub fn sender(&self, session: &SessionId) -> Option<EventSender> {
        self.subscribers.get(session).map(|s| s.sender.clone())
    }

    /// Add `pair` to the session's subscriptions.
    ///
    /// Fails without touching the set if the pair is already present or quotes
    /// a currency into itself.
    pub fn register(&self, session: &SessionId, pair: RatePair) -> Result<(), SubscriptionError> {
        if pair.is_same_currency() {
            return Err(SubscriptionError::SameCurrency(pair));
        }

        let mut subscriber = self
            .subscribers
            .get_mut(session)
            .ok_or(SubscriptionError::UnknownSession(*session))?;

        if subscriber.index.contains(&pair) {
            return Err(SubscriptionError::AlreadyExists(pair));
        }

        debug!(session = %session, pair = %pair, "Subscription registered");
        subscriber.index.insert(pair.clone());
        subscriber.pairs.push(pair);

        Ok(())
    }

    /// Drop the session and all of its subscriptions. Returns the pairs it
    /// held, or `None` if the session was not registered.
    pub fn remove(&self, session: &SessionId) -> Option<Vec<RatePair>> {
        let (_, subscriber) = self.subscribers.remove(session)?;

        info!(
            session = %session,
            subscriptions = subscriber.pairs.len(),
            "Session removed"
        );
        Some(subscriber.pairs)
    }

    /// The session's subscriptions in subscription order.
    pub fn subscriptions(&self, session: &SessionId) -> Option<Vec<RatePair>> {
        self.subscribers.get(session).map(|s| s.pairs.clone())
    }

    /// Copy out every session's subscriptions.
    ///
    /// The copy is detached from the registry: registrations and removals
    /// that happen while it is being walked are not reflected in it.
    pub fn snapshot(&self) -> Vec<SubscriberSnapshot> {
        self.subscribers
            .iter()
            .filter(|entry| !entry.value().pairs.is_empty())
            .map(|entry| SubscriberSnapshot {
                session: *entry.key(),
                sender: entry.value().sender.clone(),
                pairs: entry.value().pairs.clone(),
            })
            .collect()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total number of subscriptions across all sessions.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.iter().map(|e| e.value().pairs.len()).sum()
    }

    /// Check whether a session is registered.
    pub fn contains(&self, session: &SessionId) -> bool {
        self.subscribers.contains_key(session)
    }
}
