//! Fan-out of timer snapshots to subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: if a
//! subscriber's queue is full the snapshot is dropped for that subscriber
//! only, so a stalled observer cannot hold back the countdown. Snapshots that
//! do get delivered always arrive in production order.

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::debug;

use crate::types::TimerState;

/// Identifier of a subscriber, unique per engine.
pub type SubscriberId = u64;

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<TimerState>,
}

/// Registry of live subscribers.
///
/// Lives inside the engine lock, so registration and publication are
/// serialized with every state change.
pub(crate) struct Subscribers {
    subscribers: Vec<Subscriber>,
    next_id: SubscriberId,
    buffer: usize,
    dropped: u64,
}

impl Subscribers {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            buffer: buffer.max(1),
            dropped: 0,
        }
    }

    /// Registers a subscriber and hands it `current` as its first snapshot.
    pub(crate) fn add(&mut self, current: TimerState) -> Subscription {
        self.prune();

        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id;
        self.next_id += 1;

        // Fresh channel with capacity >= 1, cannot be full.
        let _ = tx.try_send(current);
        self.subscribers.push(Subscriber { id, tx });

        debug!("Subscriber {} registered ({} live)", id, self.subscribers.len());
        Subscription { id, rx }
    }

    /// Delivers `state` to every live subscriber without waiting.
    pub(crate) fn publish(&mut self, state: TimerState) {
        let mut dropped = 0;
        self.subscribers.retain(|sub| match sub.tx.try_send(state) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                debug!("Subscriber {} queue full, dropping snapshot", sub.id);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscriber {} gone", sub.id);
                false
            }
        });
        self.dropped += dropped;
    }

    /// Returns the number of live subscribers.
    pub(crate) fn len(&mut self) -> usize {
        self.prune();
        self.subscribers.len()
    }

    /// Returns how many snapshots were dropped on full queues.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    fn prune(&mut self) {
        self.subscribers.retain(|sub| !sub.tx.is_closed());
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a subscription.
///
/// Dropping it, or calling [`Subscription::unsubscribe`], stops delivery.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<TimerState>,
}

impl Subscription {
    /// Returns the subscriber id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the engine is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<TimerState> {
        self.rx.recv().await
    }

    /// Returns the next queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<TimerState> {
        match self.rx.try_recv() {
            Ok(state) => Some(state),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Returns every queued snapshot without waiting.
    pub fn drain(&mut self) -> Vec<TimerState> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Waits until a snapshot matches `predicate` and returns it.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<TimerState>
    where
        F: FnMut(&TimerState) -> bool,
    {
        while let Some(state) = self.recv().await {
            if predicate(&state) {
                return Some(state);
            }
        }
        None
    }

    /// Stops delivery. Snapshots already queued are discarded.
    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
