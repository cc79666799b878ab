//! Multi-subscriber broadcast queue with per-connection delivery tracking
//!
//! Each pending message carries two explicit sets: connections that still
//! have to pull it (`awaiting`) and connections that already have it
//! (`delivered`). A message leaves the queue the moment `awaiting` becomes
//! empty, whether that happens through a pull or through an unsubscribe.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Identity of one live connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Outcome of [`BroadcastTracker::next_for`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// Oldest message this connection had not yet received
    Message(T),
    /// Nothing arrived within the idle interval
    Idle,
    /// The connection is not (or no longer) subscribed
    Unsubscribed,
}

struct PendingMessage<T> {
    seq: u64,
    payload: T,
    awaiting: HashSet<ConnectionId>,
    delivered: HashSet<ConnectionId>,
}

struct TrackerState<T> {
    roster: HashMap<ConnectionId, Arc<Notify>>,
    pending: VecDeque<PendingMessage<T>>,
    next_seq: u64,
    warned: bool,
}

enum Take<T> {
    Message(T),
    Empty(Arc<Notify>),
    Unsubscribed,
}

/// Queue of outbound messages shared by every connection.
///
/// Messages reach each connection in publish order. The lock guarding the
/// queue is independent of any chunk lock.
pub struct BroadcastTracker<T> {
    state: Mutex<TrackerState<T>>,
    warn_threshold: usize,
}

impl<T: Clone> Default for BroadcastTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> BroadcastTracker<T> {
    pub fn new() -> Self {
        Self::with_warn_threshold(1024)
    }

    /// Log a warning once the pending count exceeds `warn_threshold`
    pub fn with_warn_threshold(warn_threshold: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                roster: HashMap::new(),
                pending: VecDeque::new(),
                next_seq: 0,
                warned: false,
            }),
            warn_threshold: warn_threshold.max(1),
        }
    }

    /// Add a connection to the roster.
    ///
    /// The newcomer is enrolled in every message still pending, so it sees
    /// everything that had not yet been fully delivered when it joined.
    /// Returns false if it was already subscribed.
    pub fn subscribe(&self, conn: ConnectionId) -> bool {
        let mut state = self.state.lock();
        if state.roster.contains_key(&conn) {
            return false;
        }

        let notify = Arc::new(Notify::new());
        let mut enrolled = 0;
        for msg in state.pending.iter_mut() {
            msg.awaiting.insert(conn);
            enrolled += 1;
        }
        if enrolled > 0 {
            notify.notify_one();
        }
        state.roster.insert(conn, notify);
        log::debug!("{} subscribed ({} pending messages)", conn, enrolled);
        true
    }

    /// Remove a connection from the roster and from every delivery set.
    ///
    /// Messages that were only waiting on this connection are evicted
    /// immediately. Returns the number of evicted messages.
    pub fn unsubscribe(&self, conn: ConnectionId) -> usize {
        let mut state = self.state.lock();
        let Some(notify) = state.roster.remove(&conn) else {
            return 0;
        };

        let before = state.pending.len();
        for msg in state.pending.iter_mut() {
            msg.awaiting.remove(&conn);
            msg.delivered.remove(&conn);
        }
        state.pending.retain(|msg| !msg.awaiting.is_empty());
        let evicted = before - state.pending.len();
        self.check_growth(&mut state);

        // Wake a pull blocked on this connection so it sees the unsubscribe.
        notify.notify_one();
        log::debug!("{} unsubscribed, evicted {} messages", conn, evicted);
        evicted
    }

    pub fn is_subscribed(&self, conn: ConnectionId) -> bool {
        self.state.lock().roster.contains_key(&conn)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().roster.len()
    }

    /// Number of messages not yet delivered to all their recipients
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of pending messages this connection has still to pull
    pub fn pending_for(&self, conn: ConnectionId) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|msg| msg.awaiting.contains(&conn))
            .count()
    }

    /// Queue a message for every subscriber except those in `exclude`.
    ///
    /// Excluded subscribers are recorded as already delivered. A message with
    /// no recipient is dropped and `None` returned; otherwise the message's
    /// sequence number.
    pub fn publish(&self, payload: T, exclude: &[ConnectionId]) -> Option<u64> {
        let mut state = self.state.lock();

        let mut awaiting = HashSet::with_capacity(state.roster.len());
        let mut delivered = HashSet::new();
        for &conn in state.roster.keys() {
            if exclude.contains(&conn) {
                delivered.insert(conn);
            } else {
                awaiting.insert(conn);
            }
        }

        if awaiting.is_empty() {
            log::trace!("Dropping broadcast with no recipients");
            return None;
        }

        for conn in &awaiting {
            if let Some(notify) = state.roster.get(conn) {
                notify.notify_one();
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push_back(PendingMessage {
            seq,
            payload,
            awaiting,
            delivered,
        });
        self.check_growth(&mut state);
        Some(seq)
    }

    /// Pull the oldest message this connection has not received, without waiting
    pub fn try_next(&self, conn: ConnectionId) -> Option<T> {
        match self.take(conn) {
            Take::Message(payload) => Some(payload),
            Take::Empty(_) | Take::Unsubscribed => None,
        }
    }

    /// Pull the oldest message this connection has not received.
    ///
    /// Waits up to `idle` for one to be published, then returns
    /// [`Delivery::Idle`] so the caller can do other periodic work.
    pub async fn next_for(&self, conn: ConnectionId, idle: Duration) -> Delivery<T> {
        loop {
            let notify = match self.take(conn) {
                Take::Message(payload) => return Delivery::Message(payload),
                Take::Unsubscribed => return Delivery::Unsubscribed,
                Take::Empty(notify) => notify,
            };

            if tokio::time::timeout(idle, notify.notified()).await.is_err() {
                return Delivery::Idle;
            }
        }
    }

    fn take(&self, conn: ConnectionId) -> Take<T> {
        let mut state = self.state.lock();
        let Some(notify) = state.roster.get(&conn).cloned() else {
            return Take::Unsubscribed;
        };

        let Some(index) = state.pending.iter().position(|msg| msg.awaiting.contains(&conn)) else {
            return Take::Empty(notify);
        };

        let msg = &mut state.pending[index];
        msg.awaiting.remove(&conn);
        msg.delivered.insert(conn);
        let payload = msg.payload.clone();

        if msg.awaiting.is_empty() {
            log::trace!("Message {} fully delivered to {} connections", msg.seq, msg.delivered.len());
            state.pending.remove(index);
        }

        Take::Message(payload)
    }

    fn check_growth(&self, state: &mut TrackerState<T>) {
        let len = state.pending.len();
        if len > self.warn_threshold && !state.warned {
            log::warn!(
                "Broadcast queue holds {} undelivered messages (threshold {})",
                len,
                self.warn_threshold
            );
            state.warned = true;
        } else if len <= self.warn_threshold {
            state.warned = false;
        }
    }
}
