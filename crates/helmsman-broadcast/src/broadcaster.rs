//! Fan-out of state deltas to subscribed clients.
//!
//! Each subscriber owns the receiving end of an unbounded crossbeam channel.
//! A new subscriber is always handed a full snapshot first, after which it
//! only sees deltas. Subscribers whose receiver has been dropped are pruned
//! on the next publish.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delta::StateDelta;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: Receiver<StateDelta>,
}

impl Subscription {
    /// Deltas already delivered, without blocking.
    pub fn drain(&self) -> Vec<StateDelta> {
        self.receiver.try_iter().collect()
    }
}

#[derive(Debug, Default)]
pub struct StateBroadcaster {
    subscribers: Vec<(SubscriberId, Sender<StateDelta>)>,
    next_id: u64,
    published: u64,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and deliver `snapshot` to it.
    pub fn subscribe(&mut self, mut snapshot: StateDelta) -> Subscription {
        let (tx, rx) = unbounded();
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        snapshot.full = true;
        // The receiver is still alive here, so this cannot fail.
        let _ = tx.send(snapshot);
        self.subscribers.push((id, tx));
        debug!(subscriber = id.0, "subscriber attached");
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    /// Send `delta` to every live subscriber. Returns how many received it.
    pub fn publish(&mut self, delta: &StateDelta) -> usize {
        self.published += 1;
        let before = self.subscribers.len();
        self.subscribers.retain(|(_, tx)| tx.send(delta.clone()).is_ok());
        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            debug!(dropped, tick = delta.tick, "pruned disconnected subscribers");
        }
        self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of deltas published so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_comes_first() {
        let mut b = StateBroadcaster::new();
        let sub = b.subscribe(StateDelta::new(7));
        b.publish(&StateDelta::new(8));

        let got = sub.drain();
        assert_eq!(got.len(), 2);
        assert!(got[0].full);
        assert_eq!(got[0].tick, 7);
        assert!(!got[1].full);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut b = StateBroadcaster::new();
        let keep = b.subscribe(StateDelta::new(0));
        let gone = b.subscribe(StateDelta::new(0));
        drop(gone);
        assert_eq!(b.publish(&StateDelta::new(1)), 1);
        assert_eq!(b.subscriber_count(), 1);
        assert!(b.unsubscribe(keep.id));
        assert!(!b.unsubscribe(keep.id));
    }
}
