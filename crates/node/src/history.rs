//! De-duplication history with retransmission support.
//!
//! Two FIFO ring caches share one lock: a large one remembering only ids,
//! answering "have I processed this before?", and a small one remembering
//! full messages so peers can request retransmissions. The id ring must be
//! large enough to survive a burst of cluster activity; the message ring
//! only needs to cover recent history, since freshness matters more than
//! depth for anti-entropy.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::message::Message;

pub struct History {
    inner: RwLock<Inner>,
}

struct Inner {
    ids: FifoCache<()>,
    msgs: FifoCache<Message>,
}

impl History {
    /// Create a history remembering `ids_size` message ids and `msgs_size`
    /// full messages.
    ///
    /// # Panics
    ///
    /// Panics if `ids_size < msgs_size`: an id evicted before its message
    /// would make the message unadvertisable yet re-processable.
    pub fn new(ids_size: usize, msgs_size: usize) -> Self {
        assert!(
            ids_size >= msgs_size,
            "id ring must be at least as big as the message ring"
        );

        History {
            inner: RwLock::new(Inner {
                ids: FifoCache::new(ids_size),
                msgs: FifoCache::new(msgs_size),
            }),
        }
    }

    /// Record a message if it has not been seen before. Returns whether it
    /// had been seen.
    ///
    /// A message so old that its id was already evicted counts as new again,
    /// so the id ring should be sized generously for the cluster's traffic.
    pub fn observe(&self, message: &Message) -> bool {
        let mut inner = self.inner.write().unwrap();

        if inner.ids.contains(&message.id) {
            return true;
        }

        inner.ids.insert(message.id.clone(), ());
        inner.msgs.insert(message.id.clone(), message.clone());
        false
    }

    /// Ids of all messages that are still fully remembered.
    pub fn message_ids(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.msgs.map.keys().cloned().collect()
    }

    /// Full messages with the given ids. Ids that are no longer resident are
    /// silently skipped, they were probably evicted in the meanwhile.
    pub fn get_messages(&self, ids: &[String]) -> Vec<Message> {
        let inner = self.inner.read().unwrap();
        ids.iter()
            .filter_map(|id| inner.msgs.get(id).cloned())
            .collect()
    }

    /// The subset of `advertised` ids that have never been seen, and whose
    /// full messages should be requested from the advertising peer.
    pub fn missing_ids(&self, advertised: &[String]) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        advertised
            .iter()
            .filter(|id| !inner.ids.contains(id))
            .cloned()
            .collect()
    }
}

/// A fixed-size map evicting strictly FIFO by insertion order.
struct FifoCache<V> {
    ring: Vec<Option<String>>,
    map: HashMap<String, V>,
    next: usize,
}

impl<V> FifoCache<V> {
    fn new(size: usize) -> Self {
        assert!(size > 0, "cache size must be positive");
        FifoCache {
            ring: (0..size).map(|_| None).collect(),
            map: HashMap::new(),
            next: 0,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<&V> {
        self.map.get(id)
    }

    fn insert(&mut self, id: String, value: V) {
        if let Some(evicted) = self.ring[self.next].take() {
            self.map.remove(&evicted);
        }
        self.ring[self.next] = Some(id.clone());
        self.map.insert(id, value);
        self.next = (self.next + 1) % self.ring.len();
    }
}
