//! Fixed-capacity ring of recent messages
//!
//! One ring per topic, always mutated under the owning topic's lock.
//! The oldest entry is overwritten once the ring is full.

use std::sync::Arc;

use super::message::Message;

/// Circular FIFO of the last `capacity` published messages
pub struct RingBuffer {
    slots: Vec<Option<Arc<Message>>>,
    /// Index of the oldest entry
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create an empty ring. `capacity` must be >= 1 (validated upstream
    /// at topic creation).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring capacity must be >= 1");
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append in publish order, overwriting the oldest entry when full
    pub fn append(&mut self, msg: Arc<Message>) {
        let capacity = self.slots.len();
        if self.len < capacity {
            let idx = (self.head + self.len) % capacity;
            self.slots[idx] = Some(msg);
            self.len += 1;
        } else {
            self.slots[self.head] = Some(msg);
            self.head = (self.head + 1) % capacity;
        }
    }

    /// Last `min(n, len)` messages in publish order
    pub fn tail(&self, n: usize) -> Vec<Arc<Message>> {
        let take = n.min(self.len);
        let capacity = self.slots.len();
        let mut out = Vec::with_capacity(take);
        for i in (self.len - take)..self.len {
            let idx = (self.head + i) % capacity;
            let slot = self.slots[idx].as_ref().expect("slot within len is filled");
            out.push(Arc::clone(slot));
        }
        out
    }
}
