//! A single topic: ring of recent messages plus attached subscriber queues
//!
//! The topic lock serializes ring appends with subscriber attach/detach so a
//! subscriber's replay batch and its live feed never overlap or miss a
//! message. Fan-out offers run after the lock is dropped, so one slow queue
//! cannot stall the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use super::message::Message;
use super::queue::{OfferOutcome, SubscriberQueue};
use super::ring::RingBuffer;

/// Per-publish fan-out accounting
#[derive(Debug, Default, Clone, Copy)]
pub struct FanoutOutcome {
    /// Queues the message was enqueued to
    pub enqueued: usize,
    /// Queues that had to evict their oldest entry first
    pub dropped: usize,
}

struct TopicInner {
    ring: RingBuffer,
    subscribers: HashMap<Uuid, Arc<SubscriberQueue>>,
}

/// One named topic owned by the broker
pub struct Topic {
    name: String,
    ring_size: usize,
    total_published: AtomicU64,
    inner: Mutex<TopicInner>,
}

impl Topic {
    pub fn new(name: &str, ring_size: usize) -> Self {
        Self {
            name: name.to_string(),
            ring_size,
            total_published: AtomicU64::new(0),
            inner: Mutex::new(TopicInner {
                ring: RingBuffer::new(ring_size),
                subscribers: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    pub fn total_published(&self) -> u64 {
        self.total_published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    /// Append to the ring under the topic lock, then offer to a snapshot of
    /// the subscriber set outside it.
    pub fn publish(&self, msg: Arc<Message>) -> FanoutOutcome {
        let snapshot: Vec<Arc<SubscriberQueue>> = {
            let mut inner = self.inner.lock();
            inner.ring.append(Arc::clone(&msg));
            self.total_published.fetch_add(1, Ordering::Relaxed);
            inner.subscribers.values().cloned().collect()
        };

        let mut outcome = FanoutOutcome::default();
        for queue in snapshot {
            match queue.offer(Arc::clone(&msg)) {
                OfferOutcome::Accepted => outcome.enqueued += 1,
                OfferOutcome::EvictedThenAccepted => {
                    outcome.enqueued += 1;
                    outcome.dropped += 1;
                }
                OfferOutcome::Closed => {}
            }
        }
        outcome
    }

    /// Atomically read the replay tail and attach the queue.
    ///
    /// Because this holds the same lock as `publish`'s ring append, no
    /// message can land between the tail read and the attach: the replay
    /// batch is strictly older than anything later offered to the queue.
    ///
    /// Returns `None` if the session already has a queue attached here.
    pub fn attach(
        &self,
        session_id: Uuid,
        queue: Arc<SubscriberQueue>,
        last_n: usize,
    ) -> Option<Vec<Arc<Message>>> {
        let mut inner = self.inner.lock();
        if inner.subscribers.contains_key(&session_id) {
            return None;
        }
        let replay = inner.ring.tail(last_n.min(self.ring_size));
        inner.subscribers.insert(session_id, queue);
        Some(replay)
    }

    /// Remove a session's queue (idempotent). Returns the queue if one was
    /// attached.
    pub fn detach(&self, session_id: Uuid) -> Option<Arc<SubscriberQueue>> {
        self.inner.lock().subscribers.remove(&session_id)
    }

    /// Detach and close every subscriber, returning the owners so the
    /// broker can notify their sessions. Used by topic deletion.
    pub fn close_all_subscribers(&self) -> Vec<(Uuid, Arc<SubscriberQueue>)> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.subscribers.drain().collect()
        };
        for (_, queue) in &drained {
            queue.close();
        }
        drained
    }

    /// True when no attached queue holds a pending message
    pub fn queues_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.subscribers.values().all(|q| q.is_empty())
    }
}
