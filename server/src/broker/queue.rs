//! Bounded per-subscriber delivery queue
//!
//! One queue per (session, topic) pair. Publishers `offer` without ever
//! blocking: a full queue evicts its oldest entry and counts the drop. The
//! owning session's writer task is the sole consumer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::message::Message;

/// Result of a non-blocking enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Enqueued through the normal path
    Accepted,
    /// Queue was full: the oldest entry was evicted first
    EvictedThenAccepted,
    /// Queue is closed; the message was discarded
    Closed,
}

struct QueueInner {
    items: VecDeque<Arc<Message>>,
    consecutive_drops: u32,
    closed: bool,
}

/// Bounded FIFO of pending outbound messages for one subscription
pub struct SubscriberQueue {
    client_id: String,
    topic: String,
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SubscriberQueue {
    pub fn new(topic: &str, client_id: &str, capacity: usize) -> Self {
        Self {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            capacity,
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                consecutive_drops: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Drops since the last successful normal-path enqueue
    pub fn consecutive_drops(&self) -> u32 {
        self.inner.lock().consecutive_drops
    }

    /// Non-blocking enqueue with drop-oldest overflow.
    ///
    /// A normal-path enqueue resets the drop counter; an eviction
    /// increments it.
    pub fn offer(&self, msg: Arc<Message>) -> OfferOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return OfferOutcome::Closed;
            }
            if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                inner.consecutive_drops += 1;
                inner.items.push_back(msg);
                OfferOutcome::EvictedThenAccepted
            } else {
                inner.consecutive_drops = 0;
                inner.items.push_back(msg);
                OfferOutcome::Accepted
            }
        };
        // notify_one stores a permit, so a consumer that races past the
        // empty check still wakes up
        self.notify.notify_one();
        outcome
    }

    /// Await the next message in FIFO order; `None` once the queue is closed.
    ///
    /// Entries still queued at close time are discarded, not delivered.
    pub async fn take(&self) -> Option<Arc<Message>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(msg) = inner.items.pop_front() {
                    return Some(msg);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Unblock all waiters and reject future offers (idempotent)
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.items.clear();
        }
        self.notify.notify_waiters();
        // Cover a consumer that checked the closed flag just before it was
        // set and is about to park
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
