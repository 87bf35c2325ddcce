//! Broker state engine
//!
//! Process-wide registry of topics and live sessions. One coarse lock
//! guards the topic registry; each topic owns its own lock. Lock order is
//! always registry before topic, and fan-out never holds either.

pub mod error;
pub mod message;
pub mod queue;
pub mod ring;
pub mod topic;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use error::BrokerError;
pub use message::Message;
pub use queue::SubscriberQueue;

use crate::core::config::BrokerConfig;
use message::{is_canonical_uuid, is_valid_topic_name};
use topic::Topic;

// ============================================================================
// SESSION HANDLES
// ============================================================================

/// Out-of-band instruction pushed to a session by the broker
#[derive(Debug, Clone)]
pub enum SessionControl {
    /// Deliver an `info` frame
    Info { msg: String, topic: Option<String> },
    /// Close the transport with the given code
    Close { code: u16 },
}

/// Non-owning handle the broker keeps per live session
#[derive(Clone)]
pub struct SessionHandle {
    control: mpsc::UnboundedSender<SessionControl>,
}

impl SessionHandle {
    pub fn new(control: mpsc::UnboundedSender<SessionControl>) -> Self {
        Self { control }
    }

    /// Best-effort push; a session tearing down concurrently is fine
    pub fn send(&self, ctl: SessionControl) {
        let _ = self.control.send(ctl);
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Global counters, updated with atomics outside any lock
#[derive(Default)]
pub struct BrokerStats {
    published_total: AtomicU64,
    delivered_total: AtomicU64,
    dropped_total: AtomicU64,
    active_subscribers: AtomicU64,
}

impl BrokerStats {
    pub fn record_published(&self) {
        self.published_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, n: u64) {
        self.delivered_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: u64) {
        self.dropped_total.fetch_add(n, Ordering::Relaxed);
    }

    fn subscriber_attached(&self) {
        self.active_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    fn subscriber_detached(&self, n: u64) {
        self.active_subscribers.fetch_sub(n, Ordering::Relaxed);
    }
}

/// Point-in-time view of the broker counters
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub published_total: u64,
    pub delivered_total: u64,
    pub dropped_total: u64,
    pub active_subscribers: u64,
    pub active_sessions: u64,
    pub shutting_down: bool,
}

/// Per-topic counters for the listing endpoint
#[derive(Debug, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub subscribers: usize,
    pub ring_buffer_size: usize,
    pub messages_in_history: usize,
    pub total_messages: u64,
}

// ============================================================================
// BROKER
// ============================================================================

/// The process-wide message router.
///
/// Passed explicitly through constructors (never a global) so tests can run
/// isolated brokers in parallel.
pub struct Broker {
    config: BrokerConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    shutting_down: AtomicBool,
    stats: BrokerStats,
    started_at: Instant,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
            stats: BrokerStats::default(),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn stats_handle(&self) -> &BrokerStats {
        &self.stats
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    // ========================================================================
    // TOPIC LIFECYCLE
    // ========================================================================

    /// Create a topic. `ring_size` defaults to the configured ring size; an
    /// explicit out-of-range value is rejected rather than clamped.
    pub fn create_topic(&self, name: &str, ring_size: Option<i64>) -> Result<usize, BrokerError> {
        self.check_admission()?;

        if !is_valid_topic_name(name) {
            return Err(BrokerError::bad_request(format!(
                "invalid topic name '{name}'"
            )));
        }

        let ring_size = match ring_size {
            None => self.config.default_ring_buffer_size,
            Some(n) if n >= 1 && n as usize <= self.config.max_ring_buffer_size => n as usize,
            Some(n) => {
                return Err(BrokerError::bad_request(format!(
                    "ring_size {n} out of range [1, {}]",
                    self.config.max_ring_buffer_size
                )));
            }
        };

        let mut topics = self.topics.write();
        if topics.contains_key(name) {
            return Err(BrokerError::TopicExists(name.to_string()));
        }
        topics.insert(name.to_string(), Arc::new(Topic::new(name, ring_size)));
        drop(topics);

        tracing::info!(topic = name, ring_size, "Topic created");
        Ok(ring_size)
    }

    /// Delete a topic: every attached subscriber queue is closed, its
    /// session notified, and future operations on the name fail with
    /// `TopicNotFound`.
    pub fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.check_admission()?;

        let topic = self
            .topics
            .write()
            .remove(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))?;

        let drained = topic.close_all_subscribers();
        let detached = drained.len() as u64;
        if detached > 0 {
            self.stats.subscriber_detached(detached);
            let sessions = self.sessions.read();
            for (session_id, _) in &drained {
                if let Some(handle) = sessions.get(session_id) {
                    handle.send(SessionControl::Info {
                        msg: "topic deleted".to_string(),
                        topic: Some(name.to_string()),
                    });
                }
            }
        }

        tracing::info!(topic = name, subscribers = detached, "Topic deleted");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }

    /// Snapshot of all topics with their counters
    pub fn list_topics(&self) -> Vec<TopicSummary> {
        let topics: Vec<Arc<Topic>> = self.topics.read().values().cloned().collect();
        let mut out: Vec<TopicSummary> = topics
            .iter()
            .map(|t| TopicSummary {
                name: t.name().to_string(),
                subscribers: t.subscriber_count(),
                ring_buffer_size: t.ring_size(),
                messages_in_history: t.history_len(),
                total_messages: t.total_published(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    // ========================================================================
    // PUBLISH / SUBSCRIBE
    // ========================================================================

    /// Validate, stamp and route one published message
    pub fn publish(
        &self,
        topic_name: &str,
        id: &str,
        payload: Value,
    ) -> Result<Arc<Message>, BrokerError> {
        self.check_admission()?;

        if !is_valid_topic_name(topic_name) {
            return Err(BrokerError::bad_request(format!(
                "invalid topic name '{topic_name}'"
            )));
        }
        if !is_canonical_uuid(id) {
            return Err(BrokerError::bad_request(format!(
                "message id '{id}' is not a canonical UUID"
            )));
        }

        let topic = self.lookup(topic_name)?;
        let msg = Arc::new(Message::stamped(id.to_string(), payload));
        let outcome = topic.publish(Arc::clone(&msg));

        self.stats.record_published();
        if outcome.dropped > 0 {
            self.stats.record_dropped(outcome.dropped as u64);
            tracing::debug!(
                topic = topic_name,
                dropped = outcome.dropped,
                "Slow subscriber queues evicted messages"
            );
        }
        Ok(msg)
    }

    /// Attach a fresh queue for (session, topic) and return it with the
    /// replay batch read atomically against concurrent publishes.
    pub fn subscribe(
        &self,
        session_id: Uuid,
        topic_name: &str,
        client_id: &str,
        last_n: usize,
    ) -> Result<(Arc<SubscriberQueue>, Vec<Arc<Message>>), BrokerError> {
        self.check_admission()?;

        if !is_valid_topic_name(topic_name) {
            return Err(BrokerError::bad_request(format!(
                "invalid topic name '{topic_name}'"
            )));
        }
        if client_id.is_empty() {
            return Err(BrokerError::bad_request("client_id must not be empty"));
        }

        let topic = self.lookup(topic_name)?;
        let queue = Arc::new(SubscriberQueue::new(
            topic_name,
            client_id,
            self.config.subscriber_queue_size,
        ));
        let replay = topic
            .attach(session_id, Arc::clone(&queue), last_n)
            .ok_or_else(|| BrokerError::DuplicateSubscription(topic_name.to_string()))?;

        self.stats.subscriber_attached();
        tracing::debug!(
            topic = topic_name,
            client_id,
            session = %session_id,
            replay = replay.len(),
            "Subscription attached"
        );
        Ok((queue, replay))
    }

    /// Detach the session's queue from a topic and close it
    pub fn unsubscribe(&self, session_id: Uuid, topic_name: &str) -> Result<(), BrokerError> {
        let topic = self.lookup(topic_name)?;
        if let Some(queue) = topic.detach(session_id) {
            queue.close();
            self.stats.subscriber_detached(1);
        }
        Ok(())
    }

    /// Detach without reporting a missing topic; used by session teardown
    /// where the topic may already be gone.
    pub fn detach_quiet(&self, session_id: Uuid, topic_name: &str) {
        if let Ok(topic) = self.lookup(topic_name)
            && let Some(queue) = topic.detach(session_id)
        {
            queue.close();
            self.stats.subscriber_detached(1);
        }
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    pub fn register_session(&self, session_id: Uuid, handle: SessionHandle) {
        self.sessions.write().insert(session_id, handle);
    }

    pub fn unregister_session(&self, session_id: Uuid) {
        self.sessions.write().remove(&session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Push an `info` frame to every live session
    pub fn broadcast_info(&self, msg: &str) {
        let sessions = self.sessions.read();
        for handle in sessions.values() {
            handle.send(SessionControl::Info {
                msg: msg.to_string(),
                topic: None,
            });
        }
    }

    /// Ask every live session to close its transport with `code`
    pub fn close_all_sessions(&self, code: u16) {
        let sessions = self.sessions.read();
        for handle in sessions.values() {
            handle.send(SessionControl::Close { code });
        }
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Flip the drain flag; create/publish/subscribe are rejected from here
    /// on. Idempotent; returns whether this call performed the transition.
    pub fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn check_admission(&self) -> Result<(), BrokerError> {
        if self.is_shutting_down() {
            return Err(BrokerError::ShuttingDown);
        }
        Ok(())
    }

    /// True when no subscriber queue on any topic holds a pending message
    pub fn all_queues_empty(&self) -> bool {
        let topics: Vec<Arc<Topic>> = self.topics.read().values().cloned().collect();
        topics.iter().all(|t| t.queues_empty())
    }

    /// Release all topic storage; the last step of graceful shutdown
    pub fn clear_topics(&self) {
        let drained: Vec<Arc<Topic>> = {
            let mut topics = self.topics.write();
            topics.drain().map(|(_, t)| t).collect()
        };
        let mut detached = 0u64;
        for topic in drained {
            detached += topic.close_all_subscribers().len() as u64;
        }
        if detached > 0 {
            self.stats.subscriber_detached(detached);
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            published_total: self.stats.published_total.load(Ordering::Relaxed),
            delivered_total: self.stats.delivered_total.load(Ordering::Relaxed),
            dropped_total: self.stats.dropped_total.load(Ordering::Relaxed),
            active_subscribers: self.stats.active_subscribers.load(Ordering::Relaxed),
            active_sessions: self.sessions.read().len() as u64,
            shutting_down: self.is_shutting_down(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const M1: &str = "11111111-1111-4111-8111-111111111111";

    fn broker() -> Broker {
        Broker::new(BrokerConfig::default())
    }

    fn uuid_for(i: usize) -> String {
        format!("00000000-0000-4000-8000-{:012}", i)
    }

    #[test]
    fn test_create_topic_validates_name() {
        let b = broker();
        assert!(b.create_topic("orders", None).is_ok());
        assert!(matches!(
            b.create_topic("bad name!", None),
            Err(BrokerError::BadRequest(_))
        ));
        assert!(matches!(
            b.create_topic("", None),
            Err(BrokerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_create_topic_rejects_duplicate() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        assert!(matches!(
            b.create_topic("orders", None),
            Err(BrokerError::TopicExists(_))
        ));
    }

    #[test]
    fn test_create_topic_ring_size_bounds() {
        let b = broker();
        assert_eq!(b.create_topic("t1", Some(1)).unwrap(), 1);
        assert_eq!(b.create_topic("t2", None).unwrap(), 100);
        assert!(matches!(
            b.create_topic("t3", Some(0)),
            Err(BrokerError::BadRequest(_))
        ));
        assert!(matches!(
            b.create_topic("t4", Some(-5)),
            Err(BrokerError::BadRequest(_))
        ));
        assert!(matches!(
            b.create_topic("t5", Some(10_001)),
            Err(BrokerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_publish_requires_existing_topic() {
        let b = broker();
        assert!(matches!(
            b.publish("ghost", M1, json!({})),
            Err(BrokerError::TopicNotFound(_))
        ));
    }

    #[test]
    fn test_publish_rejects_non_uuid_id() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        assert!(matches!(
            b.publish("orders", "not-a-uuid", json!({})),
            Err(BrokerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_publish_stamps_timestamp_and_counts() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let msg = b.publish("orders", M1, json!({"v": 1})).unwrap();
        assert_eq!(msg.id, M1);

        let stats = b.stats();
        assert_eq!(stats.published_total, 1);
        assert!(!stats.shutting_down);
    }

    #[test]
    fn test_subscribe_replays_min_of_last_n_and_history() {
        let b = broker();
        b.create_topic("orders", Some(5)).unwrap();
        for i in 1..=7 {
            b.publish("orders", &uuid_for(i), json!({"i": i})).unwrap();
        }

        let (_, replay) = b.subscribe(Uuid::new_v4(), "orders", "c1", 3).unwrap();
        let ids: Vec<u64> = replay
            .iter()
            .map(|m| m.payload["i"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_subscribe_duplicate_rejected() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let session = Uuid::new_v4();
        b.subscribe(session, "orders", "c1", 0).unwrap();
        assert!(matches!(
            b.subscribe(session, "orders", "c1", 0),
            Err(BrokerError::DuplicateSubscription(_))
        ));
    }

    #[test]
    fn test_subscribe_then_publish_lands_in_queue() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let (queue, replay) = b.subscribe(Uuid::new_v4(), "orders", "c1", 0).unwrap();
        assert!(replay.is_empty());

        b.publish("orders", M1, json!({"v": 1})).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unsubscribe_closes_queue_and_updates_gauge() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let session = Uuid::new_v4();
        let (queue, _) = b.subscribe(session, "orders", "c1", 0).unwrap();
        assert_eq!(b.stats().active_subscribers, 1);

        b.unsubscribe(session, "orders").unwrap();
        assert!(queue.is_closed());
        assert_eq!(b.stats().active_subscribers, 0);

        // Idempotent on the topic side
        b.unsubscribe(session, "orders").unwrap();
        assert!(matches!(
            b.unsubscribe(session, "ghost"),
            Err(BrokerError::TopicNotFound(_))
        ));
    }

    #[test]
    fn test_delete_topic_notifies_and_closes() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.register_session(session, SessionHandle::new(tx));
        let (queue, _) = b.subscribe(session, "orders", "c1", 0).unwrap();

        b.delete_topic("orders").unwrap();
        assert!(queue.is_closed());
        assert_eq!(b.stats().active_subscribers, 0);
        match rx.try_recv().unwrap() {
            SessionControl::Info { topic, .. } => assert_eq!(topic.as_deref(), Some("orders")),
            other => panic!("expected info, got {other:?}"),
        }

        assert!(matches!(
            b.publish("orders", M1, json!({})),
            Err(BrokerError::TopicNotFound(_))
        ));
        assert!(b.list_topics().is_empty());
    }

    #[test]
    fn test_shutdown_rejects_admissions() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        assert!(b.begin_shutdown());
        assert!(!b.begin_shutdown());

        assert!(matches!(
            b.create_topic("other", None),
            Err(BrokerError::ShuttingDown)
        ));
        assert!(matches!(
            b.publish("orders", M1, json!({})),
            Err(BrokerError::ShuttingDown)
        ));
        assert!(matches!(
            b.subscribe(Uuid::new_v4(), "orders", "c1", 0),
            Err(BrokerError::ShuttingDown)
        ));
        assert!(b.stats().shutting_down);
    }

    #[test]
    fn test_list_topics_counters() {
        let b = broker();
        b.create_topic("orders", Some(5)).unwrap();
        b.create_topic("alerts", None).unwrap();
        b.subscribe(Uuid::new_v4(), "orders", "c1", 0).unwrap();
        for i in 0..7 {
            b.publish("orders", &uuid_for(i), json!({})).unwrap();
        }

        let listing = b.list_topics();
        assert_eq!(listing.len(), 2);
        let orders = listing.iter().find(|t| t.name == "orders").unwrap();
        assert_eq!(orders.subscribers, 1);
        assert_eq!(orders.ring_buffer_size, 5);
        assert_eq!(orders.messages_in_history, 5);
        assert_eq!(orders.total_messages, 7);
    }

    #[tokio::test]
    async fn test_all_queues_empty_tracks_pending() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let (queue, _) = b.subscribe(Uuid::new_v4(), "orders", "c1", 0).unwrap();
        assert!(b.all_queues_empty());

        b.publish("orders", M1, json!({})).unwrap();
        assert!(!b.all_queues_empty());

        // Draining the queue makes the broker report empty again
        queue.take().await.unwrap();
        assert!(b.all_queues_empty());
    }

    #[test]
    fn test_clear_topics_releases_everything() {
        let b = broker();
        b.create_topic("orders", None).unwrap();
        let (queue, _) = b.subscribe(Uuid::new_v4(), "orders", "c1", 0).unwrap();

        b.clear_topics();
        assert!(queue.is_closed());
        assert!(b.list_topics().is_empty());
        assert_eq!(b.stats().active_subscribers, 0);
    }
}
