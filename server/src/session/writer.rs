//! Per-subscription writer task
//!
//! Each subscription runs one writer: the sole consumer of its
//! `SubscriberQueue`, forwarding events to the shared transport sink. A
//! single writer per queue is what gives a subscription strict publish-order
//! delivery.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broker::{Broker, SessionControl, SubscriberQueue};
use crate::core::constants::CLOSE_SLOW_CONSUMER;

use super::frame::{ErrorCode, ServerFrame};
use super::{SharedSink, SubscriptionMap, send_frame};

pub(crate) struct SubscriptionWriter {
    pub broker: Arc<Broker>,
    pub queue: Arc<SubscriberQueue>,
    pub topic: String,
    pub sink: SharedSink,
    pub control: mpsc::UnboundedSender<SessionControl>,
    pub subscriptions: SubscriptionMap,
}

impl SubscriptionWriter {
    pub fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let threshold = self.broker.config().slow_consumer_threshold;
        let disconnect = self.broker.config().slow_consumer_disconnect;

        loop {
            // Drops only accumulate while the queue is full, so the queue is
            // never blocking us in `take` when this fires.
            if disconnect && self.queue.consecutive_drops() >= threshold {
                tracing::warn!(
                    topic = %self.topic,
                    client_id = %self.queue.client_id(),
                    drops = self.queue.consecutive_drops(),
                    "Evicting slow consumer"
                );
                let frame = ServerFrame::error(
                    None,
                    ErrorCode::SlowConsumer,
                    format!("subscriber too slow for topic '{}'", self.topic),
                );
                // Bounded: the transport is already congested, and the close
                // must go out either way
                let _ = tokio::time::timeout(super::SEND_TIMEOUT, send_frame(&self.sink, &frame))
                    .await;
                let _ = self.control.send(SessionControl::Close {
                    code: CLOSE_SLOW_CONSUMER,
                });
                break;
            }

            let Some(msg) = self.queue.take().await else {
                break;
            };
            if send_frame(&self.sink, &ServerFrame::event(&self.topic, &msg))
                .await
                .is_err()
            {
                // Transport is gone; the session reader tears everything down
                break;
            }
            self.broker.stats_handle().record_delivered(1);
        }

        // Drop our map entry unless a newer subscription replaced it
        let mut subs = self.subscriptions.lock();
        if let Some(queue) = subs.get(&self.topic)
            && Arc::ptr_eq(queue, &self.queue)
        {
            subs.remove(&self.topic);
        }
    }
}
