//! Per-connection session protocol
//!
//! Each WebSocket connection runs one reader task (this module) plus one
//! writer task per active subscription. All outbound frames pass through a
//! single sink mutex, so acks, replays, live events and errors interleave
//! only at frame boundaries.

pub mod frame;
mod writer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::broker::{Broker, SessionControl, SessionHandle, SubscriberQueue};
use crate::core::constants::{CLOSE_GOING_AWAY, CLOSE_SLOW_CONSUMER, CLOSE_UNAUTHORIZED};

use frame::{ClientFrame, ErrorCode, ServerFrame};
use writer::SubscriptionWriter;

/// Transport sink shared by the reader and all subscription writers
pub(crate) type SharedSink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, WsMessage>>>;

/// Active subscriptions of one session, keyed by topic
pub(crate) type SubscriptionMap = Arc<Mutex<HashMap<String, Arc<SubscriberQueue>>>>;

/// Ceiling on any reader-side transport write. A client that stops reading
/// can wedge the sink behind a stalled writer; the session must still be
/// able to observe its close signal within the shutdown budget.
pub(crate) const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Serialize one frame to the transport
pub(crate) async fn send_frame(sink: &SharedSink, frame: &ServerFrame) -> Result<(), axum::Error> {
    sink.lock()
        .await
        .send(WsMessage::Text(frame.to_json().into()))
        .await
}

/// Reader-side send with a bounded wait; false means the transport is
/// treated as dead.
async fn send_bounded(sink: &SharedSink, frame: &ServerFrame) -> bool {
    matches!(
        tokio::time::timeout(SEND_TIMEOUT, send_frame(sink, frame)).await,
        Ok(Ok(()))
    )
}

fn close_reason(code: u16) -> &'static str {
    match code {
        CLOSE_GOING_AWAY => "server shutting down",
        CLOSE_SLOW_CONSUMER => "slow consumer",
        CLOSE_UNAUTHORIZED => "unauthorized",
        _ => "closing",
    }
}

/// Close the transport with a code before any frame was exchanged.
/// Used when admission fails.
pub async fn reject(socket: WebSocket, code: u16) {
    let (mut sink, _) = socket.split();
    let _ = sink
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: close_reason(code).into(),
        })))
        .await;
}

/// Run one admitted session to completion
pub async fn run(socket: WebSocket, broker: Arc<Broker>) {
    let session_id = Uuid::new_v4();
    let (sink, mut stream) = socket.split();
    let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));
    let subscriptions: SubscriptionMap = Arc::new(Mutex::new(HashMap::new()));

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    broker.register_session(session_id, SessionHandle::new(control_tx.clone()));
    tracing::debug!(session = %session_id, "Session opened");

    let mut close_code: Option<u16> = None;
    loop {
        tokio::select! {
            ctl = control_rx.recv() => {
                match ctl {
                    Some(SessionControl::Info { msg, topic }) => {
                        if !send_bounded(&sink, &ServerFrame::info(msg, topic)).await {
                            break;
                        }
                    }
                    Some(SessionControl::Close { code }) => {
                        close_code = Some(code);
                        break;
                    }
                    // Unreachable while we hold control_tx, but harmless
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let keep_going = handle_frame(
                            &broker,
                            session_id,
                            &sink,
                            &control_tx,
                            &subscriptions,
                            text.as_str(),
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Binary frames and transport-level ping/pong are ignored
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(session = %session_id, error = %err, "Transport read error");
                        break;
                    }
                }
            }
        }
    }

    // Teardown: detach every queue before the session is released. Writers
    // observe their closed queues and finish on their own.
    let owned: Vec<(String, Arc<SubscriberQueue>)> = {
        let mut subs = subscriptions.lock();
        subs.drain().collect()
    };
    for (topic, queue) in owned {
        queue.close();
        broker.detach_quiet(session_id, &topic);
    }

    if let Some(code) = close_code {
        let _ = tokio::time::timeout(SEND_TIMEOUT, async {
            sink.lock()
                .await
                .send(WsMessage::Close(Some(CloseFrame {
                    code,
                    reason: close_reason(code).into(),
                })))
                .await
        })
        .await;
    }

    broker.unregister_session(session_id);
    tracing::debug!(session = %session_id, "Session closed");
}

/// Dispatch one inbound frame. Returns false when the session must end.
async fn handle_frame(
    broker: &Arc<Broker>,
    session_id: Uuid,
    sink: &SharedSink,
    control: &mpsc::UnboundedSender<SessionControl>,
    subscriptions: &SubscriptionMap,
    text: &str,
) -> bool {
    let parsed = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            let frame = ServerFrame::error(
                None,
                ErrorCode::BadRequest,
                format!("malformed frame: {err}"),
            );
            return send_bounded(sink, &frame).await;
        }
    };

    let draining = broker.is_shutting_down();
    match parsed {
        // Pings are answered in every state, including while draining
        ClientFrame::Ping { request_id } => {
            send_bounded(sink, &ServerFrame::pong(request_id)).await
        }
        frame if draining => {
            let reply = ServerFrame::error(
                frame.request_id().map(str::to_string),
                ErrorCode::ServiceUnavailable,
                "server is shutting down",
            );
            send_bounded(sink, &reply).await
        }
        ClientFrame::Subscribe {
            topic,
            client_id,
            last_n,
            request_id,
        } => {
            handle_subscribe(
                broker,
                session_id,
                sink,
                control,
                subscriptions,
                topic,
                client_id,
                last_n,
                request_id,
            )
            .await
        }
        ClientFrame::Unsubscribe {
            topic,
            client_id: _,
            request_id,
        } => {
            // Stop the writer before detaching so no event can trail the ack
            if let Some(queue) = subscriptions.lock().remove(&topic) {
                queue.close();
            }
            let frame = match broker.unsubscribe(session_id, &topic) {
                Ok(()) => ServerFrame::ack(request_id, Some(topic)),
                Err(err) => ServerFrame::from_broker_error(request_id, &err),
            };
            send_bounded(sink, &frame).await
        }
        ClientFrame::Publish {
            topic,
            message,
            request_id,
        } => {
            let frame = match broker.publish(&topic, &message.id, message.payload) {
                Ok(_) => ServerFrame::ack(request_id, Some(topic)),
                Err(err) => ServerFrame::from_broker_error(request_id, &err),
            };
            send_bounded(sink, &frame).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_subscribe(
    broker: &Arc<Broker>,
    session_id: Uuid,
    sink: &SharedSink,
    control: &mpsc::UnboundedSender<SessionControl>,
    subscriptions: &SubscriptionMap,
    topic: String,
    client_id: String,
    last_n: Option<i64>,
    request_id: Option<String>,
) -> bool {
    let last_n = match last_n {
        None => 0,
        Some(n) if n >= 0 => n as usize,
        Some(n) => {
            let frame = ServerFrame::error(
                request_id,
                ErrorCode::BadRequest,
                format!("last_n must be >= 0, got {n}"),
            );
            return send_bounded(sink, &frame).await;
        }
    };

    let (queue, replay) = match broker.subscribe(session_id, &topic, &client_id, last_n) {
        Ok(attached) => attached,
        Err(err) => {
            let frame = ServerFrame::from_broker_error(request_id, &err);
            return send_bounded(sink, &frame).await;
        }
    };

    // Ack and the full replay batch go out before the writer exists, so
    // every live event trails the replay.
    if !send_bounded(sink, &ServerFrame::ack(request_id, Some(topic.clone()))).await {
        return false;
    }
    for msg in &replay {
        if !send_bounded(sink, &ServerFrame::event(&topic, msg)).await {
            return false;
        }
        broker.stats_handle().record_delivered(1);
    }

    subscriptions.lock().insert(topic.clone(), Arc::clone(&queue));
    SubscriptionWriter {
        broker: Arc::clone(broker),
        queue,
        topic,
        sink: Arc::clone(sink),
        control: control.clone(),
        subscriptions: Arc::clone(subscriptions),
    }
    .spawn();

    true
}
