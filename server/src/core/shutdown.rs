//! Centralized shutdown management
//!
//! One service coordinates every shutdown trigger (REST, Ctrl+C, SIGTERM)
//! and runs the drain procedure: stop admissions, notify sessions, wait for
//! subscriber queues to empty within the budget, then force the remaining
//! sessions closed. The HTTP listener stays up through the drain so health
//! and stats keep answering, and only stops once the drain has finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::broker::Broker;
use crate::core::constants::{CLOSE_GOING_AWAY, DRAIN_POLL_INTERVAL_MS};

/// Centralized shutdown service for coordinating graceful shutdown
#[derive(Clone)]
pub struct ShutdownService {
    trigger_tx: Arc<watch::Sender<bool>>,
    trigger_rx: watch::Receiver<bool>,
    drained_tx: Arc<watch::Sender<bool>>,
    drained_rx: watch::Receiver<bool>,
    broker: Arc<Broker>,
    budget: Duration,
    drain_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ShutdownService {
    pub fn new(broker: Arc<Broker>) -> Self {
        let budget = Duration::from_secs(broker.config().shutdown_timeout_seconds);
        let (trigger_tx, trigger_rx) = watch::channel(false);
        let (drained_tx, drained_rx) = watch::channel(false);
        Self {
            trigger_tx: Arc::new(trigger_tx),
            trigger_rx,
            drained_tx: Arc::new(drained_tx),
            drained_rx,
            broker,
            budget,
            drain_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to the shutdown trigger signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.trigger_rx.clone()
    }

    /// Trigger shutdown. Admissions stop immediately; the drain proceeds
    /// asynchronously. Returns false if shutdown was already in progress.
    pub fn trigger(&self) -> bool {
        if !self.broker.begin_shutdown() {
            return false;
        }
        let _ = self.trigger_tx.send(true);
        true
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        *self.trigger_rx.borrow()
    }

    /// Wait for the shutdown trigger
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.trigger_rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Wait for the drain to finish; the listener uses this so REST stays
    /// available while sessions are closing.
    pub fn wait_drained(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.drained_rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Spawn the watcher that runs the drain once shutdown is triggered
    pub async fn spawn_drain(&self) {
        let mut rx = self.trigger_rx.clone();
        let drained_tx = Arc::clone(&self.drained_tx);
        let broker = Arc::clone(&self.broker);
        let budget = self.budget;

        let handle = tokio::spawn(async move {
            if rx.wait_for(|&v| v).await.is_err() {
                return;
            }
            drain(&broker, budget).await;
            let _ = drained_tx.send(true);
        });
        *self.drain_task.lock().await = Some(handle);
    }

    /// Await drain completion after the HTTP server has stopped
    pub async fn finish(&self) {
        let handle = self.drain_task.lock().await.take();
        if let Some(handle) = handle {
            let grace = self.budget + Duration::from_secs(5);
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!("Timeout waiting for drain task");
            }
        }
    }

    /// Install OS signal handlers and auto-trigger on Ctrl+C/SIGTERM
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::debug!("Received Ctrl+C, shutting down"),
                _ = terminate => tracing::debug!("Received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}

/// The drain procedure: notify, wait for empty queues within the budget,
/// close every session, release topic storage.
async fn drain(broker: &Broker, budget: Duration) {
    tracing::info!(budget_secs = budget.as_secs(), "Draining for shutdown");
    broker.broadcast_info("server shutting down");

    let deadline = tokio::time::Instant::now() + budget;
    let poll = Duration::from_millis(DRAIN_POLL_INTERVAL_MS);
    loop {
        if broker.all_queues_empty() {
            tracing::debug!("All subscriber queues drained");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                budget_secs = budget.as_secs(),
                "Drain budget expired with messages still queued"
            );
            break;
        }
        tokio::time::sleep(poll).await;
    }

    broker.close_all_sessions(CLOSE_GOING_AWAY);

    // Give sessions a moment to flush their close frames before storage
    // is released
    let grace_deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while broker.session_count() > 0 && tokio::time::Instant::now() < grace_deadline {
        tokio::time::sleep(poll).await;
    }

    broker.clear_topics();
    tracing::info!("Shutdown drain complete");
}
