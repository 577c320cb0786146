mod command;
pub mod metrics;
mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::event::{Event, Handler};
use crate::queue::QueueConfig;

use command::{EngineCommand, Subscription};
pub use metrics::QueueMetrics;
use scheduler::Scheduler;

/// Identifies a registered subscription. Returned by
/// [`QueueEngine::subscribe`]; required to unsubscribe. Keyed on the
/// subscription itself rather than handler identity, so two subscriptions
/// sharing one handler function stay independently removable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: String,
    id: Uuid,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// In-process queue and delivery engine for step handlers.
///
/// Reproduces cloud-queue semantics entirely in memory: standard and FIFO
/// queues, initial delivery delays, visibility-timeout retries,
/// dead-lettering, per-group mutual exclusion, and hot handler replacement
/// without losing in-flight work. Delivery is at-least-once, with at most
/// one concurrent handler per FIFO message group.
///
/// The engine is a cloneable handle over a single scheduler task that owns
/// all mutable state; every operation is a command processed in arrival
/// order. Dropping the last handle shuts the scheduler down.
#[derive(Clone)]
pub struct QueueEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl QueueEngine {
    /// Create an engine and spawn its scheduler task. Must be called from
    /// within a Tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(rx, tx.clone());
        tokio::spawn(scheduler.run());
        info!("queue engine started");
        Self {
            inner: Arc::new(EngineInner { command_tx: tx }),
        }
    }

    /// Register a handler on a topic.
    ///
    /// `subscription_id` is caller-supplied and should stay stable across hot
    /// reloads of the same logical step: a message mid-retry follows it to
    /// the replacement handler with a fresh attempt budget. Queued retries
    /// from other subscription generations become immediately visible.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        handler: Handler,
        queue_config: QueueConfig,
        subscription_id: impl Into<String>,
    ) -> Result<SubscriptionHandle> {
        queue_config.validate()?;
        let topic = topic.into();
        let subscription = Subscription {
            handler,
            queue_config,
            subscription_id: subscription_id.into(),
            internal_id: Uuid::now_v7(),
        };
        let handle = SubscriptionHandle {
            topic: topic.clone(),
            id: subscription.internal_id,
        };
        self.send(EngineCommand::Subscribe {
            topic,
            subscription,
        })?;
        Ok(handle)
    }

    /// Remove a subscription. An already-dispatched handler invocation runs
    /// to completion; messages left queued for the topic with no remaining
    /// subscription are dropped at their next scan. Unknown handles are a
    /// no-op.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.request(|reply| EngineCommand::Unsubscribe {
            topic: handle.topic.clone(),
            internal_id: handle.id,
            reply,
        })
        .await
    }

    /// Publish an event to a topic: one message per current subscription.
    /// Publishing to a topic with no subscribers is a silent no-op.
    ///
    /// `explicit_group_id` overrides group extraction from each
    /// subscription's queue config; an explicit empty string is a valid
    /// group.
    pub async fn enqueue(
        &self,
        topic: impl Into<String>,
        event: Event,
        explicit_group_id: Option<String>,
    ) -> Result<()> {
        let topic = topic.into();
        self.request(|reply| EngineCommand::Enqueue {
            topic,
            event,
            explicit_group_id,
            reply,
        })
        .await
    }

    /// Publish an event to its own topic, forwarding the event's
    /// `message_group_id` as the explicit group.
    pub async fn emit(&self, event: Event) -> Result<()> {
        let topic = event.topic.clone();
        let explicit_group_id = event.message_group_id.clone();
        self.enqueue(topic, event, explicit_group_id).await
    }

    /// Per-topic counters, or `None` for a topic the engine has never
    /// queued a message for.
    pub async fn metrics(&self, topic: impl Into<String>) -> Result<Option<QueueMetrics>> {
        let topic = topic.into();
        self.request(|reply| EngineCommand::GetMetrics { topic, reply })
            .await
    }

    /// Snapshot of every topic's counters.
    pub async fn all_metrics(&self) -> Result<HashMap<String, QueueMetrics>> {
        self.request(|reply| EngineCommand::GetAllMetrics { reply })
            .await
    }

    /// Number of active subscriptions on a topic.
    pub async fn subscription_count(&self, topic: impl Into<String>) -> Result<usize> {
        let topic = topic.into();
        self.request(|reply| EngineCommand::SubscriptionCount { topic, reply })
            .await
    }

    /// Topics with at least one active subscription, sorted.
    pub async fn topics(&self) -> Result<Vec<String>> {
        self.request(|reply| EngineCommand::Topics { reply }).await
    }

    /// Drop all subscriptions, queued messages, locks, metrics, and pending
    /// timers. Handlers already running finish but their outcomes are
    /// discarded. The engine is reusable afterwards.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Reset { reply }).await
    }

    /// Stop the scheduler task. Also sent automatically when the last engine
    /// handle drops.
    pub fn shutdown(&self) {
        let _ = self.inner.command_tx.send(EngineCommand::Shutdown);
    }

    fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(cmd)
            .map_err(|_| EngineError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| EngineError::Closed)
    }
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
    }
}
