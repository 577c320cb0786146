use std::collections::HashMap;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::engine::metrics::QueueMetrics;
use crate::error::HandlerError;
use crate::event::{Event, Handler};
use crate::queue::QueueConfig;

/// A handler registered on a topic. `subscription_id` is caller-supplied and
/// stable across hot reloads; `internal_id` is fresh per subscribe call and
/// distinguishes handler generations.
pub(crate) struct Subscription {
    pub(crate) handler: Handler,
    pub(crate) queue_config: QueueConfig,
    pub(crate) subscription_id: String,
    pub(crate) internal_id: Uuid,
}

/// Commands processed by the scheduler task, strictly in arrival order.
///
/// Variants that answer the caller carry a `tokio::sync::oneshot` reply
/// sender. Engine-internal traffic — scan timers firing, handler tasks
/// reporting completion — is fire-and-forget.
pub(crate) enum EngineCommand {
    Subscribe {
        topic: String,
        subscription: Subscription,
    },
    Unsubscribe {
        topic: String,
        internal_id: Uuid,
        reply: oneshot::Sender<()>,
    },
    Enqueue {
        topic: String,
        event: Event,
        explicit_group_id: Option<String>,
        reply: oneshot::Sender<()>,
    },
    /// Re-evaluate a topic's queue: dispatch every visible, unlocked message.
    Scan { topic: String },
    /// A spawned handler task finished.
    Completed {
        topic: String,
        message_id: Uuid,
        result: std::result::Result<(), HandlerError>,
    },
    GetMetrics {
        topic: String,
        reply: oneshot::Sender<Option<QueueMetrics>>,
    },
    GetAllMetrics {
        reply: oneshot::Sender<HashMap<String, QueueMetrics>>,
    },
    SubscriptionCount {
        topic: String,
        reply: oneshot::Sender<usize>,
    },
    Topics {
        reply: oneshot::Sender<Vec<String>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}
