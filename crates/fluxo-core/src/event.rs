use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandlerError;

/// An event published to a topic. The payload is opaque to the engine; only
/// `data`, `trace_id`, and `message_group_id` are ever inspected, and only to
/// resolve the message group of a FIFO delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub data: Value,
    pub trace_id: String,
    /// Flow labels attached by the step runtime, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<Vec<String>>,
    /// Explicit message group for this event. When set, `emit` forwards it in
    /// place of any group extracted from the subscription's queue config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
}

impl Event {
    pub fn new(topic: impl Into<String>, data: Value, trace_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            data,
            trace_id: trace_id.into(),
            flows: None,
            message_group_id: None,
        }
    }

    pub fn with_message_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self
    }

    pub fn with_flows(mut self, flows: Vec<String>) -> Self {
        self.flows = Some(flows);
        self
    }
}

/// Future returned by a single handler invocation.
pub type HandlerFuture = BoxFuture<'static, std::result::Result<(), HandlerError>>;

/// An async handler bound to a topic subscription. Invoked once per delivery
/// attempt; returning `Err` marks the attempt as failed and schedules a retry
/// after the subscription's visibility timeout.
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}
