use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::event::Event;
use crate::queue::QueueConfig;

/// A message resident in a topic's queue. One copy is created per
/// subscription present at enqueue time; subscriptions added later never see
/// it. The queue config is a snapshot — group resolution and the initial
/// delay are fixed at enqueue, while retry bookkeeping follows whichever
/// subscription the message resolves to at dispatch.
#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub(crate) id: Uuid,
    pub(crate) event: Event,
    pub(crate) attempts: u32,
    /// Sole eligibility gate: the message is invisible to scans before this.
    pub(crate) visible_at: Instant,
    pub(crate) group_id: Option<String>,
    pub(crate) queue_config: QueueConfig,
    pub(crate) subscription_id: String,
    pub(crate) internal_id: Uuid,
}

/// Resolve the message group for one subscription's copy of an event.
///
/// `message_group_id` is the subscription's configured source: `None` or an
/// empty string for no grouping, the literal `"traceId"` for the event's
/// trace id, anything else a field name looked up in `event.data`. A missing
/// or null field resolves to no group.
pub(crate) fn extract_message_group_id(
    event: &Event,
    message_group_id: Option<&str>,
) -> Option<String> {
    match message_group_id {
        None | Some("") => None,
        Some("traceId") => Some(event.trace_id.clone()),
        Some(field) => event.data.get(field).and_then(group_id_from_value),
    }
}

fn group_id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        // Numbers and bools are stringified; composite values use their JSON text.
        other => Some(other.to_string()),
    }
}
