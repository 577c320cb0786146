use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Delivery discipline for a subscription's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    /// No ordering guarantee; visible messages dispatch with full parallelism.
    #[default]
    Standard,
    /// At most one in-flight message per resolved message group, in enqueue
    /// order. Messages whose group cannot be resolved dispatch ungrouped.
    Fifo,
}

/// Queue configuration attached to a subscription. Snapshotted onto each
/// message at enqueue time; the retry budget and visibility timeout applied
/// to a delivery always come from the subscription resolved at dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    /// Attempts allowed before a message is dead-lettered.
    pub max_retries: u32,
    /// How long a failed message stays invisible before its next attempt.
    pub visibility_timeout_secs: u64,
    /// Initial delivery delay applied at enqueue.
    pub delay_secs: u64,
    /// Where to read the message group from: a field name in `event.data`,
    /// the literal `"traceId"` for the event's trace id, or `None` for no
    /// grouping. An empty string also means no grouping.
    pub message_group_id: Option<String>,
}

impl QueueConfig {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default visibility timeout: 15 minutes.
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 900;
    /// Ceiling on `delay_secs`: 15 minutes.
    pub const MAX_DELAY_SECS: u64 = 900;

    pub fn standard() -> Self {
        Self::default()
    }

    /// A FIFO config grouping by the given `event.data` field (or `"traceId"`).
    pub fn fifo(message_group_id: impl Into<String>) -> Self {
        Self {
            queue_type: QueueType::Fifo,
            message_group_id: Some(message_group_id.into()),
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_visibility_timeout_secs(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = secs;
        self
    }

    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Bounds enforced at subscribe time.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.delay_secs > Self::MAX_DELAY_SECS {
            return Err(EngineError::InvalidConfig(format!(
                "delay_secs {} exceeds the maximum of {} seconds",
                self.delay_secs,
                Self::MAX_DELAY_SECS
            )));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_type: QueueType::Standard,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            visibility_timeout_secs: Self::DEFAULT_VISIBILITY_TIMEOUT_SECS,
            delay_secs: 0,
            message_group_id: None,
        }
    }
}
