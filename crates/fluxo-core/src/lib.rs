pub mod engine;
pub mod error;
pub mod event;
mod message;
pub mod queue;

pub use engine::{QueueEngine, QueueMetrics, SubscriptionHandle};
pub use error::{EngineError, HandlerError, Result};
pub use event::{handler_fn, Event, Handler, HandlerFuture};
pub use queue::{QueueConfig, QueueType};
