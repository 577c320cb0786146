use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::command::{EngineCommand, Subscription};
use crate::engine::metrics::{Metrics, QueueMetrics};
use crate::message::QueuedMessage;

mod delivery;
mod handlers;

/// Bookkeeping for a message whose handler is currently running. The
/// visibility timeout and retry budget are snapshotted from the subscription
/// resolved at dispatch time, so after a hot reload they follow the handler
/// that actually ran, not the enqueue-time config.
pub(super) struct InFlight {
    pub(super) lock_key: Option<String>,
    pub(super) visibility_timeout: Duration,
    pub(super) max_retries: u32,
}

/// Lock key for a FIFO message group.
pub(super) fn group_lock_key(topic: &str, group_id: &str) -> String {
    format!("{topic}:{group_id}")
}

/// Single-task scheduler core. Owns every piece of mutable engine state —
/// subscription registry, message store, group lock table, in-flight table,
/// metrics — and mutates it only while processing one command at a time.
/// Handlers and scan timers run as spawned tasks that report back through
/// the command channel; the scheduler itself never awaits them.
pub(crate) struct Scheduler {
    inbound: mpsc::UnboundedReceiver<EngineCommand>,
    /// Self-sender handed to timer and handler tasks.
    commands: mpsc::UnboundedSender<EngineCommand>,
    subscriptions: HashMap<String, Vec<Subscription>>,
    /// Per-topic queued messages in enqueue order. An entry is dropped when
    /// its last message drains and re-created on the next enqueue.
    queues: HashMap<String, Vec<QueuedMessage>>,
    /// Held `(topic, group)` locks, keyed by [`group_lock_key`].
    locked_groups: HashSet<String>,
    /// Messages with a running handler, keyed by message id.
    in_flight: HashMap<Uuid, InFlight>,
    metrics: HashMap<String, QueueMetrics>,
    otel: Metrics,
    /// Cancels outstanding scan timers; replaced on reset.
    timers: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new(
        inbound: mpsc::UnboundedReceiver<EngineCommand>,
        commands: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        Self {
            inbound,
            commands,
            subscriptions: HashMap::new(),
            queues: HashMap::new(),
            locked_groups: HashSet::new(),
            in_flight: HashMap::new(),
            metrics: HashMap::new(),
            otel: Metrics::new(),
            timers: CancellationToken::new(),
        }
    }

    /// Run the scheduler loop until a `Shutdown` command arrives or every
    /// command sender is gone.
    pub(crate) async fn run(mut self) {
        info!("queue engine scheduler started");

        while let Some(cmd) = self.inbound.recv().await {
            let keep_running = self.handle_command(cmd);
            self.record_gauges();
            if !keep_running {
                break;
            }
        }

        info!("queue engine scheduler stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Subscribe {
                topic,
                subscription,
            } => {
                debug!(
                    %topic,
                    subscription_id = %subscription.subscription_id,
                    internal_id = %subscription.internal_id,
                    "subscribe command received"
                );
                self.handle_subscribe(topic, subscription);
            }
            EngineCommand::Unsubscribe {
                topic,
                internal_id,
                reply,
            } => {
                debug!(%topic, %internal_id, "unsubscribe command received");
                self.handle_unsubscribe(&topic, internal_id);
                let _ = reply.send(());
            }
            EngineCommand::Enqueue {
                topic,
                event,
                explicit_group_id,
                reply,
            } => {
                debug!(%topic, trace_id = %event.trace_id, "enqueue command received");
                self.handle_enqueue(topic, event, explicit_group_id);
                let _ = reply.send(());
            }
            EngineCommand::Scan { topic } => self.scan_topic(&topic),
            EngineCommand::Completed {
                topic,
                message_id,
                result,
            } => self.handle_completed(&topic, message_id, result),
            EngineCommand::GetMetrics { topic, reply } => {
                let _ = reply.send(self.metrics.get(&topic).copied());
            }
            EngineCommand::GetAllMetrics { reply } => {
                let _ = reply.send(self.metrics.clone());
            }
            EngineCommand::SubscriptionCount { topic, reply } => {
                let _ = reply.send(self.subscriptions.get(&topic).map_or(0, Vec::len));
            }
            EngineCommand::Topics { reply } => {
                let mut topics: Vec<String> = self.subscriptions.keys().cloned().collect();
                topics.sort();
                let _ = reply.send(topics);
            }
            EngineCommand::Reset { reply } => {
                info!("reset command received");
                self.handle_reset();
                let _ = reply.send(());
            }
            EngineCommand::Shutdown => {
                info!("shutdown command received");
                self.timers.cancel();
                return false;
            }
        }
        true
    }

    /// Ask for a re-evaluation of `topic` after `delay`. Zero-delay requests
    /// are handled inline by the caller; this path spawns a cancellable
    /// timer task that sends a `Scan` command when it fires.
    fn schedule_scan(&self, topic: &str, delay: Duration) {
        let tx = self.commands.clone();
        let token = self.timers.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(EngineCommand::Scan { topic });
                }
            }
        });
    }

    fn bump_metric(&mut self, topic: &str, update: impl FnOnce(&mut QueueMetrics)) {
        update(self.metrics.entry(topic.to_string()).or_default());
    }

    fn release_lock(&mut self, lock_key: Option<&str>) {
        if let Some(key) = lock_key {
            self.locked_groups.remove(key);
        }
    }

    /// Remove a message from its topic queue, if still present, and drop the
    /// queue entry once empty.
    fn remove_message(&mut self, topic: &str, message_id: Uuid) {
        let Some(queue) = self.queues.get_mut(topic) else {
            return;
        };
        let removed = match queue.iter().position(|m| m.id == message_id) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        };
        let drained = queue.is_empty();
        if removed {
            self.bump_metric(topic, |m| m.queue_depth = m.queue_depth.saturating_sub(1));
        }
        if drained {
            self.queues.remove(topic);
        }
    }

    fn record_gauges(&self) {
        for (topic, m) in &self.metrics {
            self.otel.set_queue_depth(topic, m.queue_depth);
            self.otel.set_in_flight(topic, m.processing_count);
        }
    }
}

#[cfg(test)]
mod tests;
