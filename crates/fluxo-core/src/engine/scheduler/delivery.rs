use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::error;

use super::*;
use crate::error::HandlerError;
use crate::queue::QueueType;

impl Scheduler {
    /// Re-evaluate one topic: dispatch every message that is visible, not
    /// already in flight, and not blocked by a held group lock. Scan order is
    /// enqueue order; locks acquired earlier in the pass block later
    /// same-group messages within it.
    pub(super) fn scan_topic(&mut self, topic: &str) {
        let Some(queue) = self.queues.get(topic) else {
            return;
        };

        let now = Instant::now();
        let candidates: Vec<Uuid> = queue
            .iter()
            .filter(|m| m.visible_at <= now && !self.in_flight.contains_key(&m.id))
            .map(|m| m.id)
            .collect();

        for message_id in candidates {
            let Some(msg) = self
                .queues
                .get(topic)
                .and_then(|q| q.iter().find(|m| m.id == message_id))
            else {
                continue;
            };

            // Only a fifo message with a resolved group serializes; standard
            // messages and groupless fifo messages dispatch unlocked.
            let lock_key = match (msg.queue_config.queue_type, &msg.group_id) {
                (QueueType::Fifo, Some(group_id)) => {
                    let key = group_lock_key(topic, group_id);
                    if self.locked_groups.contains(&key) {
                        continue;
                    }
                    Some(key)
                }
                _ => None,
            };

            self.dispatch(topic, message_id, lock_key, now);
        }
    }

    /// Resolve the message's subscription and start its handler.
    fn dispatch(&mut self, topic: &str, message_id: Uuid, lock_key: Option<String>, now: Instant) {
        let resolved = {
            let Some(msg) = self
                .queues
                .get(topic)
                .and_then(|q| q.iter().find(|m| m.id == message_id))
            else {
                return;
            };
            let subs = self
                .subscriptions
                .get(topic)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            // Exact handler generation first, then the stable subscription id
            // (a hot-reloaded handler), then whatever is left.
            subs.iter()
                .find(|s| s.internal_id == msg.internal_id)
                .or_else(|| subs.iter().find(|s| s.subscription_id == msg.subscription_id))
                .or_else(|| subs.first())
                .map(|s| {
                    (
                        s.handler.clone(),
                        s.queue_config.clone(),
                        s.subscription_id.clone(),
                        s.internal_id,
                    )
                })
        };

        let Some((handler, config, subscription_id, sub_internal_id)) = resolved else {
            // Orphaned by unsubscribe: nothing can ever run this message.
            debug!(%topic, %message_id, "dropping message with no remaining subscription");
            self.remove_message(topic, message_id);
            return;
        };

        let event = {
            let Some(msg) = self
                .queues
                .get_mut(topic)
                .and_then(|q| q.iter_mut().find(|m| m.id == message_id))
            else {
                return;
            };
            // The handler behind this message was replaced while it was
            // retrying: the new generation starts with a fresh attempt budget.
            if msg.internal_id != sub_internal_id && msg.attempts > 0 {
                debug!(
                    %topic,
                    %message_id,
                    subscription_id = %subscription_id,
                    "handler replaced, resetting attempts"
                );
                msg.attempts = 0;
                msg.internal_id = sub_internal_id;
                msg.subscription_id = subscription_id;
                msg.visible_at = now;
            }
            msg.event.clone()
        };

        if let Some(ref key) = lock_key {
            self.locked_groups.insert(key.clone());
        }
        self.in_flight.insert(
            message_id,
            InFlight {
                lock_key,
                visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
                max_retries: config.max_retries,
            },
        );
        self.bump_metric(topic, |m| m.processing_count += 1);

        let tx = self.commands.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            // Contain panics alongside plain `Err` returns: nothing a handler
            // does may escape the engine.
            let result = AssertUnwindSafe(handler(event))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));
            let _ = tx.send(EngineCommand::Completed {
                topic,
                message_id,
                result,
            });
        });
    }

    pub(super) fn handle_completed(
        &mut self,
        topic: &str,
        message_id: Uuid,
        result: std::result::Result<(), HandlerError>,
    ) {
        // Unknown id: the engine was reset while this handler ran. The
        // completion belongs to a previous generation of state.
        let Some(inflight) = self.in_flight.remove(&message_id) else {
            return;
        };
        self.bump_metric(topic, |m| {
            m.processing_count = m.processing_count.saturating_sub(1);
        });

        match result {
            Ok(()) => {
                debug!(%topic, %message_id, "message processed");
                self.otel.record_delivered(topic);
                self.remove_message(topic, message_id);
                self.release_lock(inflight.lock_key.as_deref());
                // Drain whatever became eligible, including the next message
                // of the just-unlocked group.
                self.scan_topic(topic);
            }
            Err(err) => self.handle_failure(topic, message_id, inflight, err),
        }
    }

    fn handle_failure(
        &mut self,
        topic: &str,
        message_id: Uuid,
        inflight: InFlight,
        err: HandlerError,
    ) {
        let attempts;
        let retry;
        {
            let Some(msg) = self
                .queues
                .get_mut(topic)
                .and_then(|q| q.iter_mut().find(|m| m.id == message_id))
            else {
                self.release_lock(inflight.lock_key.as_deref());
                return;
            };
            msg.attempts += 1;
            attempts = msg.attempts;
            retry = attempts < inflight.max_retries;
            if retry {
                // Fixed retry delay: always exactly the visibility timeout,
                // no backoff, no jitter.
                msg.visible_at = Instant::now() + inflight.visibility_timeout;
            }
        }

        if retry {
            debug!(%topic, %message_id, attempts, error = %err, "handler failed, retry scheduled");
            self.bump_metric(topic, |m| m.retries_count += 1);
            self.otel.record_retried(topic);
            self.release_lock(inflight.lock_key.as_deref());
            self.schedule_scan(topic, inflight.visibility_timeout);
        } else {
            error!(
                %topic,
                %message_id,
                attempts,
                error = %err,
                "message moved to dead-letter queue after max retries"
            );
            self.bump_metric(topic, |m| m.dlq_count += 1);
            self.otel.record_dead_lettered(topic);
            self.remove_message(topic, message_id);
            self.release_lock(inflight.lock_key.as_deref());
            self.scan_topic(topic);
        }
    }
}
