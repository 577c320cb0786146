use tokio::time::Instant;

use super::*;
use crate::event::Event;
use crate::message::{extract_message_group_id, QueuedMessage};

impl Scheduler {
    pub(super) fn handle_subscribe(&mut self, topic: String, subscription: Subscription) {
        let internal_id = subscription.internal_id;
        let subscription_id = subscription.subscription_id.clone();
        self.subscriptions
            .entry(topic.clone())
            .or_default()
            .push(subscription);

        // A replacement subscription makes retries stuck behind an old
        // handler generation's visibility window immediately eligible again,
        // instead of waiting the window out.
        let Some(queue) = self.queues.get_mut(&topic) else {
            return;
        };
        if queue.is_empty() {
            return;
        }
        let now = Instant::now();
        for msg in queue.iter_mut() {
            if msg.internal_id != internal_id
                && msg.subscription_id != subscription_id
                && msg.attempts > 0
            {
                msg.visible_at = now;
            }
        }
        self.scan_topic(&topic);
    }

    pub(super) fn handle_unsubscribe(&mut self, topic: &str, internal_id: Uuid) {
        let Some(subs) = self.subscriptions.get_mut(topic) else {
            return;
        };
        subs.retain(|s| s.internal_id != internal_id);

        // Last subscription gone: stop tracking the topic. Queued messages
        // are not purged — they are dropped at their next scan when no
        // subscription resolves for them.
        if subs.is_empty() {
            self.subscriptions.remove(topic);
        }
    }

    pub(super) fn handle_enqueue(
        &mut self,
        topic: String,
        event: Event,
        explicit_group_id: Option<String>,
    ) {
        // Fire-and-forget pub/sub: no subscribers means no backlog and no
        // metrics entry.
        let Some(subs) = self.subscriptions.get(&topic) else {
            debug!(%topic, "enqueue to topic without subscriptions, dropping");
            return;
        };

        let now = Instant::now();
        let mut batch = Vec::with_capacity(subs.len());
        let mut delays = Vec::with_capacity(subs.len());
        for sub in subs {
            // An explicit group id wins over config extraction, even when it
            // is an empty string.
            let group_id = match explicit_group_id {
                Some(ref group) => Some(group.clone()),
                None => {
                    extract_message_group_id(&event, sub.queue_config.message_group_id.as_deref())
                }
            };
            let delay = Duration::from_secs(sub.queue_config.delay_secs);
            batch.push(QueuedMessage {
                id: Uuid::now_v7(),
                event: event.clone(),
                attempts: 0,
                visible_at: now + delay,
                group_id,
                queue_config: sub.queue_config.clone(),
                subscription_id: sub.subscription_id.clone(),
                internal_id: sub.internal_id,
            });
            delays.push(delay);
        }

        let count = batch.len() as u64;
        self.queues.entry(topic.clone()).or_default().extend(batch);
        self.bump_metric(&topic, |m| m.queue_depth += count);
        self.otel.record_enqueued(&topic, count);

        let mut scan_now = false;
        for delay in delays {
            if delay.is_zero() {
                scan_now = true;
            } else {
                self.schedule_scan(&topic, delay);
            }
        }
        if scan_now {
            self.scan_topic(&topic);
        }
    }

    /// Drop all engine state and cancel outstanding scan timers. Handlers
    /// already running are not interrupted; their completions arrive for
    /// unknown message ids and are ignored.
    pub(super) fn handle_reset(&mut self) {
        self.timers.cancel();
        self.timers = CancellationToken::new();

        // Zero the gauges for every topic we reported on before forgetting it.
        for topic in self.metrics.keys() {
            self.otel.set_queue_depth(topic, 0);
            self.otel.set_in_flight(topic, 0);
        }

        self.queues.clear();
        self.subscriptions.clear();
        self.locked_groups.clear();
        self.in_flight.clear();
        self.metrics.clear();
    }
}
