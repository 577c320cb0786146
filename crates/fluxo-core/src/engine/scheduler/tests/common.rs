use std::collections::HashSet;
use std::sync::Mutex;

use super::*;

pub(super) fn test_event(topic: &str) -> Event {
    Event::new(topic, serde_json::json!({"value": 1}), "trace-1")
}

pub(super) fn event_with_data(topic: &str, data: serde_json::Value) -> Event {
    Event::new(topic, data, "trace-1")
}

/// Let spawned scan and handler tasks run to quiescence; advances the paused
/// clock by one millisecond.
pub(super) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub(super) async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

pub(super) fn counting_handler(calls: Arc<AtomicUsize>) -> Handler {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

pub(super) fn failing_handler(calls: Arc<AtomicUsize>) -> Handler {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::new("handler failed"))
        }
    })
}

/// Fails the first `fail_times` invocations, then succeeds.
pub(super) fn flaky_handler(calls: Arc<AtomicUsize>, fail_times: usize) -> Handler {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < fail_times {
                Err(HandlerError::new("transient failure"))
            } else {
                Ok(())
            }
        }
    })
}

pub(super) fn panicking_handler() -> Handler {
    Arc::new(|_event: Event| Box::pin(async { panic!("handler exploded") }))
}

/// Fails the first delivery of each distinct `data["key"]`, then succeeds.
pub(super) fn fail_once_per_key_handler(calls: Arc<AtomicUsize>) -> Handler {
    let seen: Arc<Mutex<HashSet<String>>> = Arc::default();
    handler_fn(move |event| {
        let calls = calls.clone();
        let seen = seen.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let key = event
                .data
                .get("key")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if seen.lock().unwrap().insert(key) {
                Err(HandlerError::new("first attempt fails"))
            } else {
                Ok(())
            }
        }
    })
}

/// Records invocation entry order and how many invocations overlap.
#[derive(Clone, Default)]
pub(super) struct Probe {
    inner: Arc<ProbeInner>,
}

#[derive(Default)]
struct ProbeInner {
    order: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Probe {
    pub(super) fn new() -> Self {
        Self::default()
    }

    fn enter(&self, event: &Event, field: &str) {
        let value = match event.data.get(field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        self.inner.order.lock().unwrap().push(value);
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(active, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(super) fn order(&self) -> Vec<String> {
        self.inner.order.lock().unwrap().clone()
    }

    pub(super) fn calls(&self) -> usize {
        self.inner.order.lock().unwrap().len()
    }

    pub(super) fn max_active(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }
}

/// Handler recording `data[field]` on entry, holding the invocation open for
/// `hold` so tests can observe overlap.
pub(super) fn probe_handler(probe: Probe, field: &'static str, hold: Duration) -> Handler {
    handler_fn(move |event| {
        let probe = probe.clone();
        async move {
            probe.enter(&event, field);
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            probe.exit();
            Ok(())
        }
    })
}

/// Like [`probe_handler`] keyed on `data["key"]`, but fails whenever
/// `data["fail"]` is true.
pub(super) fn selective_handler(probe: Probe, hold: Duration) -> Handler {
    handler_fn(move |event| {
        let probe = probe.clone();
        async move {
            probe.enter(&event, "key");
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            probe.exit();
            if event
                .data
                .get("fail")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                Err(HandlerError::new("requested failure"))
            } else {
                Ok(())
            }
        }
    })
}
