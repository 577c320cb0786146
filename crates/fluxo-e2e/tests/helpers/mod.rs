#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fluxo_core::{handler_fn, Event, Handler, HandlerError};
use tracing_subscriber::EnvFilter;

/// Initialize logging for a test run. Controlled by `RUST_LOG`, defaulting
/// to `info`; safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn test_event(topic: &str, data: serde_json::Value) -> Event {
    Event::new(topic, data, "trace-e2e")
}

/// Let spawned engine tasks run to quiescence; advances the paused clock by
/// one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn counting_handler(calls: Arc<AtomicUsize>) -> Handler {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Fails the first `fail_times` invocations, then succeeds.
pub fn flaky_handler(calls: Arc<AtomicUsize>, fail_times: usize) -> Handler {
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

pub fn failing_handler(calls: Arc<AtomicUsize>) -> Handler {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::new("handler failed"))
        }
    })
}

/// Records `data[field]` on entry and holds each invocation open for `hold`.
pub fn recording_handler(
    order: Arc<Mutex<Vec<String>>>,
    field: &'static str,
    hold: Duration,
) -> Handler {
    handler_fn(move |event| {
        let order = order.clone();
        async move {
            let value = match event.data.get(field) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            order.lock().unwrap().push(value);
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            Ok(())
        }
    })
}
