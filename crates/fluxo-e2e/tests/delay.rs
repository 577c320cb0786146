mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fluxo_core::{QueueConfig, QueueEngine};

/// A `delay_secs` subscription holds delivery back for exactly the delay and
/// then delivers once.
#[tokio::test(start_paused = true)]
async fn e2e_delayed_delivery_fires_after_the_delay() {
    helpers::init_tracing();
    let engine = QueueEngine::new();
    let calls = Arc::new(AtomicUsize::new(0));

    engine
        .subscribe(
            "reports.requested",
            helpers::counting_handler(calls.clone()),
            QueueConfig::default().with_delay_secs(30),
            "build-report",
        )
        .unwrap();
    engine
        .emit(helpers::test_event(
            "reports.requested",
            serde_json::json!({"reportId": "r-1"}),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        engine
            .metrics("reports.requested")
            .await
            .unwrap()
            .unwrap()
            .queue_depth,
        1
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    helpers::settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine
            .metrics("reports.requested")
            .await
            .unwrap()
            .unwrap()
            .queue_depth,
        0
    );
}

/// The delay applies per message from its own enqueue time.
#[tokio::test(start_paused = true)]
async fn e2e_delay_is_relative_to_each_enqueue() {
    helpers::init_tracing();
    let engine = QueueEngine::new();
    let calls = Arc::new(AtomicUsize::new(0));

    engine
        .subscribe(
            "reports.requested",
            helpers::counting_handler(calls.clone()),
            QueueConfig::default().with_delay_secs(10),
            "build-report",
        )
        .unwrap();

    engine
        .emit(helpers::test_event(
            "reports.requested",
            serde_json::json!({"reportId": "r-1"}),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    engine
        .emit(helpers::test_event(
            "reports.requested",
            serde_json::json!({"reportId": "r-2"}),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    helpers::settle().await;
    // Only the first message's delay has elapsed (t = 11 s).
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    helpers::settle().await;
    // t = 16 s: the second message became visible at 15 s.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
