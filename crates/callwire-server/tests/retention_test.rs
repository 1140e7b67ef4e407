//! Tests for the background session eviction task.

use callwire_server::retention::start_eviction_task;
use callwire_session::{Listener, SessionRegistry};
use callwire_types::SessionCode;
use std::time::Duration;

fn code(raw: &str) -> SessionCode {
    SessionCode::parse(raw).unwrap()
}

#[tokio::test]
async fn eviction_disabled_when_retention_zero() {
    let handle = tokio::spawn(start_eviction_task(SessionRegistry::new(), Duration::ZERO));
    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(
        result.is_ok(),
        "eviction task with retention=0 should return immediately"
    );
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_are_evicted() {
    let registry = SessionRegistry::new();
    registry.get_or_create(&code("IDLE"));

    let (listener, _updates) = Listener::channel(8);
    registry.subscribe(&code("WATCHED"), &listener).await;

    tokio::spawn(start_eviction_task(registry.clone(), Duration::from_secs(10)));

    // Not idle long enough yet.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(registry.contains(&code("IDLE")));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!registry.contains(&code("IDLE")));
    assert!(registry.contains(&code("WATCHED")));
}

#[tokio::test(start_paused = true)]
async fn session_is_evicted_after_last_listener_leaves() {
    let registry = SessionRegistry::new();
    let (listener, updates) = Listener::channel(8);
    registry.subscribe(&code("A1B2"), &listener).await;

    tokio::spawn(start_eviction_task(registry.clone(), Duration::from_secs(4)));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(registry.contains(&code("A1B2")));

    // A dropped receiver counts as a closed connection.
    drop(updates);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!registry.contains(&code("A1B2")));
}
