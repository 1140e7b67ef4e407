//! Background task evicting idle sessions.

use callwire_session::SessionRegistry;
use std::time::Duration;
use tokio::time::sleep;

/// How often the sweep runs for a given retention window: half the window,
/// clamped to between one second and one minute.
pub fn sweep_interval(retention: Duration) -> Duration {
    Duration::from_secs((retention.as_secs() / 2).clamp(1, 60))
}

/// Starts a background task that periodically evicts sessions with no
/// listeners that have been idle for at least `retention`.
///
/// This task runs indefinitely. A zero `retention` disables eviction and the
/// task returns immediately.
pub async fn start_eviction_task(registry: SessionRegistry, retention: Duration) {
    if retention.is_zero() {
        tracing::warn!("session eviction disabled (retention=0)");
        return;
    }

    let interval = sweep_interval(retention);
    tracing::info!(
        retention_seconds = retention.as_secs(),
        interval_seconds = interval.as_secs(),
        "starting session eviction task"
    );

    loop {
        sleep(interval).await;

        let evicted = registry.sweep(retention);
        if evicted > 0 {
            tracing::info!(
                count = evicted,
                remaining = registry.session_count(),
                "evicted idle sessions"
            );
        } else {
            tracing::debug!("no idle sessions to evict");
        }
    }
}
