//! Background retention sweeper
//!
//! Conversations idle longer than the configured retention period are
//! removed by a periodic background task. The first tick fires after a
//! full interval, not at startup, so a restart loop never hammers the
//! store.

use crate::store::ConversationStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawns the retention sweeper.
///
/// Every `interval`, conversations whose `updated_at` is older than
/// `retention` are deleted. The task runs until the returned handle is
/// aborted or the runtime shuts down.
pub fn spawn_retention_sweeper(
    store: Arc<ConversationStore>,
    interval: Duration,
    retention: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would sweep at startup
        ticker.tick().await;

        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_hours = retention.num_hours(),
            "retention sweeper started"
        );

        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - retention;
            let removed = store.sweep_expired(cutoff).await;
            tracing::debug!(removed, "retention sweep complete");
        }
    })
}
