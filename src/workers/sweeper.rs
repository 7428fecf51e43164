use crate::infrastructure::storage::workspace::Workspace;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Reclaims scratch files left behind by crashed or abandoned requests. Runs
/// for the lifetime of the process.
pub fn start_sweeper(workspace: Workspace, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "🧹 Starting scratch sweeper (every {}s, max age {}s)",
            interval.as_secs(),
            max_age.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = workspace.sweep(max_age).await;
            if removed > 0 {
                info!("🧹 Removed {} stale scratch files", removed);
            } else {
                debug!("Sweep found nothing to remove");
            }
        }
    })
}
