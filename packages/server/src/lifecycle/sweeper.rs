use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::AssetLifecycle;
use crate::config::SweeperConfig;

/// Run the orphan sweep as a background task.
pub async fn run_asset_sweeper(lifecycle: Arc<AssetLifecycle>, config: SweeperConfig) {
    let scan_interval = Duration::from_secs(config.interval_secs.max(1));

    info!(
        interval_secs = config.interval_secs,
        retention_secs = config.retention_secs,
        "Starting asset sweeper"
    );

    let mut interval = tokio::time::interval(scan_interval);
    // The first tick completes immediately; skip it so startup does no work.
    interval.tick().await;

    loop {
        interval.tick().await;

        if let Err(e) = lifecycle.sweep(config.retention()).await {
            error!(error = %e, "Asset sweep failed");
        }
    }
}
