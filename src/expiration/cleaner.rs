use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::storage::Database;
use crate::AppState;

/// Start the background sweep of expired key-value entries (codes, binding
/// tokens, cached sessions).
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.maintenance.cleanup_interval_seconds);
    let db = state.db.clone();

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&db).await;
        }
    })
}

pub async fn run_cleanup(db: &Database) -> usize {
    debug!("Running expiration cleanup");

    let db = db.clone();
    let result = tokio::task::spawn_blocking(move || db.cleanup_expired_kv(Utc::now())).await;

    match result {
        Ok(Ok(count)) => {
            if count > 0 {
                debug!(entries_cleaned = count, "Expired entries cleaned");
            }
            count
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to clean up expired entries");
            0
        }
        Err(e) => {
            error!(error = %e, "Expiration cleanup task panicked");
            0
        }
    }
}
