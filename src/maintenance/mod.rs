use std::io::ErrorKind;

use chrono::{Duration, Utc};
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{info, warn};

use crate::{AppState, modules::filters};

const SWEEP_INTERVAL_MINUTES: u64 = 15;
const SESSION_IDLE_MINUTES: i64 = 60;

/// Periodically drops filter-wizard sessions that have gone idle, aborting
/// their background work and removing their on-disk working directories.
pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        let interval = TokioDuration::from_secs(SWEEP_INTERVAL_MINUTES * 60);
        loop {
            sleep(interval).await;
            let removed = sweep_filter_sessions(&state).await;
            if removed > 0 {
                info!(removed, "expired filter sessions cleaned up");
            }
        }
    });
}

async fn sweep_filter_sessions(state: &AppState) -> u64 {
    let cutoff = Utc::now() - Duration::minutes(SESSION_IDLE_MINUTES);
    let expired = state.filter_sessions().idle_since(cutoff).await;

    let mut removed = 0_u64;
    for id in expired {
        if state.filter_sessions().remove(id).await.is_none() {
            continue;
        }

        match tokio::fs::remove_dir_all(filters::session_dir(id)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(?err, %id, "failed to remove filter session directory");
                continue;
            }
        }

        removed += 1;
    }

    removed
}
