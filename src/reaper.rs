use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;

const REAP_INTERVAL: Duration = Duration::from_secs(5);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that cancels PENDING bookings older than the engine's
/// pending TTL, returning their stock to the ledger.
pub async fn run_reaper(engine: Arc<Engine>) {
    if engine.settings.pending_ttl.is_none() {
        debug!("pending expiry disabled");
        return;
    }
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        let expired = engine.expire_stale_pending().await;
        if expired > 0 {
            debug!(expired, "reaper sweep");
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            warn!(error = %e, "WAL compaction failed");
        }
    }
}
