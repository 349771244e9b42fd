use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::scheduler::Scheduler;

/// Background task that rewrites the journal once enough records have
/// accumulated since the last compaction.
pub async fn run_compactor(scheduler: Arc<Scheduler>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let records = scheduler.journal_records_since_compact().await;
        if records < threshold {
            continue;
        }
        match scheduler.compact_journal().await {
            Ok(()) => info!("compacted journal after {records} records"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}
