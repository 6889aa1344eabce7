//! A once-per-slot status line, so an idle log still shows liveness.

use crate::block_roots::BlockRootCache;
use crate::head_tracker::HeadTracker;
use crate::prior_votes::PriorBlockVotes;
use crate::scheduler::JobScheduler;
use chain_time::ChainTime;
use parking_lot::RwLock;
use slog::info;
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;

pub fn spawn_notifier<T: ChainTime + 'static>(
    executor: &TaskExecutor,
    chain_time: Arc<T>,
    scheduler: JobScheduler,
    block_roots: Arc<BlockRootCache>,
    prior_votes: Arc<RwLock<PriorBlockVotes>>,
    head_tracker: Arc<HeadTracker>,
) {
    let log = executor.log().clone();
    executor.spawn(
        async move {
            loop {
                let sleep_time = chain_time
                    .duration_to_next_slot()
                    .unwrap_or_else(|| Duration::from_secs(12));
                tokio::time::sleep(sleep_time).await;

                let slot = match chain_time.now() {
                    Some(slot) => slot,
                    None => continue,
                };
                let head = head_tracker.current();
                info!(
                    log,
                    "Slot tick";
                    "slot" => %slot,
                    "epoch" => %slot.epoch(chain_time.slots_per_epoch()),
                    "head_slot" => head.map(|head| head.slot.as_u64()),
                    "pending_jobs" => scheduler.pending_jobs(),
                    "known_roots" => block_roots.len(),
                    "indexed_blocks" => prior_votes.read().len(),
                );
            }
        },
        "notifier",
    );
}
