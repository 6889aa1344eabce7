//! The top-level event loop.
//!
//! The controller owns the SSE subscriptions to every beacon node, keeps the
//! block-root and prior-vote caches current, refreshes duties at epoch
//! boundaries and schedules the per-slot duty handlers. A chain-time ticker
//! backs the whole thing so duties still fire when every event stream is
//! silent.

use crate::api::{BeaconNodeApi, EventKind, EventTopic};
use crate::attestation_service::AttestationService;
use crate::block_roots::BlockRootCache;
use crate::block_service::BlockService;
use crate::config::Delays;
use crate::duties_service::DutiesService;
use crate::head_tracker::HeadTracker;
use crate::preparation_service::PreparationService;
use crate::prior_votes::PriorBlockVotes;
use crate::scheduler::JobScheduler;
use crate::strategy::MultiEndpoint;
use crate::sync_committee_service::SyncCommitteeService;
use chain_time::{ChainTime, TimeDelay};
use futures::StreamExt;
use parking_lot::RwLock;
use slog::{debug, error, info, warn, Logger};
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tokio::time::Instant;
use types::{Epoch, Hash256, Slot};

/// Backoff bounds for re-subscribing to a dropped event stream.
const INITIAL_SUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_SUBSCRIBE_BACKOFF: Duration = Duration::from_secs(64);

/// The job-name prefixes of every per-slot duty handler.
const DUTY_JOB_PREFIXES: [&str; 5] = [
    "propose/",
    "attest/",
    "attest_aggregate/",
    "sync_message/",
    "sync_aggregate/",
];

pub struct Controller<T: ChainTime + 'static> {
    pub(crate) chain_time: Arc<T>,
    pub(crate) time_delay: Arc<TimeDelay>,
    pub(crate) beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    pub(crate) scheduler: JobScheduler,
    pub(crate) duties_service: Arc<DutiesService<T>>,
    pub(crate) attestation_service: AttestationService<T>,
    pub(crate) block_service: BlockService<T>,
    pub(crate) sync_service: SyncCommitteeService<T>,
    pub(crate) preparation_service: PreparationService<T>,
    pub(crate) prior_votes: Arc<RwLock<PriorBlockVotes>>,
    pub(crate) block_roots: Arc<BlockRootCache>,
    pub(crate) head_tracker: Arc<HeadTracker>,
    pub(crate) delays: Delays,
    pub(crate) reorg_awareness: bool,
    pub(crate) executor: TaskExecutor,
    pub(crate) log: Logger,
}

impl<T: ChainTime + 'static> Controller<T> {
    /// Run until shutdown. Spawns one subscription task per beacon node and
    /// then drives the slot ticker.
    pub async fn run(self: Arc<Self>) {
        // Nothing to do before genesis.
        while self.chain_time.now().is_none() {
            let wait = self
                .chain_time
                .duration_to_next_slot()
                .unwrap_or_else(|| Duration::from_secs(1));
            info!(self.log, "Waiting for genesis"; "wait" => ?wait);
            tokio::time::sleep(wait).await;
        }

        let epoch = self
            .chain_time
            .current_epoch()
            .expect("chain time is post-genesis");
        self.refresh_epoch(epoch).await;

        for endpoint in self.beacon_nodes.endpoints() {
            let controller = self.clone();
            let id = endpoint.id().to_string();
            let beacon_node = endpoint.inner().clone();
            self.executor.spawn(
                async move {
                    controller.subscription_loop(id, beacon_node).await;
                },
                "event_subscription",
            );
        }

        if let Some(slot) = self.chain_time.now() {
            self.schedule_slot_jobs(slot);
        }

        loop {
            let sleep_time = self
                .chain_time
                .duration_to_next_slot()
                .unwrap_or_else(|| self.chain_time.slot_duration());
            tokio::time::sleep(sleep_time + self.time_delay.current()).await;

            let slot = match self.chain_time.now() {
                Some(slot) => slot,
                None => continue,
            };
            let epoch = slot.epoch(self.chain_time.slots_per_epoch());

            if slot.is_epoch_start(self.chain_time.slots_per_epoch())
                || !self.duties_service.has_duties_for(epoch)
            {
                self.refresh_epoch(epoch).await;
            }
            self.schedule_slot_jobs(slot);
        }
    }

    async fn refresh_epoch(&self, epoch: Epoch) {
        if let Err(error) = self.duties_service.refresh(epoch).await {
            error!(
                self.log,
                "Unable to refresh duties";
                "epoch" => %epoch,
                "error" => %error,
            );
            return;
        }
        self.preparation_service.register_validators(epoch).await;
    }

    /// Register this slot's duty handlers with the scheduler.
    pub(crate) fn schedule_slot_jobs(&self, slot: Slot) {
        let epoch = slot.epoch(self.chain_time.slots_per_epoch());
        let hack = self.time_delay.current();

        if self.duties_service.proposer_at(slot).is_some() {
            let service = self.block_service.clone();
            self.scheduler.schedule(
                format!("propose/{slot}"),
                self.instant_at(slot, hack),
                async move { service.propose(slot).await },
            );
        }

        if !self.duties_service.attesters_at(slot).is_empty() {
            let service = self.attestation_service.clone();
            self.scheduler.schedule(
                format!("attest/{slot}"),
                self.instant_at(slot, self.delays.max_attestation_delay() + hack),
                async move { service.attest(slot).await },
            );

            let service = self.attestation_service.clone();
            self.scheduler.schedule(
                format!("attest_aggregate/{slot}"),
                self.instant_at(slot, self.delays.attestation_aggregation_delay() + hack),
                async move { service.aggregate(slot).await },
            );
        }

        if !self.duties_service.sync_duties_for(epoch).is_empty() {
            let service = self.sync_service.clone();
            self.scheduler.schedule(
                format!("sync_message/{slot}"),
                self.instant_at(slot, self.delays.max_sync_committee_message_delay() + hack),
                async move { service.message(slot).await },
            );

            let service = self.sync_service.clone();
            self.scheduler.schedule(
                format!("sync_aggregate/{slot}"),
                self.instant_at(slot, self.delays.sync_committee_aggregation_delay() + hack),
                async move { service.aggregate(slot).await },
            );
        }
    }

    fn instant_at(&self, slot: Slot, offset: Duration) -> Instant {
        let target = self.chain_time.start_of_slot(slot) + offset;
        let now = self
            .chain_time
            .now_duration()
            .unwrap_or(target);
        Instant::now() + target.saturating_sub(now)
    }

    async fn subscription_loop(&self, id: String, beacon_node: Arc<dyn BeaconNodeApi>) {
        let topics = [
            EventTopic::Head,
            EventTopic::ChainReorg,
            EventTopic::FinalizedCheckpoint,
        ];
        let mut backoff = INITIAL_SUBSCRIBE_BACKOFF;
        loop {
            match beacon_node.subscribe_events(&topics).await {
                Ok(mut stream) => {
                    info!(self.log, "Subscribed to events"; "endpoint" => %id);
                    backoff = INITIAL_SUBSCRIBE_BACKOFF;
                    while let Some(event) = stream.next().await {
                        self.handle_event(event).await;
                    }
                    warn!(self.log, "Event stream ended"; "endpoint" => %id);
                }
                Err(error) => {
                    warn!(
                        self.log,
                        "Unable to subscribe to events";
                        "endpoint" => %id,
                        "error" => %error,
                    );
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_SUBSCRIBE_BACKOFF);
        }
    }

    pub(crate) async fn handle_event(&self, event: EventKind) {
        match event {
            EventKind::Head(head) => {
                // The same head arrives once per subscribed node.
                let previous = self.head_tracker.current();
                if previous.map_or(false, |info| info.root == head.block) {
                    return;
                }
                self.head_tracker.update(head.slot, head.block);
                self.block_roots.insert(head.block, head.slot);
                self.ingest_block(head.block).await;

                if Some(head.slot) == self.chain_time.now() {
                    // No point waiting out the attestation delay once the
                    // slot's block is here.
                    self.scheduler.run_now(&format!("attest/{}", head.slot));
                    self.scheduler
                        .run_now(&format!("sync_message/{}", head.slot));
                    // The next slot's handlers can be registered as soon as
                    // its parent exists.
                    self.schedule_slot_jobs(head.slot + 1);
                }

                if head.epoch_transition {
                    let epoch = head.slot.epoch(self.chain_time.slots_per_epoch());
                    self.refresh_epoch(epoch).await;
                }
            }
            EventKind::ChainReorg(reorg) => {
                if !self.reorg_awareness {
                    return;
                }
                let common_ancestor = reorg.slot.saturating_sub(reorg.depth);
                info!(
                    self.log,
                    "Chain re-org";
                    "slot" => %reorg.slot,
                    "depth" => reorg.depth,
                    "common_ancestor" => %common_ancestor,
                );
                self.block_roots.remove_after(common_ancestor);
                self.prior_votes.write().remove_after(common_ancestor);
                self.head_tracker.update(reorg.slot, reorg.new_head_block);
                self.block_roots.insert(reorg.new_head_block, reorg.slot);
                self.ingest_block(reorg.new_head_block).await;

                // Everything scheduled off the orphaned chain is stale: drop
                // the outstanding duty jobs, refresh, and re-register. The
                // single-action interlocks keep a re-run from double-signing.
                for prefix in DUTY_JOB_PREFIXES {
                    self.scheduler.cancel_prefix(prefix);
                }
                self.refresh_epoch(reorg.epoch).await;
                if let Some(slot) = self.chain_time.now() {
                    self.schedule_slot_jobs(slot);
                    self.schedule_slot_jobs(slot + 1);
                }
            }
            EventKind::FinalizedCheckpoint(finalized) => {
                let horizon = finalized
                    .epoch
                    .start_slot(self.chain_time.slots_per_epoch());
                debug!(
                    self.log,
                    "Finality advanced";
                    "epoch" => %finalized.epoch,
                    "horizon" => %horizon,
                );
                self.prior_votes.write().prune_below(horizon);
                self.block_roots.prune_below(horizon);
            }
        }
    }

    /// Fetch a block's body and fold its attestations into the prior-votes
    /// index.
    async fn ingest_block(&self, root: Hash256) {
        let fetched = self
            .beacon_nodes
            .first_success(Duration::from_secs(4), None, |bn| {
                bn.signed_beacon_block(root)
            })
            .await;

        let block = match fetched {
            Ok(selected) => match selected.value {
                Some(signed) => signed.message,
                None => {
                    debug!(self.log, "Head block not available"; "root" => %root);
                    return;
                }
            },
            Err(error) => {
                warn!(
                    self.log,
                    "Unable to fetch head block";
                    "root" => %root,
                    "error" => %error,
                );
                return;
            }
        };

        self.block_roots.insert(root, block.slot());
        self.prior_votes.write().observe_block(
            root,
            block.parent_root(),
            block.slot(),
            block.attestations(),
        );
        if let Some(payload) = block.execution_payload() {
            self.head_tracker
                .set_execution_hash(root, payload.block_hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChainReorgEvent, FinalizedCheckpointEvent, HeadEvent};
    use crate::testing::{account, bellatrix_block, harness};
    use types::SignatureBytes;

    fn head_event(slot: u64, root: Hash256) -> EventKind {
        EventKind::Head(HeadEvent {
            slot: Slot::new(slot),
            block: root,
            state: Hash256::zero(),
            epoch_transition: false,
        })
    }

    #[tokio::test]
    async fn head_event_populates_caches() {
        let harness = harness(vec![account(1)]).await;
        let root = Hash256::repeat_byte(0x77);
        let block = match bellatrix_block(64, Hash256::repeat_byte(0x70)) {
            types::BlockProposal::Full(block) => block,
            _ => unreachable!(),
        };
        harness.beacon_node.set_signed_block(
            root,
            types::SignedBeaconBlock {
                message: block,
                signature: SignatureBytes::empty(),
            },
        );

        harness
            .controller
            .handle_event(head_event(64, root))
            .await;

        assert_eq!(harness.block_roots.get(&root), Some(Slot::new(64)));
        assert!(harness.prior_votes.read().contains(&root));
        assert_eq!(harness.head_tracker.current().unwrap().root, root);
    }

    #[tokio::test]
    async fn reorg_evicts_orphaned_state() {
        let harness = harness(vec![account(1)]).await;
        let old = Hash256::repeat_byte(0x10);
        let new = Hash256::repeat_byte(0x20);

        harness.block_roots.insert(old, Slot::new(63));
        harness.prior_votes.write().observe_block(
            old,
            Hash256::zero(),
            Slot::new(63),
            &[],
        );

        harness
            .controller
            .handle_event(EventKind::ChainReorg(ChainReorgEvent {
                slot: Slot::new(64),
                depth: 2,
                old_head_block: old,
                new_head_block: new,
                epoch: Epoch::new(2),
            }))
            .await;

        assert_eq!(harness.block_roots.get(&old), None, "orphan evicted");
        assert!(!harness.prior_votes.read().contains(&old));
        assert_eq!(harness.head_tracker.current().unwrap().root, new);
    }

    #[tokio::test]
    async fn finality_prunes_history() {
        let harness = harness(vec![account(1)]).await;
        harness.block_roots.insert(Hash256::repeat_byte(1), Slot::new(10));
        harness.block_roots.insert(Hash256::repeat_byte(2), Slot::new(40));
        harness.prior_votes.write().observe_block(
            Hash256::repeat_byte(1),
            Hash256::zero(),
            Slot::new(10),
            &[],
        );

        harness
            .controller
            .handle_event(EventKind::FinalizedCheckpoint(FinalizedCheckpointEvent {
                block: Hash256::repeat_byte(2),
                state: Hash256::zero(),
                epoch: Epoch::new(1),
            }))
            .await;

        assert_eq!(harness.block_roots.get(&Hash256::repeat_byte(1)), None);
        assert_eq!(
            harness.block_roots.get(&Hash256::repeat_byte(2)),
            Some(Slot::new(40))
        );
        assert!(harness.prior_votes.read().is_empty());
    }

    #[tokio::test]
    async fn duplicate_head_events_are_ignored() {
        let harness = harness(vec![account(1)]).await;
        let root = Hash256::repeat_byte(0x42);

        harness.controller.handle_event(head_event(64, root)).await;
        let fetches = harness.beacon_node.block_fetches();
        harness.controller.handle_event(head_event(64, root)).await;
        assert_eq!(
            harness.beacon_node.block_fetches(),
            fetches,
            "the second identical head causes no work",
        );
    }
}
