//! A multi-beacon-node Ethereum validator client.
//!
//! The client performs attestation, block-proposal, sync-committee and
//! aggregation duties for a configured set of validators by coordinating
//! a pool of beacon nodes and (for block production) builder relays. Beacon
//! nodes are trusted and interchangeable: the client selects among their
//! answers, it never validates them.

pub mod api;
mod attestation_service;
mod attested;
mod block_roots;
mod block_service;
pub mod cli;
pub mod config;
mod controller;
mod duties_service;
mod head_tracker;
pub mod http;
mod metrics;
mod notifier;
mod preparation_service;
mod prior_votes;
mod scheduler;
mod scorer;
mod selector;
mod strategy;
mod sync_committee_service;
#[cfg(test)]
pub(crate) mod testing;

pub use attested::AttestedSet;
pub use block_roots::BlockRootCache;
pub use cli::cli_app;
pub use config::Config;
pub use head_tracker::{HeadInfo, HeadTracker};
pub use prior_votes::{BlockVotes, PriorBlockVotes, PRIOR_VOTES_WINDOW};
pub use scheduler::JobScheduler;
pub use scorer::{score_proposal, ScoringWeights, SlotLookup};
pub use selector::{BestProposalSelector, BidRanking, ProposalCandidate};
pub use strategy::{Endpoint, MultiEndpoint, Selected, StrategyError};

use crate::api::{AccountProvider, BeaconNodeApi, RelayApi, Signer};
use crate::attestation_service::AttestationService;
use crate::block_service::BlockService;
use crate::controller::Controller;
use crate::duties_service::DutiesService;
use crate::http::{BeaconNodeHttp, ConfiguredAccounts, RelayHttp, RemoteSigner};
use crate::preparation_service::PreparationService;
use crate::sync_committee_service::SyncCommitteeService;
use chain_time::{ChainTime, SystemChainTime, TimeDelay};
use parking_lot::RwLock;
use slog::{info, Logger};
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tokio::sync::Semaphore;

/// The global timeout for HTTP requests with no duty-specific bound
/// (startup queries, block fetches).
const HTTP_TIMEOUT: Duration = Duration::from_secs(12);

/// The production wiring: HTTP providers from configuration, system clock,
/// every service connected to the controller.
pub struct ValidatorClient {
    controller: Arc<Controller<SystemChainTime>>,
}

impl ValidatorClient {
    pub async fn from_config(config: Config, executor: TaskExecutor) -> Result<Self, String> {
        let log = executor.log().clone();

        let mut endpoints = Vec::with_capacity(config.beacon_nodes.len());
        for beacon_node in &config.beacon_nodes {
            let client = BeaconNodeHttp::new(&beacon_node.endpoint, HTTP_TIMEOUT)?;
            endpoints.push(Endpoint::new(
                beacon_node.endpoint.clone(),
                beacon_node.preference_weight,
                Arc::new(client) as Arc<dyn BeaconNodeApi>,
            ));
        }
        let beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>> =
            Arc::new(MultiEndpoint::new(endpoints, log.clone()));

        let mut relay_endpoints = Vec::with_capacity(config.relays.len());
        if config.builder.enabled {
            for relay in &config.relays {
                let client = RelayHttp::new(&relay.endpoint, HTTP_TIMEOUT)?;
                relay_endpoints.push(Endpoint::new(
                    relay.endpoint.clone(),
                    relay.preference_weight,
                    Arc::new(client) as Arc<dyn RelayApi>,
                ));
            }
        }
        let relays: Arc<MultiEndpoint<dyn RelayApi>> =
            Arc::new(MultiEndpoint::new(relay_endpoints, log.clone()));

        let signer: Arc<dyn Signer> =
            Arc::new(RemoteSigner::new(&config.signer.endpoint, HTTP_TIMEOUT)?);
        let account_provider: Arc<dyn AccountProvider> = Arc::new(ConfiguredAccounts::new(
            config.validators.clone(),
            beacon_nodes.clone(),
            config.timeouts.duties(),
            log.clone(),
        ));

        // The chain parameters come from the nodes themselves; a node that
        // cannot answer this is not usable at all.
        let spec = beacon_nodes
            .first_success(HTTP_TIMEOUT, None, |bn| bn.spec())
            .await
            .map_err(|e| format!("unable to read chain spec from any beacon node: {e}"))?
            .value;
        let genesis = beacon_nodes
            .first_success(HTTP_TIMEOUT, None, |bn| bn.genesis_time())
            .await
            .map_err(|e| format!("unable to read genesis from any beacon node: {e}"))?
            .value;
        info!(
            log,
            "Connected to beacon node pool";
            "nodes" => beacon_nodes.num_endpoints(),
            "relays" => relays.num_endpoints(),
            "slots_per_epoch" => spec.slots_per_epoch,
        );

        let chain_time = Arc::new(SystemChainTime::new(
            genesis,
            Duration::from_secs(spec.seconds_per_slot),
            spec.slots_per_epoch,
        ));
        let time_delay = Arc::new(TimeDelay::new(
            config.time_delay_hack_file.clone(),
            log.clone(),
        ));

        let duties_service = Arc::new(DutiesService::new(
            beacon_nodes.clone(),
            account_provider,
            signer.clone(),
            chain_time.clone(),
            spec.clone(),
            config.timeouts.duties(),
            log.clone(),
        ));

        let prior_votes = Arc::new(RwLock::new(PriorBlockVotes::new()));
        let block_roots = Arc::new(BlockRootCache::new());
        let head_tracker = Arc::new(HeadTracker::new());
        let signing_permits = Arc::new(Semaphore::new(config.process_concurrency));

        let selector = BestProposalSelector::new(
            beacon_nodes.clone(),
            relays.clone(),
            prior_votes.clone(),
            block_roots.clone(),
            ScoringWeights::from_spec(&spec, config.sync_factor),
            config.builder.bid_ranking,
            config.builder.bid_epsilon_wei,
            log.clone(),
        );

        let attestation_service = AttestationService::new(
            duties_service.clone(),
            beacon_nodes.clone(),
            signer.clone(),
            chain_time.clone(),
            config.strategies.attestation_data,
            config.strategies.aggregate_attestation,
            config.timeouts.clone(),
            config.delays.clone(),
            signing_permits.clone(),
            log.clone(),
        );

        let block_service = BlockService::new(
            duties_service.clone(),
            beacon_nodes.clone(),
            relays.clone(),
            signer.clone(),
            chain_time.clone(),
            selector,
            head_tracker.clone(),
            config.graffiti(),
            config.builder.enabled,
            config.timeouts.clone(),
            config.delays.clone(),
            signing_permits.clone(),
            log.clone(),
        );

        let sync_service = SyncCommitteeService::new(
            duties_service.clone(),
            beacon_nodes.clone(),
            signer.clone(),
            chain_time.clone(),
            config.strategies.beacon_block_root,
            config.timeouts.clone(),
            config.delays.clone(),
            signing_permits,
            spec.clone(),
            log.clone(),
        );

        let preparation_service = PreparationService::new(
            duties_service.clone(),
            relays.clone(),
            signer,
            config.fee_recipient,
            config.builder.gas_limit,
            log.clone(),
        );

        let scheduler = JobScheduler::new(
            executor.clone(),
            config.delays.scheduler_max_jitter(),
            log.clone(),
        );

        notifier::spawn_notifier(
            &executor,
            chain_time.clone(),
            scheduler.clone(),
            block_roots.clone(),
            prior_votes.clone(),
            head_tracker.clone(),
        );

        let controller = Arc::new(Controller {
            chain_time,
            time_delay,
            beacon_nodes,
            scheduler,
            duties_service,
            attestation_service,
            block_service,
            sync_service,
            preparation_service,
            prior_votes,
            block_roots,
            head_tracker,
            delays: config.delays.clone(),
            reorg_awareness: config.reorg_awareness,
            executor,
            log,
        });

        Ok(Self { controller })
    }

    /// Drive the controller until shutdown.
    pub async fn run(self) {
        self.controller.run().await
    }

    pub fn log(&self) -> &Logger {
        &self.controller.log
    }
}
