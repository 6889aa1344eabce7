//! The configuration document.
//!
//! A single YAML file enumerates the provider endpoints, per-duty strategies
//! and timeouts, slot-relative delays, and builder settings. Every field has
//! a default except the endpoints themselves; validation failures are fatal
//! before the main loop starts.

use crate::selector::BidRanking;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use types::{Address, Graffiti, PublicKeyBytes, Uint256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    First,
    Best,
    Majority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,
    #[serde(default = "default_weight")]
    pub preference_weight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub endpoint: String,
    /// The relay's BLS identity, where operators pin one.
    #[serde(default)]
    pub pubkey: Option<PublicKeyBytes>,
    #[serde(default = "default_weight")]
    pub preference_weight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategies {
    pub attestation_data: StrategyKind,
    pub aggregate_attestation: StrategyKind,
    pub beacon_block_root: StrategyKind,
}

impl Default for Strategies {
    fn default() -> Self {
        Self {
            attestation_data: StrategyKind::Best,
            aggregate_attestation: StrategyKind::First,
            beacon_block_root: StrategyKind::First,
        }
    }
}

/// Per-duty request timeouts, milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub proposal: u64,
    pub attestation_data: u64,
    pub duties: u64,
    pub submission: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            proposal: 2_000,
            attestation_data: 4_000,
            duties: 5_000,
            submission: 4_000,
        }
    }
}

impl Timeouts {
    pub fn proposal(&self) -> Duration {
        Duration::from_millis(self.proposal)
    }

    pub fn attestation_data(&self) -> Duration {
        Duration::from_millis(self.attestation_data)
    }

    pub fn duties(&self) -> Duration {
        Duration::from_millis(self.duties)
    }

    pub fn submission(&self) -> Duration {
        Duration::from_millis(self.submission)
    }
}

/// Slot-relative duty offsets, milliseconds from the start of the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub max_attestation_delay: u64,
    pub max_proposal_delay: u64,
    pub max_sync_committee_message_delay: u64,
    pub attestation_aggregation_delay: u64,
    pub sync_committee_aggregation_delay: u64,
    pub scheduler_max_jitter: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            max_attestation_delay: 4_000,
            max_proposal_delay: 2_000,
            max_sync_committee_message_delay: 1_000,
            attestation_aggregation_delay: 8_000,
            sync_committee_aggregation_delay: 8_000,
            scheduler_max_jitter: 150,
        }
    }
}

impl Delays {
    pub fn max_attestation_delay(&self) -> Duration {
        Duration::from_millis(self.max_attestation_delay)
    }

    pub fn max_proposal_delay(&self) -> Duration {
        Duration::from_millis(self.max_proposal_delay)
    }

    pub fn max_sync_committee_message_delay(&self) -> Duration {
        Duration::from_millis(self.max_sync_committee_message_delay)
    }

    pub fn attestation_aggregation_delay(&self) -> Duration {
        Duration::from_millis(self.attestation_aggregation_delay)
    }

    pub fn sync_committee_aggregation_delay(&self) -> Duration {
        Duration::from_millis(self.sync_committee_aggregation_delay)
    }

    pub fn scheduler_max_jitter(&self) -> Duration {
        Duration::from_millis(self.scheduler_max_jitter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub enabled: bool,
    pub gas_limit: u64,
    pub bid_ranking: BidRanking,
    /// Bids closer than this are considered tied and ranked by score.
    #[serde(with = "types::serde_wei")]
    pub bid_epsilon_wei: Uint256,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gas_limit: 30_000_000,
            bid_ranking: BidRanking::BidFirst,
            // 0.00001 ETH.
            bid_epsilon_wei: Uint256::from(10_000_000_000_000u64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub beacon_nodes: Vec<EndpointConfig>,
    #[serde(default)]
    pub relays: Vec<RelayConfig>,
    pub signer: SignerConfig,
    /// The validating pubkeys this client acts for.
    pub validators: Vec<PublicKeyBytes>,
    #[serde(default)]
    pub fee_recipient: Option<Address>,
    #[serde(default)]
    pub graffiti: Option<String>,
    #[serde(default)]
    pub strategies: Strategies,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub delays: Delays,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default = "default_true")]
    pub reorg_awareness: bool,
    #[serde(default = "default_concurrency")]
    pub process_concurrency: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub time_delay_hack_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Scale applied to the sync-aggregate component of proposal scores.
    #[serde(default = "default_sync_factor")]
    pub sync_factor: f64,
}

fn default_weight() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sync_factor() -> f64 {
    1.0
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("unable to read config file {}: {e}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| format!("unable to parse config file {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.beacon_nodes.is_empty() {
            return Err("at least one beacon node endpoint is required".to_string());
        }
        if self.validators.is_empty() {
            return Err("at least one validating pubkey is required".to_string());
        }
        if self.signer.endpoint.is_empty() {
            return Err("a signer endpoint is required".to_string());
        }
        if self.builder.enabled && !self.relays.is_empty() && self.fee_recipient.is_none() {
            return Err(
                "fee_recipient is required when builder relays are configured".to_string(),
            );
        }
        if self.process_concurrency == 0 {
            return Err("process_concurrency must be at least 1".to_string());
        }
        if let Some(graffiti) = &self.graffiti {
            graffiti.parse::<Graffiti>()?;
        }
        Ok(())
    }

    pub fn graffiti(&self) -> Option<Graffiti> {
        self.graffiti
            .as_ref()
            .and_then(|graffiti| graffiti.parse().ok())
    }
}
