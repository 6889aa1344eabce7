use crate::api::{AccountProvider, ApiError, BeaconNodeApi, ValidatingAccount};
use crate::strategy::MultiEndpoint;
use async_trait::async_trait;
use parking_lot::RwLock;
use slog::{debug, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use types::{Epoch, PublicKeyBytes, ValidatorIndex};

/// The account source when validators are enumerated in configuration:
/// configured pubkeys, with indices resolved against the beacon nodes.
///
/// An index, once assigned, never changes, so resolutions are cached for the
/// life of the process. Pubkeys the chain does not know yet (pending
/// deposits) are silently absent until they appear.
pub struct ConfiguredAccounts {
    pubkeys: Vec<PublicKeyBytes>,
    beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
    resolved: RwLock<HashMap<PublicKeyBytes, ValidatorIndex>>,
    timeout: Duration,
    log: Logger,
}

impl ConfiguredAccounts {
    pub fn new(
        pubkeys: Vec<PublicKeyBytes>,
        beacon_nodes: Arc<MultiEndpoint<dyn BeaconNodeApi>>,
        timeout: Duration,
        log: Logger,
    ) -> Self {
        Self {
            pubkeys,
            beacon_nodes,
            resolved: RwLock::new(HashMap::new()),
            timeout,
            log,
        }
    }
}

#[async_trait]
impl AccountProvider for ConfiguredAccounts {
    async fn validating_accounts(&self, _epoch: Epoch) -> Result<Vec<ValidatingAccount>, ApiError> {
        let unresolved: Vec<PublicKeyBytes> = {
            let resolved = self.resolved.read();
            self.pubkeys
                .iter()
                .filter(|pubkey| !resolved.contains_key(*pubkey))
                .copied()
                .collect()
        };

        if !unresolved.is_empty() {
            let indices = self
                .beacon_nodes
                .first_success(self.timeout, None, |bn| {
                    bn.validator_indices(&unresolved)
                })
                .await
                .map_err(|e| ApiError::Unavailable(e.to_string()))?
                .value;
            if indices.len() < unresolved.len() {
                debug!(
                    self.log,
                    "Some validators are not yet known to the chain";
                    "configured" => self.pubkeys.len(),
                    "unknown" => unresolved.len() - indices.len(),
                );
            }
            self.resolved.write().extend(indices);
        }

        let resolved = self.resolved.read();
        Ok(self
            .pubkeys
            .iter()
            .filter_map(|pubkey| {
                resolved.get(pubkey).map(|index| ValidatingAccount {
                    pubkey: *pubkey,
                    index: *index,
                })
            })
            .collect())
    }
}
