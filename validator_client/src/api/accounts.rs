use super::ApiError;
use async_trait::async_trait;
use types::{Epoch, PublicKeyBytes, ValidatorIndex};

/// A validating account this client acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatingAccount {
    pub pubkey: PublicKeyBytes,
    pub index: ValidatorIndex,
}

/// The account source this client consumes.
///
/// Which validators are active can change at epoch granularity, so the set is
/// requested per epoch.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn validating_accounts(&self, epoch: Epoch) -> Result<Vec<ValidatingAccount>, ApiError>;
}
