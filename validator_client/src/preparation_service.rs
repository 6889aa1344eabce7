//! Builder-network preparation: signed validator registrations, pushed to
//! every relay at startup and on epoch boundaries.
//!
//! Relays are best-effort. Failures are logged and never block a duty; a
//! registration that reaches one relay is better than none.

use crate::api::{RelayApi, Signer};
use crate::duties_service::DutiesService;
use crate::metrics;
use crate::strategy::MultiEndpoint;
use chain_time::ChainTime;
use futures::future::join_all;
use slog::{debug, info, warn, Logger};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use types::{Address, Epoch, SignedValidatorRegistration, ValidatorRegistration};

pub struct PreparationService<T: ChainTime + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: ChainTime> Clone for PreparationService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ChainTime> Deref for PreparationService<T> {
    type Target = Inner<T>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

pub struct Inner<T: ChainTime> {
    duties_service: Arc<DutiesService<T>>,
    relays: Arc<MultiEndpoint<dyn RelayApi>>,
    signer: Arc<dyn Signer>,
    fee_recipient: Option<Address>,
    gas_limit: u64,
    log: Logger,
}

impl<T: ChainTime + 'static> PreparationService<T> {
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        relays: Arc<MultiEndpoint<dyn RelayApi>>,
        signer: Arc<dyn Signer>,
        fee_recipient: Option<Address>,
        gas_limit: u64,
        log: Logger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                relays,
                signer,
                fee_recipient,
                gas_limit,
                log,
            }),
        }
    }

    /// Sign registrations for every managed validator and push them to every
    /// relay in parallel.
    pub async fn register_validators(&self, epoch: Epoch) {
        let inner = &self.inner;
        if inner.relays.num_endpoints() == 0 {
            return;
        }
        let fee_recipient = match inner.fee_recipient {
            Some(fee_recipient) => fee_recipient,
            None => {
                // Validated at startup when relays are configured; reachable
                // only when the builder flow is disabled.
                debug!(inner.log, "No fee recipient; skipping registrations");
                return;
            }
        };

        let accounts = inner.duties_service.accounts_for(epoch);
        if accounts.is_empty() {
            return;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs())
            .unwrap_or(0);

        let mut registrations = Vec::with_capacity(accounts.len());
        for account in accounts {
            let registration = ValidatorRegistration {
                fee_recipient,
                gas_limit: inner.gas_limit,
                timestamp,
                pubkey: account.pubkey,
            };
            match inner
                .signer
                .sign_validator_registration(account.pubkey, &registration)
                .await
            {
                Ok(signature) => registrations.push(SignedValidatorRegistration {
                    message: registration,
                    signature,
                }),
                Err(error) => {
                    warn!(
                        inner.log,
                        "Unable to sign validator registration";
                        "validator_index" => account.index,
                        "error" => %error,
                    );
                }
            }
        }

        if registrations.is_empty() {
            return;
        }

        let submissions = inner.relays.endpoints().iter().map(|endpoint| {
            let relay = endpoint.inner().clone();
            let registrations = &registrations;
            let id = endpoint.id().to_string();
            async move {
                match relay.register_validators(registrations).await {
                    Ok(()) => {
                        metrics::inc_counter_vec(&metrics::ENDPOINT_REQUESTS, &[&id]);
                        true
                    }
                    Err(error) => {
                        metrics::inc_counter_vec(&metrics::ENDPOINT_ERRORS, &[&id]);
                        warn!(
                            inner.log,
                            "Unable to submit validator registrations";
                            "relay" => %id,
                            "error" => %error,
                        );
                        false
                    }
                }
            }
        });
        let results = join_all(submissions).await;
        let accepted = results.iter().filter(|ok| **ok).count();

        info!(
            inner.log,
            "Validator registrations submitted";
            "epoch" => %epoch,
            "validators" => registrations.len(),
            "relays_accepted" => accepted,
            "relays_total" => results.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, harness_with_relays, RelaySpec};
    use types::{Epoch, Hash256, Uint256};

    #[tokio::test]
    async fn registers_with_every_relay() {
        let harness = harness_with_relays(
            vec![account(1), account(2)],
            vec![
                RelaySpec::new(
                    "relay_a",
                    1,
                    crate::testing::signed_bid(Uint256::zero(), Hash256::zero(), 1),
                ),
                RelaySpec::new(
                    "relay_b",
                    1,
                    crate::testing::signed_bid(Uint256::zero(), Hash256::zero(), 2),
                ),
            ],
        )
        .await;
        harness.refresh_duties().await;

        harness
            .preparation_service
            .register_validators(Epoch::new(2))
            .await;

        for relay in &harness.relays {
            let received = relay.registrations.lock();
            assert_eq!(received.len(), 2, "each relay receives both validators");
        }
    }

    #[tokio::test]
    async fn one_failing_relay_does_not_block() {
        let harness = harness_with_relays(
            vec![account(1)],
            vec![
                RelaySpec::new(
                    "dead_relay",
                    1,
                    crate::testing::signed_bid(Uint256::zero(), Hash256::zero(), 1),
                )
                .failing(),
                RelaySpec::new(
                    "live_relay",
                    1,
                    crate::testing::signed_bid(Uint256::zero(), Hash256::zero(), 2),
                ),
            ],
        )
        .await;
        harness.refresh_duties().await;

        harness
            .preparation_service
            .register_validators(Epoch::new(2))
            .await;

        assert_eq!(harness.relays[1].registrations.lock().len(), 1);
    }
}
