//! Staking operations: stake, unstake, checkpoint, and the read-side
//! status snapshot.
//!
//! Timing and bonding invariants are enforced locally before a transaction
//! is built; a doomed submission is never cheaper than a read. The
//! unstake window is computed against chain time (`ts_start +
//! min_staking_duration`), and the per-agent bond requirement is checked
//! for every declared agent id, not just in aggregate.

use alloy_primitives::{Address, U256};
use serde_json::json;
use std::sync::Arc;

use crate::abi::decode::{as_u256, as_u64};
use crate::context::ChainContext;
use crate::contracts::{ContractHandle, ContractKind};
use crate::domain::errors::{OperationError, PreconditionError};
use crate::domain::types::{
    CheckpointResult, InactivityWarning, Service, ServiceReward, ServiceState, StakingRequirements,
    StakingState, StakingStatus,
};
use crate::managers::{ensure_state, service_snapshot, submit_tx, warn_if_event_missing};

pub struct StakingManager {
    ctx: Arc<ChainContext>,
}

impl StakingManager {
    pub fn new(ctx: Arc<ChainContext>) -> Self {
        Self { ctx }
    }

    async fn registry(&self) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx
            .contract(
                ContractKind::ServiceRegistry,
                self.ctx.addresses.service_registry,
            )
            .await
    }

    async fn token_utility(&self) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx
            .contract(
                ContractKind::RegistryTokenUtility,
                self.ctx.addresses.service_registry_token_utility,
            )
            .await
    }

    async fn staking(&self, address: Address) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx.contract(ContractKind::Staking, address).await
    }

    /// Read the staking contract's bonding and timing parameters.
    ///
    /// The total stake is split 50/50 between the deposit transferred at
    /// `stake` time and the agent bond already held by the registry token
    /// utility, so the required per-agent bond equals the minimum staking
    /// deposit.
    pub async fn requirements(
        &self,
        staking: &ContractHandle,
    ) -> Result<StakingRequirements, OperationError> {
        let min_staking_deposit = staking.call_u256("minStakingDeposit", &[]).await?;
        Ok(StakingRequirements {
            min_staking_deposit,
            required_agent_bond: min_staking_deposit,
            staking_token: staking.call_address("stakingToken", &[]).await?,
            max_num_services: staking.call_u64("maxNumServices", &[]).await?,
            min_staking_duration: staking.call_u64("minStakingDuration", &[]).await?,
            liveness_period: staking.call_u64("livenessPeriod", &[]).await?,
        })
    }

    pub async fn staking_state(
        &self,
        staking: &ContractHandle,
        service_id: u64,
    ) -> Result<StakingState, OperationError> {
        let raw = staking
            .call_u64("getStakingState", &[json!(service_id)])
            .await?;
        u8::try_from(raw)
            .ok()
            .map(StakingState::from_u8)
            .transpose()
            .map_err(OperationError::Abi)?
            .ok_or_else(|| OperationError::abi(format!("staking state {raw} out of range")))
    }

    /// Stake a deployed service. Approves the service NFT and tops up the
    /// token allowance when currently insufficient, then submits the stake
    /// transaction.
    pub async fn stake(
        &self,
        service: &mut Service,
        staking_address: Address,
    ) -> Result<(), OperationError> {
        let staking = self.staking(staking_address).await?;
        let registry = self.registry().await?;
        let requirements = self.requirements(&staking).await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        ensure_state(ServiceState::Deployed, snapshot.state)?;

        let state = self.staking_state(&staking, service.service_id).await?;
        if state != StakingState::Unstaked {
            return Err(PreconditionError::AlreadyStaked { actual: state }.into());
        }

        if service.token_address != requirements.staking_token {
            return Err(PreconditionError::TokenMismatch {
                service_token: service.token_address,
                staking_token: requirements.staking_token,
            }
            .into());
        }

        // Per agent id, not just in aggregate: one underfunded slot makes
        // the stake revert regardless of the total.
        let utility = self.token_utility().await?;
        let declared = if snapshot.agent_ids.is_empty() {
            &service.agent_ids
        } else {
            &snapshot.agent_ids
        };
        for agent_id in declared {
            let bond = utility
                .call_u256(
                    "getAgentBond",
                    &[json!(service.service_id), json!(*agent_id)],
                )
                .await?;
            if bond < requirements.required_agent_bond {
                return Err(PreconditionError::InsufficientAgentBond {
                    agent_id: *agent_id,
                    bond,
                    required: requirements.required_agent_bond,
                }
                .into());
            }
        }

        let staked = staking.call("getServiceIds", &[]).await?;
        let staked_count = staked
            .first()
            .and_then(|value| value.as_array())
            .map(Vec::len)
            .unwrap_or(0) as u64;
        if staked_count >= requirements.max_num_services {
            return Err(PreconditionError::NoFreeSlots {
                staked: staked_count,
                max: requirements.max_num_services,
            }
            .into());
        }

        let token = self
            .ctx
            .contract(ContractKind::Erc20, requirements.staking_token)
            .await?;
        let balance = token
            .call_u256("balanceOf", &[json!(service.owner_address.to_string())])
            .await?;
        if balance < requirements.min_staking_deposit {
            return Err(PreconditionError::InsufficientDeposit {
                balance,
                required: requirements.min_staking_deposit,
            }
            .into());
        }

        // The staking contract pulls the service NFT and the deposit.
        tracing::info!(service = %service.key(), staking = %staking_address, "approving service token");
        let approve_nft = registry.tx(
            service.owner_address,
            U256::ZERO,
            "approve",
            &[json!(staking_address.to_string()), json!(service.service_id)],
        )?;
        submit_tx(&self.ctx, approve_nft).await?;

        let allowance = token
            .call_u256(
                "allowance",
                &[
                    json!(service.owner_address.to_string()),
                    json!(staking_address.to_string()),
                ],
            )
            .await?;
        if allowance < requirements.min_staking_deposit {
            tracing::info!(%allowance, required = %requirements.min_staking_deposit, "topping up staking allowance");
            let approve_deposit = token.tx(
                service.owner_address,
                U256::ZERO,
                "approve",
                &[
                    json!(staking_address.to_string()),
                    json!(requirements.min_staking_deposit.to_string()),
                ],
            )?;
            submit_tx(&self.ctx, approve_deposit).await?;
        }

        let stake_tx = staking.tx(
            service.owner_address,
            U256::ZERO,
            "stake",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, stake_tx).await?;
        warn_if_event_missing(&staking, &receipt, "ServiceStaked");

        let after = self.staking_state(&staking, service.service_id).await?;
        if after != StakingState::Staked {
            tracing::warn!(
                service = %service.key(),
                state = ?after,
                "stake receipt succeeded but the contract does not report STAKED"
            );
        }

        service.staking_contract_address = Some(staking_address);
        tracing::info!(service = %service.key(), staking = %staking_address, "service staked");
        Ok(())
    }

    /// Unstake a staked service once the minimum staking duration has
    /// elapsed. Succeeds idempotently when the contract reports the
    /// service was never staked (`ts_start == 0`).
    pub async fn unstake(
        &self,
        service: &mut Service,
        staking_address: Address,
    ) -> Result<(), OperationError> {
        let staking = self.staking(staking_address).await?;

        let state = self.staking_state(&staking, service.service_id).await?;
        if state != StakingState::Staked {
            return Err(PreconditionError::NotStaked { actual: state }.into());
        }

        let info = self.service_info(&staking, service.service_id).await?;
        if info.ts_start == 0 {
            // The contract disagrees with local state and reports never
            // staked; treat as already unstaked.
            tracing::warn!(
                service = %service.key(),
                "staking contract reports ts_start == 0, treating as already unstaked"
            );
            service.staking_contract_address = None;
            return Ok(());
        }

        let min_duration = staking.call_u64("minStakingDuration", &[]).await?;
        let now = self
            .ctx
            .client
            .latest_timestamp()
            .await
            .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
        let unlock_at = info.ts_start.saturating_add(min_duration);
        if now < unlock_at {
            return Err(PreconditionError::UnstakeLocked {
                remaining_secs: unlock_at - now,
            }
            .into());
        }

        let tx = staking.tx(
            service.owner_address,
            U256::ZERO,
            "unstake",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&staking, &receipt, "ServiceUnstaked");

        service.staking_contract_address = None;
        tracing::info!(service = %service.key(), "service unstaked");
        Ok(())
    }

    /// Submit the permissionless checkpoint call, closing the epoch and
    /// advancing reward accounting for every staked service.
    ///
    /// An absent `Checkpoint` event is a warning, not an error: the call
    /// is a no-op when the epoch is already up to date. Inactivity
    /// counters in the receipt are surfaced as non-fatal warnings; nothing
    /// is auto-remediated.
    pub async fn call_checkpoint(
        &self,
        service: &Service,
        staking_address: Address,
    ) -> Result<CheckpointResult, OperationError> {
        let staking = self.staking(staking_address).await?;

        let state = self.staking_state(&staking, service.service_id).await?;
        if state != StakingState::Staked {
            return Err(PreconditionError::NotStaked { actual: state }.into());
        }

        let tx = staking.tx(service.owner_address, U256::ZERO, "checkpoint", &[])?;
        let receipt = submit_tx(&self.ctx, tx).await?;

        let mut result = CheckpointResult {
            transaction_hash: receipt.transaction_hash,
            event_found: false,
            epoch: 0,
            available_rewards: U256::ZERO,
            rewards: Vec::new(),
            inactivity_warnings: Vec::new(),
        };

        match staking.find_event(&receipt, "Checkpoint") {
            Some(event) => {
                result.event_found = true;
                if let Some(epoch) = event.arg("epoch") {
                    result.epoch = as_u64(epoch, "Checkpoint.epoch").map_err(OperationError::Abi)?;
                }
                if let Some(rewards) = event.arg("availableRewards") {
                    result.available_rewards = as_u256(rewards, "Checkpoint.availableRewards")
                        .map_err(OperationError::Abi)?;
                }
                result.rewards = zip_service_rewards(&event)?;
                tracing::info!(
                    epoch = result.epoch,
                    available_rewards = %result.available_rewards,
                    "checkpoint closed the epoch"
                );
            }
            None => {
                tracing::warn!(
                    staking = %staking_address,
                    tx_hash = %receipt.transaction_hash,
                    "checkpoint receipt succeeded without a Checkpoint event (already up to date?)"
                );
            }
        }

        for event in staking.extract_events(&receipt) {
            if event.name != "ServiceInactivityWarning" {
                continue;
            }
            let service_id = event
                .arg("serviceId")
                .map(|value| as_u64(value, "ServiceInactivityWarning.serviceId"))
                .transpose()
                .map_err(OperationError::Abi)?
                .unwrap_or(0);
            let inactivity = event
                .arg("serviceInactivity")
                .map(|value| as_u256(value, "ServiceInactivityWarning.serviceInactivity"))
                .transpose()
                .map_err(OperationError::Abi)?
                .unwrap_or(U256::ZERO);
            tracing::warn!(
                service_id,
                %inactivity,
                "service liveness below threshold, eviction precursor"
            );
            result
                .inactivity_warnings
                .push(InactivityWarning {
                    service_id,
                    inactivity,
                });
        }

        Ok(result)
    }

    /// Whether the current epoch has ended (plus a grace period for other
    /// callers to win the race) and a checkpoint call would close it.
    pub async fn checkpoint_due(
        &self,
        staking_address: Address,
        grace_secs: u64,
    ) -> Result<bool, OperationError> {
        let staking = self.staking(staking_address).await?;
        let next = staking
            .call_u64("getNextRewardCheckpointTimestamp", &[])
            .await?;
        let now = self
            .ctx
            .client
            .latest_timestamp()
            .await
            .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
        Ok(now >= next.saturating_add(grace_secs))
    }

    /// Unstake-window and reward snapshot for the service.
    pub async fn staking_status(
        &self,
        service: &Service,
        staking_address: Address,
    ) -> Result<StakingStatus, OperationError> {
        let staking = self.staking(staking_address).await?;
        let state = self.staking_state(&staking, service.service_id).await?;
        let info = self.service_info(&staking, service.service_id).await?;
        let min_staking_duration = staking.call_u64("minStakingDuration", &[]).await?;
        let epoch = staking.call_u64("epochCounter", &[]).await?;
        Ok(StakingStatus {
            state,
            ts_start: info.ts_start,
            min_staking_duration,
            unstake_available_at: (info.ts_start > 0)
                .then(|| info.ts_start.saturating_add(min_staking_duration)),
            accrued_reward: info.reward,
            epoch,
        })
    }

    async fn service_info(
        &self,
        staking: &ContractHandle,
        service_id: u64,
    ) -> Result<StakedServiceInfo, OperationError> {
        let values = staking
            .call("getServiceInfo", &[json!(service_id)])
            .await?;
        // (multisig, owner, nonces[], tsStart, reward, inactivity)
        let ts_start = values
            .get(3)
            .map(|value| as_u64(value, "getServiceInfo.tsStart"))
            .transpose()
            .map_err(OperationError::Abi)?
            .unwrap_or(0);
        let reward = values
            .get(4)
            .map(|value| as_u256(value, "getServiceInfo.reward"))
            .transpose()
            .map_err(OperationError::Abi)?
            .unwrap_or(U256::ZERO);
        Ok(StakedServiceInfo { ts_start, reward })
    }
}

struct StakedServiceInfo {
    ts_start: u64,
    reward: U256,
}

fn zip_service_rewards(
    event: &crate::contracts::DecodedEvent,
) -> Result<Vec<ServiceReward>, OperationError> {
    let ids = event
        .arg("serviceIds")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    let amounts = event
        .arg("rewards")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    ids.iter()
        .zip(amounts.iter())
        .map(|(id, amount)| {
            Ok(ServiceReward {
                service_id: as_u64(id, "Checkpoint.serviceIds").map_err(OperationError::Abi)?,
                amount: as_u256(amount, "Checkpoint.rewards").map_err(OperationError::Abi)?,
            })
        })
        .collect()
}
