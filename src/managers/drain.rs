//! Reward claims and multisig drains.

use alloy_primitives::{Address, U256};
use serde_json::json;
use std::sync::Arc;

use crate::abi::decode::as_u256;
use crate::chain::MultisigExecutor;
use crate::context::ChainContext;
use crate::contracts::{ContractHandle, ContractKind};
use crate::domain::errors::{OperationError, PreconditionError};
use crate::domain::types::{DrainOutcome, Service, StakingState};
use crate::managers::submit_tx;

pub struct DrainManager {
    ctx: Arc<ChainContext>,
    executor: Arc<dyn MultisigExecutor>,
}

impl DrainManager {
    pub fn new(ctx: Arc<ChainContext>, executor: Arc<dyn MultisigExecutor>) -> Self {
        Self { ctx, executor }
    }

    async fn staking(&self, address: Address) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx.contract(ContractKind::Staking, address).await
    }

    /// Claim accrued staking rewards. Returns the claimed amount parsed
    /// from the `RewardClaimed` event; a zero claim is a valid outcome.
    pub async fn claim_rewards(
        &self,
        service: &Service,
        staking_address: Address,
    ) -> Result<U256, OperationError> {
        let staking = self.staking(staking_address).await?;

        let state_raw = staking
            .call_u64("getStakingState", &[json!(service.service_id)])
            .await?;
        let state = u8::try_from(state_raw)
            .ok()
            .map(StakingState::from_u8)
            .transpose()
            .map_err(OperationError::Abi)?
            .ok_or_else(|| OperationError::abi(format!("staking state {state_raw} out of range")))?;
        if state != StakingState::Staked {
            return Err(PreconditionError::NotStaked { actual: state }.into());
        }

        let tx = staking.tx(
            service.owner_address,
            U256::ZERO,
            "claim",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;

        let claimed = match staking.find_event(&receipt, "RewardClaimed") {
            Some(event) => event
                .arg("amount")
                .or_else(|| event.arg("reward"))
                .map(|value| as_u256(value, "RewardClaimed.amount"))
                .transpose()
                .map_err(OperationError::Abi)?
                .unwrap_or(U256::ZERO),
            None => {
                tracing::warn!(
                    service = %service.key(),
                    tx_hash = %receipt.transaction_hash,
                    "claim receipt succeeded without a RewardClaimed event, reporting zero"
                );
                U256::ZERO
            }
        };
        tracing::info!(service = %service.key(), amount = %claimed, "rewards claimed");
        Ok(claimed)
    }

    /// Sweep the multisig's idle balances above `native_reserve` to
    /// `destination`: the native balance first, then the full bonding-token
    /// balance for token-bonded services. Both transfers are
    /// multisig-authorized.
    pub async fn drain(
        &self,
        service: &Service,
        destination: Address,
        native_reserve: U256,
    ) -> Result<DrainOutcome, OperationError> {
        let multisig = service.multisig()?;
        let mut outcome = DrainOutcome::default();

        let native_balance = self
            .ctx
            .client
            .balance(multisig)
            .await
            .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
        if native_balance > native_reserve {
            let amount = native_balance - native_reserve;
            let receipt = self
                .executor
                .execute(multisig, destination, amount, Default::default())
                .await
                .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
            if !receipt.succeeded() {
                return Err(OperationError::TransactionFailed {
                    transaction_hash: receipt.transaction_hash,
                });
            }
            outcome.native_amount = amount;
            tracing::info!(service = %service.key(), %destination, %amount, "native balance drained");
        }

        if service.is_token_bonded() {
            let token = self
                .ctx
                .contract(ContractKind::Erc20, service.token_address)
                .await?;
            let token_balance = token
                .call_u256("balanceOf", &[json!(multisig.to_string())])
                .await?;
            if token_balance > U256::ZERO {
                let data = token.encode_call(
                    "transfer",
                    &[
                        json!(destination.to_string()),
                        json!(token_balance.to_string()),
                    ],
                )?;
                let receipt = self
                    .executor
                    .execute(multisig, token.address, U256::ZERO, data)
                    .await
                    .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
                if !receipt.succeeded() {
                    return Err(OperationError::TransactionFailed {
                        transaction_hash: receipt.transaction_hash,
                    });
                }
                outcome.token_amount = token_balance;
                tracing::info!(
                    service = %service.key(),
                    token = %service.token_address,
                    amount = %token_balance,
                    "token balance drained"
                );
            }
        }

        Ok(outcome)
    }
}
