//! Service lifecycle operations.
//!
//! Sequences creation → registration → deployment → termination against
//! the service registry and service manager contracts. Every operation
//! re-reads the on-chain state immediately before acting; the `Service`
//! entity's own fields are hints, never authoritative. Precondition
//! violations abort locally without building a transaction; reverts are
//! decoded and fatal; nothing here retries.

use alloy_primitives::{Address, B256, U256};
use serde_json::json;
use std::sync::Arc;

use crate::config::TRADER_CONFIG_HASH;
use crate::context::ChainContext;
use crate::contracts::{ContractHandle, ContractKind};
use crate::domain::errors::{OperationError, PreconditionError};
use crate::domain::types::{Service, ServiceState};
use crate::managers::{
    ensure_state, require_event, service_snapshot, submit_tx, warn_if_event_missing,
};

/// Fixed multisig deployment payload dimensions: 20 zero bytes, the
/// fallback handler, 72 zero bytes, then a 32-byte salt.
const DEPLOY_PAYLOAD_ZERO_PREFIX: usize = 20;
const DEPLOY_PAYLOAD_ZERO_SUFFIX: usize = 72;

/// Inputs to service creation.
#[derive(Clone, Debug)]
pub struct CreateParams {
    pub service_name: String,
    pub owner: Address,
    /// Bonding token; [`crate::domain::types::NATIVE_TOKEN`] to bond in
    /// the native asset.
    pub token: Address,
    /// Bond per agent slot.
    pub bond: U256,
    pub agent_ids: Vec<u32>,
    pub threshold: u32,
    /// Registered config hash; defaults to the trader hash.
    pub config_hash: Option<B256>,
}

pub struct LifecycleManager {
    ctx: Arc<ChainContext>,
}

impl LifecycleManager {
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

    async fn manager(&self) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx
            .contract(
                ContractKind::ServiceManager,
                self.ctx.addresses.service_manager,
            )
            .await
    }

    async fn token(&self, address: Address) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx.contract(ContractKind::Erc20, address).await
    }

    /// Submit the creation transaction and return the populated service,
    /// with its id parsed from the `CreateService` event.
    pub async fn create(&self, params: CreateParams) -> Result<Service, OperationError> {
        let manager = self.manager().await?;
        let registry = self.registry().await?;

        let config_hash = params.config_hash.unwrap_or(TRADER_CONFIG_HASH);
        let agent_params: Vec<_> = params
            .agent_ids
            .iter()
            .map(|_| json!(["1", params.bond.to_string()]))
            .collect();

        tracing::info!(
            owner = %params.owner,
            token = %params.token,
            agent_ids = ?params.agent_ids,
            bond = %params.bond,
            "submitting service creation"
        );
        let tx = manager.tx(
            params.owner,
            U256::ZERO,
            "create",
            &[
                json!(params.owner.to_string()),
                json!(params.token.to_string()),
                json!(format!("{config_hash:#x}")),
                json!(params.agent_ids),
                json!(agent_params),
                json!(params.threshold),
            ],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;

        let created = require_event(&registry, &receipt, "CreateService")?;
        let service_id = created
            .arg("serviceId")
            .and_then(|value| value.as_str())
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| OperationError::abi("CreateService event has no usable serviceId"))?;
        tracing::info!(service_id, "service created");

        let service = Service {
            service_name: params.service_name,
            chain_name: self.ctx.chain_name.clone(),
            service_id,
            owner_address: params.owner,
            agent_ids: params.agent_ids,
            agent_addresses: Vec::new(),
            multisig_address: None,
            staking_contract_address: None,
            token_address: params.token,
        };

        // Token-bonded services pull the deposit and bond through the
        // registry token utility; give it room for both up front.
        if service.is_token_bonded() {
            let approval = params.bond.saturating_mul(U256::from(2u64));
            self.approve_token_utility(&service, approval).await?;
        }

        Ok(service)
    }

    /// Pay the operator bond and advance to `ACTIVE_REGISTRATION`.
    pub async fn activate_registration(&self, service: &Service) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let manager = self.manager().await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        ensure_state(ServiceState::PreRegistration, snapshot.state)?;

        if service.is_token_bonded() {
            self.ensure_utility_allowance(service, snapshot.security_deposit)
                .await?;
        }

        // The registry requires msg.value == security deposit even for
        // token-bonded services, where it is the 1-wei protocol sentinel.
        let tx = manager.tx(
            service.owner_address,
            snapshot.security_deposit,
            "activateRegistration",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&registry, &receipt, "ActivateRegistration");
        tracing::info!(service = %service.key(), "registration activated");
        Ok(())
    }

    /// Register bonded agent instances, one per declared slot. Filling all
    /// slots advances the service to `FINISHED_REGISTRATION`; a partial
    /// fill leaves it in `ACTIVE_REGISTRATION`.
    pub async fn register_agents(
        &self,
        service: &mut Service,
        agent_addresses: &[Address],
    ) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let manager = self.manager().await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        ensure_state(ServiceState::ActiveRegistration, snapshot.state)?;

        let free = snapshot
            .max_num_agent_instances
            .saturating_sub(snapshot.num_agent_instances) as usize;
        if agent_addresses.is_empty() || agent_addresses.len() > free {
            return Err(PreconditionError::TooManyAgentInstances {
                provided: agent_addresses.len(),
                free,
            }
            .into());
        }

        // Instance i fills declared slot (already registered + i).
        let offset = snapshot.num_agent_instances as usize;
        let slot_ids: Vec<u32> = (0..agent_addresses.len())
            .map(|index| {
                snapshot
                    .agent_ids
                    .get(offset + index)
                    .or_else(|| service.agent_ids.get(offset + index))
                    .copied()
                    .ok_or_else(|| OperationError::abi("no declared agent id for slot"))
            })
            .collect::<Result<_, _>>()?;

        let value = snapshot
            .security_deposit
            .saturating_mul(U256::from(agent_addresses.len() as u64));
        let instances: Vec<_> = agent_addresses
            .iter()
            .map(|address| json!(address.to_string()))
            .collect();
        let tx = manager.tx(
            service.owner_address,
            value,
            "registerAgents",
            &[
                json!(service.service_id),
                json!(instances),
                json!(slot_ids),
            ],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&registry, &receipt, "RegisterInstance");

        service.agent_addresses.extend_from_slice(agent_addresses);

        let after = service_snapshot(&registry, service.service_id).await?;
        tracing::info!(
            service = %service.key(),
            registered = after.num_agent_instances,
            slots = after.max_num_agent_instances,
            state = ?after.state,
            "agent registration submitted"
        );
        Ok(())
    }

    /// Deploy the service multisig and advance to `DEPLOYED`. Returns the
    /// multisig address parsed from `CreateMultisigWithAgents`.
    pub async fn deploy(
        &self,
        service: &mut Service,
        fallback_handler: Option<Address>,
    ) -> Result<Address, OperationError> {
        let registry = self.registry().await?;
        let manager = self.manager().await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        ensure_state(ServiceState::FinishedRegistration, snapshot.state)?;

        let handler = fallback_handler.unwrap_or(self.ctx.addresses.fallback_handler);
        let salt = self
            .ctx
            .client
            .latest_timestamp()
            .await
            .map_err(|error| OperationError::from_chain(&self.ctx.decoder, error))?;
        let payload = build_deploy_payload(handler, salt);

        let tx = manager.tx(
            service.owner_address,
            U256::ZERO,
            "deploy",
            &[
                json!(service.service_id),
                json!(self.ctx.addresses.multisig_implementation.to_string()),
                json!(format!("0x{}", hex::encode(&payload))),
            ],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&registry, &receipt, "DeployService");

        let multisig_event = require_event(&registry, &receipt, "CreateMultisigWithAgents")?;
        let multisig = multisig_event
            .arg("multisig")
            .and_then(|value| value.as_str())
            .and_then(|raw| raw.parse::<Address>().ok())
            .ok_or_else(|| {
                OperationError::abi("CreateMultisigWithAgents event has no usable multisig")
            })?;

        service.multisig_address = Some(multisig);
        tracing::info!(service = %service.key(), %multisig, "service deployed");
        Ok(multisig)
    }

    /// Terminate a deployed, unstaked service; bonds return to the owner
    /// and the state advances to `TERMINATED_BONDED`.
    pub async fn terminate(&self, service: &Service) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let manager = self.manager().await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        ensure_state(ServiceState::Deployed, snapshot.state)?;
        if service.staking_contract_address.is_some() {
            return Err(PreconditionError::ServiceStaked.into());
        }

        let tx = manager.tx(
            service.owner_address,
            U256::ZERO,
            "terminate",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&registry, &receipt, "TerminateService");
        tracing::info!(service = %service.key(), "service terminated");
        Ok(())
    }

    /// Release the agent bonds of a terminated service. A no-op success
    /// when the registry shows no bond remains.
    pub async fn unbond(&self, service: &Service) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let manager = self.manager().await?;

        let snapshot = service_snapshot(&registry, service.service_id).await?;
        if snapshot.state == ServiceState::PreRegistration {
            tracing::info!(service = %service.key(), "no bond remains, unbond is a no-op");
            return Ok(());
        }
        ensure_state(ServiceState::TerminatedBonded, snapshot.state)?;

        let tx = manager.tx(
            service.owner_address,
            U256::ZERO,
            "unbond",
            &[json!(service.service_id)],
        )?;
        let receipt = submit_tx(&self.ctx, tx).await?;
        warn_if_event_missing(&registry, &receipt, "OperatorUnbond");
        tracing::info!(service = %service.key(), "service unbonded");
        Ok(())
    }

    async fn approve_token_utility(
        &self,
        service: &Service,
        amount: U256,
    ) -> Result<(), OperationError> {
        let token = self.token(service.token_address).await?;
        let utility = self.ctx.addresses.service_registry_token_utility;
        tracing::info!(%utility, %amount, "approving registry token utility");
        let tx = token.tx(
            service.owner_address,
            U256::ZERO,
            "approve",
            &[json!(utility.to_string()), json!(amount.to_string())],
        )?;
        submit_tx(&self.ctx, tx).await?;
        Ok(())
    }

    /// Top up the token-utility allowance when it sits below `required`.
    async fn ensure_utility_allowance(
        &self,
        service: &Service,
        required: U256,
    ) -> Result<(), OperationError> {
        let token = self.token(service.token_address).await?;
        let utility = self.ctx.addresses.service_registry_token_utility;
        let allowance = token
            .call_u256(
                "allowance",
                &[
                    json!(service.owner_address.to_string()),
                    json!(utility.to_string()),
                ],
            )
            .await?;
        if allowance >= required {
            return Ok(());
        }
        tracing::info!(%allowance, %required, "allowance below requirement, approving");
        self.approve_token_utility(service, required).await
    }
}

/// Multisig deployment payload: zero prefix, fallback handler, zero
/// suffix, 32-byte big-endian salt.
fn build_deploy_payload(fallback_handler: Address, salt: u64) -> Vec<u8> {
    let mut payload =
        Vec::with_capacity(DEPLOY_PAYLOAD_ZERO_PREFIX + 20 + DEPLOY_PAYLOAD_ZERO_SUFFIX + 32);
    payload.extend_from_slice(&[0u8; DEPLOY_PAYLOAD_ZERO_PREFIX]);
    payload.extend_from_slice(fallback_handler.as_slice());
    payload.extend_from_slice(&[0u8; DEPLOY_PAYLOAD_ZERO_SUFFIX]);
    let mut salt_word = [0u8; 32];
    salt_word[24..].copy_from_slice(&salt.to_be_bytes());
    payload.extend_from_slice(&salt_word);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_payload_places_handler_and_salt() {
        let handler = Address::repeat_byte(0xfa);
        let payload = build_deploy_payload(handler, 0x0102);
        assert_eq!(payload.len(), 144);
        assert!(payload[..20].iter().all(|byte| *byte == 0));
        assert_eq!(&payload[20..40], handler.as_slice());
        assert!(payload[40..112].iter().all(|byte| *byte == 0));
        assert_eq!(payload[142], 0x01);
        assert_eq!(payload[143], 0x02);
    }
}
