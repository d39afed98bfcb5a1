//! Orchestrating façade.
//!
//! Explicit composition of the four managers over one shared
//! [`ChainContext`]: each manager is independently constructible and
//! testable, and the façade only sequences them. The multi-step
//! `spin_up`/`wind_down` helpers re-read the registry between steps and
//! stop at the first transition that did not land.

use alloy_primitives::Address;
use std::sync::Arc;

use crate::chain::MultisigExecutor;
use crate::context::ChainContext;
use crate::contracts::{ContractHandle, ContractKind};
use crate::domain::errors::{OperationError, PreconditionError};
use crate::domain::types::{MarketplaceVersion, Service, ServiceState};
use crate::managers::drain::DrainManager;
use crate::managers::lifecycle::LifecycleManager;
use crate::managers::mech::MechDispatcher;
use crate::managers::staking::StakingManager;
use crate::managers::{ensure_state, service_snapshot};

pub struct ServiceManager {
    ctx: Arc<ChainContext>,
    pub lifecycle: LifecycleManager,
    pub staking: StakingManager,
    pub drain: DrainManager,
    pub mech: Option<MechDispatcher>,
}

impl ServiceManager {
    /// Wire the managers over one context. The mech dispatcher is present
    /// only when the chain profile names a marketplace.
    pub fn new(
        ctx: Arc<ChainContext>,
        executor: Arc<dyn MultisigExecutor>,
        marketplace_version: MarketplaceVersion,
    ) -> Self {
        let mech = ctx.addresses.mech_marketplace.map(|marketplace| {
            MechDispatcher::new(
                Arc::clone(&ctx),
                Arc::clone(&executor),
                marketplace,
                marketplace_version,
            )
        });
        Self {
            lifecycle: LifecycleManager::new(Arc::clone(&ctx)),
            staking: StakingManager::new(Arc::clone(&ctx)),
            drain: DrainManager::new(Arc::clone(&ctx), executor),
            mech,
            ctx,
        }
    }

    async fn registry(&self) -> Result<Arc<ContractHandle>, OperationError> {
        self.ctx
            .contract(
                ContractKind::ServiceRegistry,
                self.ctx.addresses.service_registry,
            )
            .await
    }

    /// Drive a created service to `DEPLOYED` (and optionally staked),
    /// skipping steps already completed. Each transition is verified
    /// against the registry before the next step runs.
    pub async fn spin_up(
        &self,
        service: &mut Service,
        agent_addresses: &[Address],
        staking_contract: Option<Address>,
    ) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let mut state = service_snapshot(&registry, service.service_id).await?.state;
        tracing::info!(service = %service.key(), ?state, "spinning up");

        if state == ServiceState::PreRegistration {
            self.lifecycle.activate_registration(service).await?;
            state = service_snapshot(&registry, service.service_id).await?.state;
            ensure_state(ServiceState::ActiveRegistration, state)?;
        }

        if state == ServiceState::ActiveRegistration {
            self.lifecycle
                .register_agents(service, agent_addresses)
                .await?;
            state = service_snapshot(&registry, service.service_id).await?.state;
            ensure_state(ServiceState::FinishedRegistration, state)?;
        }

        if state == ServiceState::FinishedRegistration {
            self.lifecycle.deploy(service, None).await?;
            state = service_snapshot(&registry, service.service_id).await?.state;
            ensure_state(ServiceState::Deployed, state)?;
        }

        ensure_state(ServiceState::Deployed, state)?;

        if let Some(staking_address) = staking_contract {
            self.staking.stake(service, staking_address).await?;
        }

        tracing::info!(service = %service.key(), "spin up complete");
        Ok(())
    }

    /// Wind a service back down to `PRE_REGISTRATION`: unstake if staked,
    /// then terminate, then unbond. Idempotent when already wound down.
    pub async fn wind_down(&self, service: &mut Service) -> Result<(), OperationError> {
        let registry = self.registry().await?;
        let mut state = service_snapshot(&registry, service.service_id).await?.state;
        tracing::info!(service = %service.key(), ?state, "winding down");

        if state == ServiceState::NonExistent {
            return Err(PreconditionError::WrongServiceState {
                expected: ServiceState::Deployed,
                actual: state,
            }
            .into());
        }
        if state == ServiceState::PreRegistration {
            tracing::info!(service = %service.key(), "already wound down");
            return Ok(());
        }

        if state == ServiceState::Deployed {
            if let Some(staking_address) = service.staking_contract_address {
                self.staking.unstake(service, staking_address).await?;
            }
            self.lifecycle.terminate(service).await?;
            state = service_snapshot(&registry, service.service_id).await?.state;
            ensure_state(ServiceState::TerminatedBonded, state)?;
        }

        if state == ServiceState::TerminatedBonded {
            self.lifecycle.unbond(service).await?;
            state = service_snapshot(&registry, service.service_id).await?.state;
            ensure_state(ServiceState::PreRegistration, state)?;
        }

        tracing::info!(service = %service.key(), "wind down complete");
        Ok(())
    }
}
