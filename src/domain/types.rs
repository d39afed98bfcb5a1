use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::domain::errors::PreconditionError;

/// Sentinel token address used when a service bonds in the chain's native
/// currency instead of an ERC-20 token.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// On-chain service lifecycle state as reported by the service registry.
///
/// Transitions are monotonic forward except `Deployed -> TerminatedBonded`,
/// which is itself terminal. The local copy is a hint only; every lifecycle
/// operation re-reads the registry immediately before acting.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    NonExistent,
    PreRegistration,
    ActiveRegistration,
    FinishedRegistration,
    Deployed,
    TerminatedBonded,
}

impl ServiceState {
    pub fn from_u8(raw: u8) -> Result<Self, String> {
        match raw {
            0 => Ok(Self::NonExistent),
            1 => Ok(Self::PreRegistration),
            2 => Ok(Self::ActiveRegistration),
            3 => Ok(Self::FinishedRegistration),
            4 => Ok(Self::Deployed),
            5 => Ok(Self::TerminatedBonded),
            other => Err(format!("unknown service state discriminant {other}")),
        }
    }
}

/// Staking state of a service within one staking contract.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StakingState {
    Unstaked,
    Staked,
    /// The service failed a liveness check and was force-removed by the
    /// staking contract.
    Evicted,
}

impl StakingState {
    pub fn from_u8(raw: u8) -> Result<Self, String> {
        match raw {
            0 => Ok(Self::Unstaked),
            1 => Ok(Self::Staked),
            2 => Ok(Self::Evicted),
            other => Err(format!("unknown staking state discriminant {other}")),
        }
    }
}

/// The central entity: an on-chain registered unit of staked agent work,
/// uniquely identified by `(chain_name, service_id)`.
///
/// `service_id` is assigned by the creation transaction and immutable
/// afterwards; `multisig_address` is assigned by deployment and immutable
/// afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Service {
    pub service_name: String,
    pub chain_name: String,
    pub service_id: u64,
    pub owner_address: Address,
    /// Declared agent type ids, one registration slot each.
    pub agent_ids: Vec<u32>,
    /// Registered agent instances, ordered by slot.
    pub agent_addresses: Vec<Address>,
    pub multisig_address: Option<Address>,
    pub staking_contract_address: Option<Address>,
    /// Bonding token; [`NATIVE_TOKEN`] when bonding in the native asset.
    pub token_address: Address,
}

impl Service {
    /// Unique key for this service (`chain_name:service_id`).
    pub fn key(&self) -> String {
        format!("{}:{}", self.chain_name, self.service_id)
    }

    pub fn is_token_bonded(&self) -> bool {
        self.token_address != NATIVE_TOKEN
    }

    /// The deployed operating multisig, or a precondition error before
    /// deployment assigned one.
    pub fn multisig(&self) -> Result<Address, PreconditionError> {
        self.multisig_address
            .ok_or(PreconditionError::MissingMultisig)
    }
}

/// Decoded result of the registry `getService` read.
#[derive(Clone, Debug)]
pub struct ServiceSnapshot {
    pub security_deposit: U256,
    pub multisig: Address,
    pub config_hash: B256,
    pub threshold: u32,
    pub max_num_agent_instances: u32,
    pub num_agent_instances: u32,
    pub state: ServiceState,
    pub agent_ids: Vec<u32>,
}

/// Staking-contract parameters read once before staking.
#[derive(Clone, Debug)]
pub struct StakingRequirements {
    pub min_staking_deposit: U256,
    pub required_agent_bond: U256,
    pub staking_token: Address,
    pub max_num_services: u64,
    pub min_staking_duration: u64,
    pub liveness_period: u64,
}

/// Unstake-window and reward snapshot for a staked service.
#[derive(Clone, Debug)]
pub struct StakingStatus {
    pub state: StakingState,
    /// Stake timestamp; `0` means the contract reports never staked.
    pub ts_start: u64,
    pub min_staking_duration: u64,
    /// Earliest unix timestamp at which unstake is permitted, when staked.
    pub unstake_available_at: Option<u64>,
    pub accrued_reward: U256,
    pub epoch: u64,
}

/// Per-service reward entry from a `Checkpoint` event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceReward {
    pub service_id: u64,
    pub amount: U256,
}

/// Inactivity counter surfaced during a checkpoint; a precursor to
/// eviction, informational only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InactivityWarning {
    pub service_id: u64,
    pub inactivity: U256,
}

/// Outcome of a checkpoint call. `event_found == false` means the receipt
/// succeeded without a `Checkpoint` event (a no-op checkpoint); the chain
/// state is authoritative either way.
#[derive(Clone, Debug)]
pub struct CheckpointResult {
    pub transaction_hash: B256,
    pub event_found: bool,
    pub epoch: u64,
    pub available_rewards: U256,
    pub rewards: Vec<ServiceReward>,
    pub inactivity_warnings: Vec<InactivityWarning>,
}

/// Marketplace request id parsed from the request event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestId(pub U256);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Parameter layout of the target marketplace deployment. Deployed
/// marketplace versions differ in argument arity and field names; the
/// dispatcher must be configured with the exact layout it encodes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketplaceVersion {
    V1,
    V2,
}

impl std::fmt::Display for MarketplaceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

/// Balances swept out of the service multisig by a drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub native_amount: U256,
    pub token_amount: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_state_maps_all_discriminants() {
        let expected = [
            ServiceState::NonExistent,
            ServiceState::PreRegistration,
            ServiceState::ActiveRegistration,
            ServiceState::FinishedRegistration,
            ServiceState::Deployed,
            ServiceState::TerminatedBonded,
        ];
        for (raw, state) in expected.iter().enumerate() {
            assert_eq!(
                ServiceState::from_u8(raw as u8).expect("discriminant should map"),
                *state
            );
        }
        assert!(ServiceState::from_u8(6).is_err());
    }

    #[test]
    fn staking_state_rejects_unknown_discriminant() {
        assert_eq!(
            StakingState::from_u8(1).expect("staked should map"),
            StakingState::Staked
        );
        assert!(StakingState::from_u8(3).is_err());
    }

    #[test]
    fn service_key_is_chain_scoped() {
        let service = Service {
            service_name: "trader".to_string(),
            chain_name: "gnosis".to_string(),
            service_id: 42,
            owner_address: Address::ZERO,
            agent_ids: vec![25],
            agent_addresses: Vec::new(),
            multisig_address: None,
            staking_contract_address: None,
            token_address: NATIVE_TOKEN,
        };
        assert_eq!(service.key(), "gnosis:42");
        assert!(!service.is_token_bonded());
        assert!(service.multisig().is_err());
    }
}
