use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

use crate::decoder::{DecodedRevert, RevertDecoder};
use crate::domain::types::{MarketplaceVersion, ServiceState, StakingState};

/// Failure surfaced by a collaborator for a single call or transaction
/// submission.
#[derive(Clone, Debug, Error)]
pub enum ChainError {
    /// Network-level failure. Retry policy belongs to the transport layer;
    /// this core only propagates it.
    #[error("transport error: {0}")]
    Transport(String),
    /// Execution reverted. Carries the raw revert payload verbatim so the
    /// revert decoder can process it.
    #[error("execution reverted ({} bytes of revert data)", .0.len())]
    Reverted(Bytes),
}

/// A locally detected invariant violation. No transaction is built or
/// submitted once one of these is raised.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("service is in state {actual:?}, operation requires {expected:?}")]
    WrongServiceState {
        expected: ServiceState,
        actual: ServiceState,
    },
    #[error("service is not staked (staking state {actual:?})")]
    NotStaked { actual: StakingState },
    #[error("service is already staked (staking state {actual:?})")]
    AlreadyStaked { actual: StakingState },
    #[error("minimum staking duration not met, unlocks in {remaining_secs} seconds")]
    UnstakeLocked { remaining_secs: u64 },
    #[error("agent {agent_id} bond {bond} is below the staking minimum {required}")]
    InsufficientAgentBond {
        agent_id: u32,
        bond: U256,
        required: U256,
    },
    #[error("service token {service_token} does not match staking token {staking_token}")]
    TokenMismatch {
        service_token: Address,
        staking_token: Address,
    },
    #[error("staking contract is full ({staked}/{max} slots)")]
    NoFreeSlots { staked: u64, max: u64 },
    #[error("operator balance {balance} is below the required deposit {required}")]
    InsufficientDeposit { balance: U256, required: U256 },
    #[error("service has no deployed multisig")]
    MissingMultisig,
    #[error("service is staked, unstake before terminating")]
    ServiceStaked,
    #[error("agent instances ({provided}) exceed the remaining slots ({free})")]
    TooManyAgentInstances { provided: usize, free: usize },
    #[error("mech {mech} is not registered on the marketplace")]
    MechNotRegistered { mech: Address },
    #[error("requester {requester} is not eligible on the marketplace")]
    RequesterNotEligible { requester: Address },
    #[error("marketplace {version} layout is not supported here: {missing}")]
    UnsupportedMarketplaceVersion {
        version: MarketplaceVersion,
        missing: String,
    },
    #[error("response timeout {timeout}s outside the allowed window [{min}s, {max}s]")]
    ResponseTimeoutOutOfBounds { timeout: u64, min: u64, max: u64 },
}

/// Failure of one lifecycle, staking, marketplace, or drain operation.
///
/// Every variant carries enough structured detail for a caller to decide
/// whether to retry, wait, or abort. Nothing in this core retries
/// automatically: a precondition violation needs caller action, a revert
/// reflects a logic/state mismatch rather than a transient condition, and
/// transient-network retry belongs to the transport collaborator.
#[derive(Clone, Debug, Error)]
pub enum OperationError {
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("transaction reverted: {0}")]
    Reverted(DecodedRevert),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("abi error: {0}")]
    Abi(String),
    /// The receipt succeeded but the event this operation must parse its
    /// return value from was absent.
    #[error("receipt is missing the expected {event} event")]
    MissingEvent { event: &'static str },
    /// Receipt came back with status 0 and re-simulation recovered no
    /// revert data.
    #[error("transaction {transaction_hash} failed with status 0 and no recoverable revert data")]
    TransactionFailed {
        transaction_hash: alloy_primitives::B256,
    },
}

impl OperationError {
    /// Route a collaborator failure: transport errors propagate as-is,
    /// revert payloads go through the decoder.
    pub fn from_chain(decoder: &RevertDecoder, error: ChainError) -> Self {
        match error {
            ChainError::Transport(message) => Self::Transport(message),
            ChainError::Reverted(data) => Self::Reverted(decoder.decode(&data)),
        }
    }

    pub fn abi(message: impl Into<String>) -> Self {
        Self::Abi(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstake_locked_reports_remaining_wait() {
        let error = PreconditionError::UnstakeLocked {
            remaining_secs: 82_800,
        };
        assert!(error.to_string().contains("82800 seconds"));
    }

    #[test]
    fn from_chain_keeps_transport_errors_verbatim() {
        let decoder = RevertDecoder::builtin();
        let error = OperationError::from_chain(
            &decoder,
            ChainError::Transport("connection reset".to_string()),
        );
        match error {
            OperationError::Transport(message) => assert_eq!(message, "connection reset"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
