//! Lifecycle, staking, and marketplace management for on-chain agent
//! services.
//!
//! The crate drives an EVM-registered agent service through its full
//! lifecycle (creation → registration → deployment → termination), manages
//! its staking position (stake/unstake/checkpoint under time-locked
//! windows), dispatches validated marketplace job requests, and sweeps
//! rewards and idle balances. All of it runs against collaborator ports for
//! transport and multisig signing that live outside this crate.
//!
//! Failures are diagnosed from raw revert bytes through a process-wide
//! [`decoder::RevertDecoder`] built once from every loaded contract
//! interface, and contract bindings are memoized in a concurrency-safe
//! [`contracts::ContractCache`].

pub mod abi;
pub mod chain;
pub mod config;
pub mod context;
pub mod contracts;
pub mod decoder;
pub mod domain;
pub mod managers;
pub mod service_manager;
pub mod test_support;

pub use chain::{ChainClient, LogEntry, MultisigExecutor, Receipt, TxRequest};
pub use config::{AddressBook, ProtocolAddresses};
pub use context::{ChainContext, InterfaceRegistry};
pub use contracts::{ContractCache, ContractHandle, ContractKind};
pub use decoder::{DecodedRevert, RevertDecoder};
pub use domain::errors::{ChainError, OperationError, PreconditionError};
pub use domain::types::{
    CheckpointResult, DrainOutcome, MarketplaceVersion, RequestId, Service, ServiceState,
    StakingState, StakingStatus, NATIVE_TOKEN,
};
pub use managers::drain::DrainManager;
pub use managers::lifecycle::{CreateParams, LifecycleManager};
pub use managers::mech::{MechDispatcher, RequestParams, StakingParams};
pub use managers::staking::StakingManager;
pub use service_manager::ServiceManager;
