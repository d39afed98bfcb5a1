//! Collaborator ports.
//!
//! The core consumes EVM JSON-RPC semantics through two narrow traits and
//! never owns connection pooling, endpoint rotation, rate limiting, or
//! retry-on-transient-failure; those belong to the implementations behind
//! these ports. Revert payloads must cross the boundary verbatim (not
//! pre-decoded) so the revert decoder can process them.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::domain::errors::ChainError;

/// A state-changing transaction ready for signing and broadcast by the
/// transport/signing collaborators.
#[derive(Clone, Debug, Default)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// One event log from a receipt.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Transaction receipt as surfaced by the transport layer.
#[derive(Clone, Debug)]
pub struct Receipt {
    /// `1` for success, `0` for an on-chain failure.
    pub status: u64,
    pub transaction_hash: B256,
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

/// Read and submit access to one chain.
///
/// Submitting is broadcast-and-await-receipt: once `send_transaction`
/// starts, the operation is not cancellable mid-flight; the only recourse
/// is to wait for the receipt or for the transport layer's own
/// timeout/retry policy to resolve it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Read-only `eth_call`. A revert surfaces as
    /// [`ChainError::Reverted`] carrying the raw return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Sign, broadcast, and await the receipt of one transaction.
    async fn send_transaction(&self, tx: TxRequest) -> Result<Receipt, ChainError>;

    /// Native-currency balance of an account.
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Timestamp of the latest block. Staking windows compare against
    /// chain time, so the chain is the clock.
    async fn latest_timestamp(&self) -> Result<u64, ChainError>;
}

/// Signing collaborator for transactions that must originate from the
/// service's operating multisig (marketplace requests, drains). Producing
/// the threshold signatures is entirely the implementation's concern.
#[async_trait]
pub trait MultisigExecutor: Send + Sync {
    async fn execute(
        &self,
        multisig: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Receipt, ChainError>;
}
