//! Test doubles for the collaborator ports.
//!
//! `MockChainClient` scripts read-call results per `(address, selector)`
//! and queues receipts for submitted transactions, recording every
//! submission so tests can assert that fail-fast paths never reach the
//! transport. `MockMultisigExecutor` does the same for multisig-authorized
//! transactions.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::chain::{ChainClient, LogEntry, MultisigExecutor, Receipt, TxRequest};
use crate::domain::errors::ChainError;

type CallKey = (Address, [u8; 4]);

#[derive(Default)]
struct MockChainState {
    timestamp: u64,
    balances: HashMap<Address, U256>,
    call_results: HashMap<CallKey, Result<Bytes, ChainError>>,
    exact_call_results: HashMap<(Address, Bytes), Result<Bytes, ChainError>>,
    receipts: VecDeque<Result<Receipt, ChainError>>,
    sent: Vec<TxRequest>,
    calls: Vec<(Address, Bytes)>,
}

#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.lock().timestamp = timestamp;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock().balances.insert(address, balance);
    }

    /// Every `call` to `(to, selector)` returns `data` until overwritten.
    pub fn stub_call(&self, to: Address, selector: [u8; 4], data: Bytes) {
        self.lock().call_results.insert((to, selector), Ok(data));
    }

    /// Every `call` to `to` with exactly `calldata` returns `data`. Exact
    /// stubs take precedence over selector stubs, so per-argument results
    /// (e.g. one bond per agent id) can coexist with a selector default.
    pub fn stub_call_exact(&self, to: Address, calldata: Bytes, data: Bytes) {
        self.lock()
            .exact_call_results
            .insert((to, calldata), Ok(data));
    }

    /// Every `call` to `(to, selector)` reverts with the raw payload.
    pub fn stub_call_revert(&self, to: Address, selector: [u8; 4], revert_data: Bytes) {
        self.lock()
            .call_results
            .insert((to, selector), Err(ChainError::Reverted(revert_data)));
    }

    /// Queue the outcome of the next `send_transaction`. With an empty
    /// queue, submissions succeed with an empty-log receipt.
    pub fn push_receipt(&self, outcome: Result<Receipt, ChainError>) {
        self.lock().receipts.push_back(outcome);
    }

    /// Every transaction submitted so far.
    pub fn sent(&self) -> Vec<TxRequest> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Every read call issued so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.lock();
        state.calls.push((to, data.clone()));
        if let Some(result) = state.exact_call_results.get(&(to, data.clone())) {
            return result.clone();
        }
        let selector = selector_of(&data);
        match state.call_results.get(&(to, selector)) {
            Some(result) => result.clone(),
            None => Err(ChainError::Transport(format!(
                "no stubbed result for call to {to} selector 0x{}",
                hex::encode(selector)
            ))),
        }
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<Receipt, ChainError> {
        let mut state = self.lock();
        state.sent.push(tx);
        let sequence = state.sent.len() as u64;
        state
            .receipts
            .pop_front()
            .unwrap_or_else(|| Ok(receipt_with(sequence, Vec::new())))
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        Ok(self.lock().timestamp)
    }
}

#[derive(Default)]
struct MockExecutorState {
    receipts: VecDeque<Result<Receipt, ChainError>>,
    executed: Vec<(Address, Address, U256, Bytes)>,
}

#[derive(Default)]
pub struct MockMultisigExecutor {
    state: Mutex<MockExecutorState>,
}

impl MockMultisigExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_receipt(&self, outcome: Result<Receipt, ChainError>) {
        self.lock().receipts.push_back(outcome);
    }

    pub fn executed(&self) -> Vec<(Address, Address, U256, Bytes)> {
        self.lock().executed.clone()
    }

    pub fn executed_count(&self) -> usize {
        self.lock().executed.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockExecutorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MultisigExecutor for MockMultisigExecutor {
    async fn execute(
        &self,
        multisig: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Receipt, ChainError> {
        let mut state = self.lock();
        state.executed.push((multisig, to, value, data));
        let sequence = state.executed.len() as u64;
        state
            .receipts
            .pop_front()
            .unwrap_or_else(|| Ok(receipt_with(sequence | 0x8000, Vec::new())))
    }
}

/// First 4 bytes of a calldata blob.
pub fn selector_of(data: &[u8]) -> [u8; 4] {
    let mut selector = [0u8; 4];
    let len = data.len().min(4);
    selector[..len].copy_from_slice(&data[..len]);
    selector
}

/// A successful receipt with a deterministic hash derived from `seed`.
pub fn receipt_with(seed: u64, logs: Vec<LogEntry>) -> Receipt {
    let mut hash = [0u8; 32];
    hash[24..].copy_from_slice(&seed.to_be_bytes());
    Receipt {
        status: 1,
        transaction_hash: B256::from(hash),
        logs,
    }
}

/// A failed (status 0) receipt.
pub fn failed_receipt(seed: u64) -> Receipt {
    let mut receipt = receipt_with(seed, Vec::new());
    receipt.status = 0;
    receipt
}

/// A log entry carrying `topics` and ABI-encoded `data`.
pub fn log(address: Address, topics: Vec<B256>, data: Bytes) -> LogEntry {
    LogEntry {
        address,
        topics,
        data,
    }
}

/// A 32-byte word holding a u64 (ABI-encoded uint return data).
pub fn uint_word(value: u64) -> Bytes {
    Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec())
}

/// A 32-byte word holding a full U256.
pub fn u256_word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

/// A 32-byte word holding an address (ABI-encoded address return data).
pub fn address_word(address: Address) -> Bytes {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    Bytes::from(word.to_vec())
}

/// An address padded into an event topic.
pub fn address_topic(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::from(word)
}

/// A u64 padded into an event topic.
pub fn uint_topic(value: u64) -> B256 {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    B256::from(word)
}
