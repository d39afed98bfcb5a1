//! Process-wide contract-instance cache.
//!
//! Binding a contract means parsing its interface and sometimes issuing
//! constructor-time reads (an ERC-20's `decimals()`, a staking contract's
//! activity checker address), so handles are memoized by
//! `(kind, chain, address)`. Entries are created on first access and never
//! evicted within a process lifetime; the population is bounded by the
//! number of distinct contracts touched, which is small.
//!
//! Concurrent `get_or_create` calls for the same key are single-flight:
//! one factory runs, every caller receives the same handle. A failed
//! factory leaves the slot empty so a later call can retry.

use alloy_primitives::Address;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::contracts::handle::{ContractHandle, ContractKind};
use crate::domain::errors::OperationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: ContractKind,
    chain_name: String,
    address: Address,
}

#[derive(Default)]
pub struct ContractCache {
    entries: Mutex<HashMap<CacheKey, Arc<OnceCell<Arc<ContractHandle>>>>>,
}

impl ContractCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached handle for the key, or the result of running `factory`
    /// exactly once under concurrent access.
    pub async fn get_or_create<F, Fut>(
        &self,
        kind: ContractKind,
        chain_name: &str,
        address: Address,
        factory: F,
    ) -> Result<Arc<ContractHandle>, OperationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ContractHandle, OperationError>>,
    {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries
                .entry(CacheKey {
                    kind,
                    chain_name: chain_name.to_string(),
                    address,
                })
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let handle = cell
            .get_or_try_init(|| async { factory().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Number of bound handles (diagnostics only).
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractInterface;
    use crate::decoder::RevertDecoder;
    use crate::test_support::MockChainClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn minimal_interface() -> Arc<ContractInterface> {
        Arc::new(
            ContractInterface::parse(
                "erc20",
                r#"[{"type": "function", "name": "decimals", "stateMutability": "view",
                     "inputs": [], "outputs": [{"type": "uint8"}]}]"#,
            )
            .expect("abi should parse"),
        )
    }

    fn build_handle(client: Arc<MockChainClient>) -> ContractHandle {
        ContractHandle::new(
            ContractKind::Erc20,
            "gnosis",
            Address::repeat_byte(0xee),
            minimal_interface(),
            client,
            Arc::new(RevertDecoder::builtin()),
        )
    }

    #[tokio::test]
    async fn concurrent_gets_for_one_key_run_the_factory_once() {
        let cache = Arc::new(ContractCache::new());
        let client = Arc::new(MockChainClient::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let make = |cache: Arc<ContractCache>,
                    client: Arc<MockChainClient>,
                    constructions: Arc<AtomicUsize>| async move {
            cache
                .get_or_create(
                    ContractKind::Erc20,
                    "gnosis",
                    Address::repeat_byte(0xee),
                    move || async move {
                        constructions.fetch_add(1, Ordering::SeqCst);
                        Ok(build_handle(client))
                    },
                )
                .await
                .expect("factory should succeed")
        };

        let (first, second) = tokio::join!(
            make(Arc::clone(&cache), Arc::clone(&client), Arc::clone(&constructions)),
            make(Arc::clone(&cache), Arc::clone(&client), Arc::clone(&constructions)),
        );

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_bind_distinct_handles() {
        let cache = ContractCache::new();
        let client = Arc::new(MockChainClient::new());

        let first = cache
            .get_or_create(ContractKind::Erc20, "gnosis", Address::repeat_byte(0x01), {
                let client = Arc::clone(&client);
                move || async move { Ok(build_handle(client)) }
            })
            .await
            .expect("factory should succeed");
        let second = cache
            .get_or_create(ContractKind::Erc20, "base", Address::repeat_byte(0x01), {
                let client = Arc::clone(&client);
                move || async move { Ok(build_handle(client)) }
            })
            .await
            .expect("factory should succeed");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failed_factory_leaves_the_slot_retryable() {
        let cache = ContractCache::new();
        let client = Arc::new(MockChainClient::new());

        let failed = cache
            .get_or_create(
                ContractKind::Erc20,
                "gnosis",
                Address::repeat_byte(0x02),
                || async {
                    Err::<ContractHandle, _>(OperationError::Transport("rpc down".to_string()))
                },
            )
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.len(), 0);

        let recovered = cache
            .get_or_create(ContractKind::Erc20, "gnosis", Address::repeat_byte(0x02), {
                let client = Arc::clone(&client);
                move || async move { Ok(build_handle(client)) }
            })
            .await;
        assert!(recovered.is_ok());
        assert_eq!(cache.len(), 1);
    }
}
