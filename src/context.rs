//! Shared environment for the managers: one chain, one transport client,
//! one revert decoder, one contract cache.

use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::ContractInterface;
use crate::chain::ChainClient;
use crate::config::ProtocolAddresses;
use crate::contracts::{ContractCache, ContractHandle, ContractKind};
use crate::decoder::RevertDecoder;
use crate::domain::errors::OperationError;

/// Interface descriptions per contract kind, supplied by the ABI-loading
/// collaborator at startup.
#[derive(Clone, Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: HashMap<ContractKind, Arc<ContractInterface>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ContractKind, interface: ContractInterface) {
        self.interfaces.insert(kind, Arc::new(interface));
    }

    pub fn get(&self, kind: ContractKind) -> Result<Arc<ContractInterface>, OperationError> {
        self.interfaces
            .get(&kind)
            .cloned()
            .ok_or_else(|| OperationError::abi(format!("no interface loaded for {kind}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractInterface> {
        self.interfaces.values().map(Arc::as_ref)
    }
}

/// Everything the managers share for one chain.
///
/// The revert decoder is built once here from every loaded interface and
/// then only passed by reference; the contract cache is process-wide for
/// this context and safe under concurrent access.
pub struct ChainContext {
    pub chain_name: String,
    pub client: Arc<dyn ChainClient>,
    pub addresses: ProtocolAddresses,
    pub interfaces: InterfaceRegistry,
    pub decoder: Arc<RevertDecoder>,
    pub cache: ContractCache,
}

impl ChainContext {
    pub fn new(
        chain_name: impl Into<String>,
        client: Arc<dyn ChainClient>,
        addresses: ProtocolAddresses,
        interfaces: InterfaceRegistry,
    ) -> Self {
        let decoder = Arc::new(RevertDecoder::from_interfaces(interfaces.iter()));
        Self {
            chain_name: chain_name.into(),
            client,
            addresses,
            interfaces,
            decoder,
            cache: ContractCache::new(),
        }
    }

    /// The cached handle for `(kind, chain, address)`, binding it on first
    /// access.
    pub async fn contract(
        &self,
        kind: ContractKind,
        address: Address,
    ) -> Result<Arc<ContractHandle>, OperationError> {
        self.cache
            .get_or_create(kind, &self.chain_name, address, || async {
                Ok(ContractHandle::new(
                    kind,
                    self.chain_name.clone(),
                    address,
                    self.interfaces.get(kind)?,
                    Arc::clone(&self.client),
                    Arc::clone(&self.decoder),
                ))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChainClient;

    #[tokio::test]
    async fn contract_lookup_fails_without_a_loaded_interface() {
        let context = ChainContext::new(
            "gnosis",
            Arc::new(MockChainClient::new()),
            ProtocolAddresses::gnosis(),
            InterfaceRegistry::new(),
        );
        let error = context
            .contract(ContractKind::Staking, Address::repeat_byte(0x11))
            .await
            .expect_err("missing interface must fail");
        assert!(error.to_string().contains("no interface loaded"));
    }
}
