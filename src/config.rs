//! Protocol address book.
//!
//! The core never reads configuration files itself; callers either start
//! from the built-in profiles or deserialize a [`AddressBook`] from
//! whatever source the embedding application loads.

use alloy_primitives::{address, b256, Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agent type id used when the caller does not specify one.
pub const TRADER_AGENT_ID: u32 = 25;

/// Config hash registered for the default trader agent type.
pub const TRADER_CONFIG_HASH: B256 =
    b256!("108e90795119d6015274ef03af1a669c6d13ab6acc9e2b2978be01ee9ea2ec93");

/// Protocol contract addresses for one chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    pub service_registry: Address,
    pub service_registry_token_utility: Address,
    pub service_manager: Address,
    pub multisig_implementation: Address,
    pub fallback_handler: Address,
    #[serde(default)]
    pub mech_marketplace: Option<Address>,
}

impl ProtocolAddresses {
    pub fn gnosis() -> Self {
        Self {
            service_registry: address!("9338b5153AE39BB89f50468E608eD9d764B755fD"),
            service_registry_token_utility: address!("a45E64d13A30a51b91ae0eb182e88a40e9b18eD8"),
            service_manager: address!("068a4f0946cF8c7f9C1B58a3b5243Ac8843bf473"),
            multisig_implementation: address!("3C1fF68f5aa342D296d4DEe4Bb1cACCA912D95fE"),
            fallback_handler: address!("f48f2b2d2a534e402487b3ee7c18c33aec0fe5e4"),
            mech_marketplace: Some(address!("4554fE75c1f5576c1d7F765B2A036c199Adae329")),
        }
    }
}

/// Chain name to protocol addresses.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AddressBook {
    chains: BTreeMap<String, ProtocolAddresses>,
}

impl AddressBook {
    /// The built-in profiles.
    pub fn builtin() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert("gnosis".to_string(), ProtocolAddresses::gnosis());
        Self { chains }
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|error| format!("invalid address book json: {error}"))
    }

    pub fn get(&self, chain_name: &str) -> Option<&ProtocolAddresses> {
        self.chains.get(chain_name)
    }

    pub fn insert(&mut self, chain_name: impl Into<String>, addresses: ProtocolAddresses) {
        self.chains.insert(chain_name.into(), addresses);
    }
}
