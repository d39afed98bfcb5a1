use alloy_primitives::{Address, Bytes, U256};
use serde_json::Value;
use std::sync::Arc;

use crate::abi::decode::{as_address, as_u256, as_u64, decode_arguments, decode_values};
use crate::abi::encode::encode_call;
use crate::abi::{static_word_size, AbiEventSpec, AbiTypeSpec, ContractInterface};
use crate::chain::{ChainClient, LogEntry, Receipt, TxRequest};
use crate::decoder::RevertDecoder;
use crate::domain::errors::OperationError;

/// The contract kinds this core binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContractKind {
    ServiceRegistry,
    ServiceManager,
    RegistryTokenUtility,
    Erc20,
    Staking,
    ActivityChecker,
    MechMarketplace,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ServiceRegistry => "service_registry",
            Self::ServiceManager => "service_manager",
            Self::RegistryTokenUtility => "registry_token_utility",
            Self::Erc20 => "erc20",
            Self::Staking => "staking",
            Self::ActivityChecker => "activity_checker",
            Self::MechMarketplace => "mech_marketplace",
        };
        write!(f, "{name}")
    }
}

/// One event decoded from a receipt log.
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl DecodedEvent {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args
            .iter()
            .find(|(arg_name, _)| arg_name == name)
            .map(|(_, value)| value)
    }
}

/// A contract binding: one (kind, chain, address) with its interface
/// description and the shared transport and revert decoder.
#[derive(Clone)]
pub struct ContractHandle {
    pub kind: ContractKind,
    pub chain_name: String,
    pub address: Address,
    interface: Arc<ContractInterface>,
    client: Arc<dyn ChainClient>,
    decoder: Arc<RevertDecoder>,
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("kind", &self.kind)
            .field("chain_name", &self.chain_name)
            .field("address", &self.address)
            .finish()
    }
}

impl ContractHandle {
    pub fn new(
        kind: ContractKind,
        chain_name: impl Into<String>,
        address: Address,
        interface: Arc<ContractInterface>,
        client: Arc<dyn ChainClient>,
        decoder: Arc<RevertDecoder>,
    ) -> Self {
        Self {
            kind,
            chain_name: chain_name.into(),
            address,
            interface,
            client,
            decoder,
        }
    }

    pub fn interface(&self) -> &ContractInterface {
        &self.interface
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.interface.has_function(name)
    }

    /// Calldata for `function` with the given JSON-typed arguments.
    pub fn encode_call(&self, function: &str, args: &[Value]) -> Result<Bytes, OperationError> {
        let spec = self.interface.function(function).ok_or_else(|| {
            OperationError::abi(format!(
                "{} abi has no function {function}",
                self.kind
            ))
        })?;
        encode_call(spec, args)
            .map(Bytes::from)
            .map_err(OperationError::Abi)
    }

    /// A transaction request targeting this contract.
    pub fn tx(
        &self,
        from: Address,
        value: U256,
        function: &str,
        args: &[Value],
    ) -> Result<TxRequest, OperationError> {
        Ok(TxRequest {
            from,
            to: self.address,
            value,
            data: self.encode_call(function, args)?,
        })
    }

    /// Read-only call, with outputs decoded per the interface. Reverts are
    /// routed through the shared decoder.
    pub async fn call(&self, function: &str, args: &[Value]) -> Result<Vec<Value>, OperationError> {
        let data = self.encode_call(function, args)?;
        let raw = self
            .client
            .call(self.address, data)
            .await
            .map_err(|error| OperationError::from_chain(&self.decoder, error))?;
        let spec = self.interface.function(function).ok_or_else(|| {
            OperationError::abi(format!("{} abi has no function {function}", self.kind))
        })?;
        decode_arguments(&spec.outputs, &raw).map_err(|error| {
            OperationError::abi(format!("{function} return data: {error}"))
        })
    }

    pub async fn call_u256(&self, function: &str, args: &[Value]) -> Result<U256, OperationError> {
        let values = self.call(function, args).await?;
        first(function, &values)
            .and_then(|value| as_u256(value, function).map_err(OperationError::Abi))
    }

    pub async fn call_u64(&self, function: &str, args: &[Value]) -> Result<u64, OperationError> {
        let values = self.call(function, args).await?;
        first(function, &values)
            .and_then(|value| as_u64(value, function).map_err(OperationError::Abi))
    }

    pub async fn call_address(
        &self,
        function: &str,
        args: &[Value],
    ) -> Result<Address, OperationError> {
        let values = self.call(function, args).await?;
        first(function, &values)
            .and_then(|value| as_address(value, function).map_err(OperationError::Abi))
    }

    /// Decode every log in the receipt that this contract emitted and whose
    /// topic matches a declared event. Undecodable matches are skipped with
    /// a warning; the chain already accepted them.
    pub fn extract_events(&self, receipt: &Receipt) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        for log in &receipt.logs {
            if log.address != self.address {
                continue;
            }
            let Some(topic0) = log.topics.first() else {
                continue;
            };
            let Some(spec) = self.interface.event_by_topic(topic0) else {
                continue;
            };
            match decode_event(spec, log) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::warn!(
                        contract = %self.kind,
                        event = %spec.name,
                        %error,
                        "skipping undecodable event log"
                    );
                }
            }
        }
        events
    }

    pub fn find_event(&self, receipt: &Receipt, name: &str) -> Option<DecodedEvent> {
        self.extract_events(receipt)
            .into_iter()
            .find(|event| event.name == name)
    }
}

fn first<'a>(function: &str, values: &'a [Value]) -> Result<&'a Value, OperationError> {
    values
        .first()
        .ok_or_else(|| OperationError::abi(format!("{function} returned no values")))
}

fn decode_event(spec: &AbiEventSpec, log: &LogEntry) -> Result<DecodedEvent, String> {
    let mut args = Vec::with_capacity(spec.inputs.len());
    let mut topic_cursor = 1usize;

    let data_params: Vec<&crate::abi::AbiParam> =
        spec.inputs.iter().filter(|param| !param.indexed).collect();
    let data_specs: Vec<AbiTypeSpec> = data_params
        .iter()
        .map(|param| param.spec.clone())
        .collect();
    let mut data_values = decode_values(&data_specs, &log.data)?.into_iter();

    for param in &spec.inputs {
        if param.indexed {
            let topic = log
                .topics
                .get(topic_cursor)
                .ok_or_else(|| format!("missing topic for indexed param {}", param.name))?;
            topic_cursor += 1;
            // Single-word static types decode from the topic directly;
            // dynamic indexed values are keccak hashes and stay opaque.
            let value = if static_word_size(&param.spec) == Some(1) {
                decode_values(&[param.spec.clone()], topic.as_slice())?
                    .into_iter()
                    .next()
                    .ok_or_else(|| format!("empty decode for indexed param {}", param.name))?
            } else {
                Value::String(format!("0x{}", hex::encode(topic)))
            };
            args.push((param.name.clone(), value));
        } else {
            let value = data_values
                .next()
                .ok_or_else(|| format!("missing data value for param {}", param.name))?;
            args.push((param.name.clone(), value));
        }
    }

    Ok(DecodedEvent {
        name: spec.name.clone(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::encode::encode_values;
    use alloy_primitives::B256;
    use serde_json::json;

    fn erc20_interface() -> Arc<ContractInterface> {
        let abi = r#"[
            {"type": "function", "name": "balanceOf", "stateMutability": "view",
             "inputs": [{"name": "owner", "type": "address"}],
             "outputs": [{"type": "uint256"}]},
            {"type": "event", "name": "Transfer", "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256"}
            ]}
        ]"#;
        Arc::new(ContractInterface::parse("erc20", abi).expect("abi should parse"))
    }

    fn decode_transfer(log: &LogEntry) -> DecodedEvent {
        let interface = erc20_interface();
        let spec = interface.event("Transfer").expect("event exists");
        decode_event(spec, log).expect("event should decode")
    }

    #[test]
    fn decodes_indexed_topics_and_data_payload() {
        let interface = erc20_interface();
        let spec = interface.event("Transfer").expect("event exists");
        let from = "0x1111111111111111111111111111111111111111";
        let to = "0x2222222222222222222222222222222222222222";
        let mut from_topic = [0u8; 32];
        from_topic[12..].copy_from_slice(&hex::decode(&from[2..]).expect("hex"));
        let mut to_topic = [0u8; 32];
        to_topic[12..].copy_from_slice(&hex::decode(&to[2..]).expect("hex"));

        let log = LogEntry {
            address: Address::ZERO,
            topics: vec![
                spec.topic0,
                B256::from(from_topic),
                B256::from(to_topic),
            ],
            data: Bytes::from(
                encode_values(&[AbiTypeSpec::plain("uint256")], &[json!("1500")])
                    .expect("data should encode"),
            ),
        };

        let event = decode_transfer(&log);
        assert_eq!(event.name, "Transfer");
        assert_eq!(event.arg("from"), Some(&json!(from)));
        assert_eq!(event.arg("to"), Some(&json!(to)));
        assert_eq!(event.arg("value"), Some(&json!("1500")));
    }

    #[test]
    fn missing_topic_is_an_error() {
        let interface = erc20_interface();
        let spec = interface.event("Transfer").expect("event exists");
        let log = LogEntry {
            address: Address::ZERO,
            topics: vec![spec.topic0],
            data: Bytes::new(),
        };
        assert!(decode_event(spec, &log).is_err());
    }
}
