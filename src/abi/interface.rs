//! Contract interface descriptions.
//!
//! Parses a standard ABI JSON document into a [`ContractInterface`]: the
//! function, error, and event declarations of one contract kind, each with
//! its canonical signature and recomputed 4-byte selector (functions,
//! errors) or 32-byte topic hash (events). Selectors are always recomputed
//! from the canonical signature rather than trusted from the source
//! document, so a tampered or hand-edited ABI cannot silently dispatch to
//! the wrong function.

use alloy_primitives::{keccak256, B256};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A Solidity type, with tuple components when `kind` is a tuple form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiTypeSpec {
    pub kind: String,
    pub components: Vec<AbiTypeSpec>,
}

impl AbiTypeSpec {
    pub fn plain(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            components: Vec::new(),
        }
    }
}

/// A named function/error/event parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    pub spec: AbiTypeSpec,
    /// Only meaningful for event parameters.
    pub indexed: bool,
}

#[derive(Clone, Debug)]
pub struct AbiFunctionSpec {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub state_mutability: String,
}

#[derive(Clone, Debug)]
pub struct AbiErrorSpec {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<AbiParam>,
}

#[derive(Clone, Debug)]
pub struct AbiEventSpec {
    pub name: String,
    pub signature: String,
    pub topic0: B256,
    pub inputs: Vec<AbiParam>,
}

/// The parsed interface description of one contract kind.
#[derive(Clone, Debug)]
pub struct ContractInterface {
    pub name: String,
    functions: BTreeMap<String, AbiFunctionSpec>,
    pub errors: Vec<AbiErrorSpec>,
    pub events: Vec<AbiEventSpec>,
}

impl ContractInterface {
    /// Parse an ABI JSON document. Accepts either a bare entry array or a
    /// compiler artifact object carrying the array under an `"abi"` key.
    pub fn parse(name: &str, abi_json: &str) -> Result<Self, String> {
        let document: Value = serde_json::from_str(abi_json)
            .map_err(|error| format!("invalid abi json for {name}: {error}"))?;
        let entries = match &document {
            Value::Array(_) => document.clone(),
            Value::Object(map) => map
                .get("abi")
                .cloned()
                .ok_or_else(|| format!("abi document for {name} has no \"abi\" key"))?,
            _ => return Err(format!("abi document for {name} must be an array or object")),
        };
        let raw_entries: Vec<RawAbiEntry> = serde_json::from_value(entries)
            .map_err(|error| format!("malformed abi entries for {name}: {error}"))?;

        let mut functions = BTreeMap::new();
        let mut errors = Vec::new();
        let mut events = Vec::new();

        for entry in raw_entries {
            let entry_type = entry.entry_type.clone();
            match entry_type.as_str() {
                "function" => {
                    let spec = entry.into_function()?;
                    if functions.contains_key(&spec.name) {
                        return Err(format!(
                            "duplicate function name in {name} abi: {}",
                            spec.name
                        ));
                    }
                    functions.insert(spec.name.clone(), spec);
                }
                "error" => errors.push(entry.into_error()?),
                "event" => events.push(entry.into_event()?),
                // constructor / fallback / receive carry no selector.
                _ => {}
            }
        }

        Ok(Self {
            name: name.to_string(),
            functions,
            errors,
            events,
        })
    }

    pub fn function(&self, name: &str) -> Option<&AbiFunctionSpec> {
        self.functions.get(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn event(&self, name: &str) -> Option<&AbiEventSpec> {
        self.events.iter().find(|event| event.name == name)
    }

    pub fn event_by_topic(&self, topic0: &B256) -> Option<&AbiEventSpec> {
        self.events.iter().find(|event| event.topic0 == *topic0)
    }
}

#[derive(Clone, Debug, Deserialize)]
struct RawAbiEntry {
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<RawAbiParam>,
    #[serde(default)]
    outputs: Vec<RawAbiParam>,
    #[serde(rename = "stateMutability", default)]
    state_mutability: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawAbiParam {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<RawAbiParam>,
    #[serde(default)]
    indexed: bool,
}

impl RawAbiEntry {
    fn named(&self, what: &str) -> Result<String, String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("{what} entry must include a non-empty name"))
    }

    fn into_function(self) -> Result<AbiFunctionSpec, String> {
        let name = self.named("function")?;
        let inputs = convert_params(&self.inputs)?;
        let outputs = convert_params(&self.outputs)?;
        let signature = canonical_signature(&name, &inputs)?;
        let selector = selector(&signature);
        Ok(AbiFunctionSpec {
            name,
            signature,
            selector,
            inputs,
            outputs,
            state_mutability: self
                .state_mutability
                .unwrap_or_else(|| "nonpayable".to_string()),
        })
    }

    fn into_error(self) -> Result<AbiErrorSpec, String> {
        let name = self.named("error")?;
        let inputs = convert_params(&self.inputs)?;
        let signature = canonical_signature(&name, &inputs)?;
        let selector = selector(&signature);
        Ok(AbiErrorSpec {
            name,
            signature,
            selector,
            inputs,
        })
    }

    fn into_event(self) -> Result<AbiEventSpec, String> {
        let name = self.named("event")?;
        let inputs = convert_params(&self.inputs)?;
        let signature = canonical_signature(&name, &inputs)?;
        let topic0 = keccak256(signature.as_bytes());
        Ok(AbiEventSpec {
            name,
            signature,
            topic0,
            inputs,
        })
    }
}

fn convert_params(raw: &[RawAbiParam]) -> Result<Vec<AbiParam>, String> {
    raw.iter()
        .enumerate()
        .map(|(index, param)| {
            Ok(AbiParam {
                name: param
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("arg{index}")),
                spec: convert_type(param)?,
                indexed: param.indexed,
            })
        })
        .collect()
}

fn convert_type(raw: &RawAbiParam) -> Result<AbiTypeSpec, String> {
    let kind = raw.kind.trim();
    if kind.is_empty() {
        return Err("abi parameter has an empty type".to_string());
    }
    let components = raw
        .components
        .iter()
        .map(convert_type)
        .collect::<Result<Vec<_>, _>>()?;
    if kind.starts_with("tuple") && components.is_empty() {
        return Err(format!("tuple type {kind} is missing components"));
    }
    Ok(AbiTypeSpec {
        kind: kind.to_string(),
        components,
    })
}

/// Canonical signature `name(type1,type2,…)` with widths normalized
/// (`uint` → `uint256`, `int` → `int256`) and tuples expanded to
/// parenthesized component lists, as keccak selector computation requires.
pub fn canonical_signature(name: &str, params: &[AbiParam]) -> Result<String, String> {
    let types = params
        .iter()
        .map(|param| canonical_type(&param.spec))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{name}({})", types.join(",")))
}

pub fn canonical_type(spec: &AbiTypeSpec) -> Result<String, String> {
    let kind = spec.kind.trim();
    if let Some(start) = array_suffix_start(kind) {
        let element = AbiTypeSpec {
            kind: kind[..start].to_string(),
            components: spec.components.clone(),
        };
        return Ok(format!("{}{}", canonical_type(&element)?, &kind[start..]));
    }
    if kind == "tuple" {
        let inner = spec
            .components
            .iter()
            .map(canonical_type)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(format!("({})", inner.join(",")));
    }
    Ok(match kind {
        "uint" => "uint256".to_string(),
        "int" => "int256".to_string(),
        other => other.to_string(),
    })
}

/// Byte offset where the outermost `[…]` array suffix begins, if any.
fn array_suffix_start(kind: &str) -> Option<usize> {
    if !kind.ends_with(']') {
        return None;
    }
    kind.rfind('[')
}

/// First 4 bytes of the keccak hash of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Full keccak hash of a canonical signature (event `topics[0]`).
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recomputes_known_erc20_selector() {
        let abi = r#"
        [
          {
            "type": "function",
            "name": "transfer",
            "stateMutability": "nonpayable",
            "inputs": [
              {"name": "to", "type": "address"},
              {"name": "amount", "type": "uint"}
            ],
            "outputs": [{"type": "bool"}]
          }
        ]
        "#;
        let interface = ContractInterface::parse("erc20", abi).expect("abi should parse");
        let transfer = interface.function("transfer").expect("transfer exists");
        assert_eq!(transfer.signature, "transfer(address,uint256)");
        assert_eq!(transfer.selector, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn parse_accepts_artifact_object_with_abi_key() {
        let artifact = r#"{"abi": [
            {"type": "event", "name": "Transfer", "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256"}
            ]}
        ]}"#;
        let interface = ContractInterface::parse("erc20", artifact).expect("abi should parse");
        let event = interface.event("Transfer").expect("event exists");
        assert_eq!(event.signature, "Transfer(address,address,uint256)");
        assert_eq!(
            format!("{:x}", event.topic0),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn parse_collects_error_declarations() {
        let abi = r#"[
            {"type": "error", "name": "OwnerOnly", "inputs": [
                {"name": "sender", "type": "address"},
                {"name": "owner", "type": "address"}
            ]}
        ]"#;
        let interface = ContractInterface::parse("registry", abi).expect("abi should parse");
        assert_eq!(interface.errors.len(), 1);
        assert_eq!(interface.errors[0].signature, "OwnerOnly(address,address)");
        assert_eq!(interface.errors[0].selector, selector("OwnerOnly(address,address)"));
    }

    #[test]
    fn canonical_type_expands_tuple_arrays() {
        let spec = AbiTypeSpec {
            kind: "tuple[]".to_string(),
            components: vec![AbiTypeSpec::plain("address"), AbiTypeSpec::plain("uint")],
        };
        assert_eq!(
            canonical_type(&spec).expect("tuple[] should normalize"),
            "(address,uint256)[]"
        );
    }

    #[test]
    fn parse_rejects_duplicate_function_names() {
        let abi = r#"[
            {"type": "function", "name": "ping", "inputs": [], "outputs": []},
            {"type": "function", "name": "ping", "inputs": [{"type": "uint256"}], "outputs": []}
        ]"#;
        let error = ContractInterface::parse("x", abi).expect_err("duplicates must be rejected");
        assert!(error.contains("duplicate function name"), "got {error}");
    }
}
