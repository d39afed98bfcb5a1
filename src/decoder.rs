//! Revert-data decoder.
//!
//! Turns the raw return data of a reverted call into a human-readable
//! diagnostic. The selector registry is built once per process from every
//! loaded contract interface's declared errors, plus the generic
//! `Error(string)` and `Panic(uint256)` selectors, and is read-only
//! afterwards. Selectors are keccak hashes of signatures, independent of
//! chain or address, so one registry serves all chains. Decoding never
//! fails: anything unrecognized degrades to the raw hex payload.

use serde_json::Value;
use std::collections::HashMap;

use crate::abi::decode::decode_arguments;
use crate::abi::{AbiErrorSpec, AbiTypeSpec, ContractInterface};

/// `Error(string)`: solidity `revert("...")` / `require(..., "...")`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`: runtime-level failures (overflow, bounds, ...).
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// One decoded revert reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedRevert {
    /// Generic revert with a message, returned verbatim.
    ErrorString(String),
    /// Standardized panic code mapped through the fixed table.
    Panic { code: u64, message: String },
    /// A declared custom error, rendered `Name(arg=value, …)`.
    Custom { name: String, rendered: String },
    /// Revert data without a payload at all.
    Empty,
    /// No registry match; best-effort raw hex payload.
    Unknown { raw: String },
}

impl std::fmt::Display for DecodedRevert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ErrorString(message) => write!(f, "{message}"),
            Self::Panic { message, .. } => write!(f, "{message}"),
            Self::Custom { rendered, .. } => write!(f, "{rendered}"),
            Self::Empty => write!(f, "reverted without revert data"),
            Self::Unknown { raw } => write!(f, "unrecognized revert data {raw}"),
        }
    }
}

/// Registry from 4-byte selector to declared error. Built once, shared by
/// reference; safe for unsynchronized concurrent reads.
#[derive(Clone, Debug, Default)]
pub struct RevertDecoder {
    selectors: HashMap<[u8; 4], AbiErrorSpec>,
}

impl RevertDecoder {
    /// Registry with only the built-in generic selectors.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Build the registry by scanning every loaded interface for declared
    /// error types. On a selector collision the first declaration wins;
    /// the collision itself is a known, harmless ambiguity and is logged.
    pub fn from_interfaces<'a>(interfaces: impl IntoIterator<Item = &'a ContractInterface>) -> Self {
        let mut selectors: HashMap<[u8; 4], AbiErrorSpec> = HashMap::new();
        for interface in interfaces {
            for error in &interface.errors {
                if let Some(existing) = selectors.get(&error.selector) {
                    if existing.signature != error.signature {
                        tracing::debug!(
                            selector = %hex::encode(error.selector),
                            first = %existing.signature,
                            second = %error.signature,
                            "error selector collision, first declaration wins"
                        );
                    }
                    continue;
                }
                selectors.insert(error.selector, error.clone());
            }
        }
        Self { selectors }
    }

    pub fn decode(&self, data: &[u8]) -> DecodedRevert {
        if data.is_empty() {
            return DecodedRevert::Empty;
        }
        if data.len() < 4 {
            return DecodedRevert::Unknown {
                raw: format!("0x{}", hex::encode(data)),
            };
        }

        let selector = [data[0], data[1], data[2], data[3]];
        let tail = &data[4..];

        if selector == ERROR_STRING_SELECTOR {
            if let Some(message) = decode_error_string(tail) {
                return DecodedRevert::ErrorString(message);
            }
        } else if selector == PANIC_SELECTOR {
            if let Some(code) = decode_panic_code(tail) {
                return DecodedRevert::Panic {
                    code,
                    message: panic_message(code),
                };
            }
        } else if let Some(spec) = self.selectors.get(&selector) {
            if let Some(rendered) = render_custom_error(spec, tail) {
                return DecodedRevert::Custom {
                    name: spec.name.clone(),
                    rendered,
                };
            }
        }

        DecodedRevert::Unknown {
            raw: format!("0x{}", hex::encode(data)),
        }
    }
}

fn decode_error_string(tail: &[u8]) -> Option<String> {
    let decoded =
        crate::abi::decode::decode_values(&[AbiTypeSpec::plain("string")], tail).ok()?;
    match decoded.first() {
        Some(Value::String(message)) => Some(message.clone()),
        _ => None,
    }
}

fn decode_panic_code(tail: &[u8]) -> Option<u64> {
    if tail.len() < 32 {
        return None;
    }
    // Panic codes are small; anything overflowing u64 is still reported
    // through the unknown-code message path.
    let word = alloy_primitives::U256::from_be_slice(&tail[..32]);
    Some(u64::try_from(word).unwrap_or(u64::MAX))
}

fn panic_message(code: u64) -> String {
    let reason = match code {
        0x00 => "generic compiler panic",
        0x01 => "assertion failure",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "value outside enum range",
        0x22 => "corrupted storage byte array",
        0x31 => "pop on an empty array",
        0x32 => "array index out of bounds",
        0x41 => "allocation of too much memory",
        0x51 => "call to a zero-initialized function pointer",
        _ => return format!("panic: unknown code 0x{code:02x}"),
    };
    format!("panic: {reason} (0x{code:02x})")
}

fn render_custom_error(spec: &AbiErrorSpec, tail: &[u8]) -> Option<String> {
    let values = decode_arguments(&spec.inputs, tail).ok()?;
    let rendered = spec
        .inputs
        .iter()
        .zip(values.iter())
        .map(|(param, value)| format!("{}={}", param.name, render_value(value)))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{}({rendered})", spec.name))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::encode::{encode_values, u256_word};
    use crate::abi::selector;
    use alloy_primitives::U256;
    use serde_json::json;

    fn panic_payload(code: u64) -> Vec<u8> {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend_from_slice(&u256_word(U256::from(code)));
        data
    }

    #[test]
    fn builtin_selectors_match_their_signatures() {
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
        assert_eq!(selector("Panic(uint256)"), PANIC_SELECTOR);
    }

    #[test]
    fn decodes_generic_error_string_verbatim() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(
            &encode_values(&[AbiTypeSpec::plain("string")], &[json!("GS013")])
                .expect("string should encode"),
        );
        let decoded = RevertDecoder::builtin().decode(&data);
        assert_eq!(decoded, DecodedRevert::ErrorString("GS013".to_string()));
    }

    #[test]
    fn panic_table_maps_known_codes() {
        let decoder = RevertDecoder::builtin();
        match decoder.decode(&panic_payload(0x11)) {
            DecodedRevert::Panic { code, message } => {
                assert_eq!(code, 0x11);
                assert!(message.contains("overflow"), "got {message}");
            }
            other => panic!("expected panic, got {other:?}"),
        }
        match decoder.decode(&panic_payload(0x01)) {
            DecodedRevert::Panic { message, .. } => {
                assert!(message.contains("assertion failure"), "got {message}");
            }
            other => panic!("expected panic, got {other:?}"),
        }
    }

    #[test]
    fn unknown_panic_code_degrades_to_generic_message() {
        match RevertDecoder::builtin().decode(&panic_payload(0x99)) {
            DecodedRevert::Panic { code, message } => {
                assert_eq!(code, 0x99);
                assert_eq!(message, "panic: unknown code 0x99");
            }
            other => panic!("expected panic, got {other:?}"),
        }
    }

    #[test]
    fn declared_error_round_trips_through_registry() {
        let abi = r#"[
            {"type": "error", "name": "ServiceNotFound", "inputs": [
                {"name": "serviceId", "type": "uint256"}
            ]}
        ]"#;
        let interface = ContractInterface::parse("registry", abi).expect("abi should parse");
        let decoder = RevertDecoder::from_interfaces([&interface]);

        let mut data = selector("ServiceNotFound(uint256)").to_vec();
        data.extend_from_slice(
            &encode_values(&[AbiTypeSpec::plain("uint256")], &[json!("41")])
                .expect("args should encode"),
        );
        match decoder.decode(&data) {
            DecodedRevert::Custom { name, rendered } => {
                assert_eq!(name, "ServiceNotFound");
                assert_eq!(rendered, "ServiceNotFound(serviceId=41)");
            }
            other => panic!("expected custom error, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_selector_falls_back_to_raw_hex() {
        let data = [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02];
        match RevertDecoder::builtin().decode(&data) {
            DecodedRevert::Unknown { raw } => assert_eq!(raw, "0xdeadbeef0102"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn empty_and_truncated_payloads_never_raise() {
        assert_eq!(RevertDecoder::builtin().decode(&[]), DecodedRevert::Empty);
        match RevertDecoder::builtin().decode(&[0xab, 0xcd]) {
            DecodedRevert::Unknown { raw } => assert_eq!(raw, "0xabcd"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_custom_error_payload_falls_back_to_raw_hex() {
        let abi = r#"[
            {"type": "error", "name": "WrongState", "inputs": [
                {"name": "state", "type": "uint8"},
                {"name": "serviceId", "type": "uint256"}
            ]}
        ]"#;
        let interface = ContractInterface::parse("registry", abi).expect("abi should parse");
        let decoder = RevertDecoder::from_interfaces([&interface]);
        // Selector matches but the argument frame is truncated.
        let data = selector("WrongState(uint8,uint256)").to_vec();
        match decoder.decode(&data) {
            DecodedRevert::Unknown { .. } => {}
            other => panic!("expected raw fallback, got {other:?}"),
        }
    }
}
