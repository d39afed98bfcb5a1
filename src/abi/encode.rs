//! ABI encoding of JSON-typed arguments.
//!
//! Arguments travel as `serde_json::Value` (numbers may arrive as decimal
//! or `0x` strings so 256-bit quantities never pass through floats) and
//! are encoded against [`AbiTypeSpec`]s using the full Solidity head/tail
//! layout: static values inline in the head, dynamic values contribute an
//! offset word and append their payload to the tail, recursively for
//! arrays and tuples.

use alloy_primitives::{Address, U256};
use serde_json::Value;
use std::str::FromStr;

use crate::abi::{is_dynamic_type, split_array_type, static_word_size};
use crate::abi::{AbiFunctionSpec, AbiParam, AbiTypeSpec};

/// Calldata for one function call: 4-byte selector followed by the
/// ABI-encoded arguments (no length prefix).
pub fn encode_call(function: &AbiFunctionSpec, args: &[Value]) -> Result<Vec<u8>, String> {
    let mut out = function.selector.to_vec();
    out.extend_from_slice(&encode_arguments(&function.inputs, args)?);
    Ok(out)
}

pub fn encode_arguments(params: &[AbiParam], values: &[Value]) -> Result<Vec<u8>, String> {
    let specs: Vec<AbiTypeSpec> = params.iter().map(|param| param.spec.clone()).collect();
    encode_values(&specs, values)
}

/// Encode a slice of typed values with the head/tail layout.
pub fn encode_values(specs: &[AbiTypeSpec], values: &[Value]) -> Result<Vec<u8>, String> {
    if specs.len() != values.len() {
        return Err(format!(
            "abi encode arity mismatch: expected {} values, got {}",
            specs.len(),
            values.len()
        ));
    }

    // Head size must be known up front so tail offsets can be computed in
    // one pass: dynamic entries reserve exactly one offset word.
    let mut head_size_bytes = 0usize;
    for spec in specs {
        let words = static_word_size(spec).unwrap_or(1);
        head_size_bytes = head_size_bytes.saturating_add(words.saturating_mul(32));
    }

    let mut heads: Vec<Vec<u8>> = Vec::with_capacity(specs.len());
    let mut tail: Vec<u8> = Vec::new();

    for (index, (spec, value)) in specs.iter().zip(values.iter()).enumerate() {
        let field = format!("arg[{index}]");
        if is_dynamic_type(spec) {
            let offset = head_size_bytes.saturating_add(tail.len());
            heads.push(u256_word(U256::from(offset)));
            tail.extend_from_slice(&encode_dynamic(spec, value, &field)?);
        } else {
            heads.push(encode_static(spec, value, &field)?);
        }
    }

    let mut out = Vec::with_capacity(head_size_bytes.saturating_add(tail.len()));
    for head in heads {
        out.extend_from_slice(&head);
    }
    out.extend_from_slice(&tail);
    Ok(out)
}

fn encode_static(spec: &AbiTypeSpec, value: &Value, field: &str) -> Result<Vec<u8>, String> {
    if let Some((element_kind, Some(array_len))) = split_array_type(spec.kind.trim()) {
        let items = value
            .as_array()
            .ok_or_else(|| format!("{field} must be an array"))?;
        if items.len() != array_len {
            return Err(format!(
                "{field} length mismatch: expected {array_len}, got {}",
                items.len()
            ));
        }
        let element = AbiTypeSpec {
            kind: element_kind,
            components: spec.components.clone(),
        };
        let mut out = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            out.extend_from_slice(&encode_static(&element, item, &format!("{field}[{idx}]"))?);
        }
        return Ok(out);
    }

    let kind = spec.kind.trim().to_ascii_lowercase();
    if kind == "tuple" {
        let items = tuple_items(value, field)?;
        if items.len() != spec.components.len() {
            return Err(format!(
                "{field} tuple arity mismatch: expected {}, got {}",
                spec.components.len(),
                items.len()
            ));
        }
        let mut out = Vec::new();
        for (idx, (component, item)) in spec.components.iter().zip(items.iter()).enumerate() {
            out.extend_from_slice(&encode_static(component, item, &format!("{field}.{idx}"))?);
        }
        return Ok(out);
    }

    encode_primitive_word(&kind, value, field)
}

fn encode_dynamic(spec: &AbiTypeSpec, value: &Value, field: &str) -> Result<Vec<u8>, String> {
    if let Some((element_kind, maybe_len)) = split_array_type(spec.kind.trim()) {
        let items = value
            .as_array()
            .ok_or_else(|| format!("{field} must be an array"))?;
        if let Some(expected_len) = maybe_len {
            if items.len() != expected_len {
                return Err(format!(
                    "{field} length mismatch: expected {expected_len}, got {}",
                    items.len()
                ));
            }
        }
        let element = AbiTypeSpec {
            kind: element_kind,
            components: spec.components.clone(),
        };
        let element_specs = vec![element; items.len()];
        let mut out = Vec::new();
        if maybe_len.is_none() {
            out.extend_from_slice(&u256_word(U256::from(items.len())));
        }
        out.extend_from_slice(&encode_values(&element_specs, items)?);
        return Ok(out);
    }

    let kind = spec.kind.trim().to_ascii_lowercase();
    match kind.as_str() {
        "tuple" => encode_values(&spec.components, tuple_items(value, field)?),
        "bytes" => {
            let bytes = parse_hex_bytes(value, field)?;
            Ok(length_prefixed(&bytes))
        }
        "string" => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("{field} must be a string"))?;
            Ok(length_prefixed(text.as_bytes()))
        }
        other => Err(format!("unsupported dynamic abi type: {other}")),
    }
}

fn encode_primitive_word(kind: &str, value: &Value, field: &str) -> Result<Vec<u8>, String> {
    match kind {
        "address" => {
            let address = parse_address(value, field)?;
            let mut word = vec![0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            Ok(word)
        }
        "bool" => {
            let flag = value
                .as_bool()
                .ok_or_else(|| format!("{field} must be true/false"))?;
            Ok(u256_word(U256::from(u8::from(flag))))
        }
        _ if kind.starts_with("uint") => Ok(u256_word(parse_u256(value, field)?)),
        _ if kind.starts_with("int") => {
            // Signed arguments occur nowhere in the protocol surface; accept
            // non-negative values only rather than carry two's-complement.
            let raw = match value {
                Value::Number(number) => number
                    .as_i64()
                    .ok_or_else(|| format!("{field} must be an integer"))?,
                Value::String(text) => text
                    .trim()
                    .parse::<i64>()
                    .map_err(|error| format!("failed to parse {field}: {error}"))?,
                _ => return Err(format!("{field} must be a string or integer")),
            };
            if raw < 0 {
                return Err(format!("{field}: negative signed integers are not supported"));
            }
            Ok(u256_word(U256::from(raw as u64)))
        }
        _ if kind.starts_with("bytes") => {
            let width = kind
                .trim_start_matches("bytes")
                .parse::<usize>()
                .map_err(|_| format!("unsupported abi type: {kind}"))?;
            if !(1..=32).contains(&width) {
                return Err(format!("fixed bytes width must be in 1..=32, got {width}"));
            }
            let bytes = parse_hex_bytes(value, field)?;
            if bytes.len() > width {
                return Err(format!(
                    "{field} holds {} bytes, more than bytes{width} allows",
                    bytes.len()
                ));
            }
            let mut word = vec![0u8; 32];
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(word)
        }
        other => Err(format!("unsupported abi primitive type: {other}")),
    }
}

fn tuple_items<'a>(value: &'a Value, field: &str) -> Result<&'a [Value], String> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| format!("{field} must be a JSON array of tuple components"))
}

/// Length word followed by the payload zero-padded to the next 32-byte
/// boundary.
fn length_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = u256_word(U256::from(bytes.len()));
    out.extend_from_slice(bytes);
    let padding = (32usize.saturating_sub(bytes.len() % 32)) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

pub(crate) fn u256_word(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}

pub(crate) fn parse_address(value: &Value, field: &str) -> Result<Address, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("{field} address must be a string"))?;
    Address::from_str(raw.trim())
        .map_err(|error| format!("failed to parse {field} as address: {error}"))
}

pub(crate) fn parse_u256(value: &Value, field: &str) -> Result<U256, String> {
    if let Some(raw) = value.as_u64() {
        return Ok(U256::from(raw));
    }
    let raw = value
        .as_str()
        .ok_or_else(|| format!("{field} must be a string or unsigned integer"))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if let Some(hex_digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return U256::from_str_radix(hex_digits, 16)
            .map_err(|error| format!("failed to parse {field} as hex quantity: {error}"));
    }
    U256::from_str(trimmed).map_err(|error| format!("failed to parse {field}: {error}"))
}

pub(crate) fn parse_hex_bytes(value: &Value, field: &str) -> Result<Vec<u8>, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("{field} must be a 0x-prefixed hex string"))?;
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    hex::decode(digits).map_err(|error| format!("failed to decode {field}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: &str) -> AbiTypeSpec {
        AbiTypeSpec::plain(kind)
    }

    #[test]
    fn encodes_static_words_inline() {
        let encoded = encode_values(
            &[spec("uint256"), spec("address"), spec("bool")],
            &[
                json!("1000000000000000000"),
                json!("0x9338b5153ae39bb89f50468e608ed9d764b755fd"),
                json!(true),
            ],
        )
        .expect("static values should encode");
        assert_eq!(encoded.len(), 96);
        assert_eq!(U256::from_be_slice(&encoded[..32]), U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(
            hex::encode(&encoded[44..64]),
            "9338b5153ae39bb89f50468e608ed9d764b755fd"
        );
        assert_eq!(encoded[95], 1);
    }

    #[test]
    fn encodes_dynamic_array_with_offset_and_length() {
        let encoded = encode_values(&[spec("uint256[]")], &[json!(["1", "2"])])
            .expect("dynamic array should encode");
        // offset word, length word, two elements
        assert_eq!(encoded.len(), 128);
        assert_eq!(U256::from_be_slice(&encoded[..32]), U256::from(32u64));
        assert_eq!(U256::from_be_slice(&encoded[32..64]), U256::from(2u64));
        assert_eq!(U256::from_be_slice(&encoded[96..128]), U256::from(2u64));
    }

    #[test]
    fn encodes_bytes_with_padding() {
        let encoded =
            encode_values(&[spec("bytes")], &[json!("0xdeadbeef")]).expect("bytes should encode");
        assert_eq!(encoded.len(), 96);
        assert_eq!(U256::from_be_slice(&encoded[32..64]), U256::from(4u64));
        assert_eq!(&encoded[64..68], [0xde, 0xad, 0xbe, 0xef].as_slice());
        assert!(encoded[68..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn encodes_tuple_array_of_agent_params() {
        // agentParams: (uint32 slots, uint96 bond)[]
        let params = AbiTypeSpec {
            kind: "tuple[]".to_string(),
            components: vec![spec("uint32"), spec("uint96")],
        };
        let encoded = encode_values(&[params], &[json!([[1, "50000000000000000000"]])])
            .expect("tuple array should encode");
        assert_eq!(U256::from_be_slice(&encoded[32..64]), U256::from(1u64));
        assert_eq!(U256::from_be_slice(&encoded[64..96]), U256::from(1u64));
        assert_eq!(
            U256::from_be_slice(&encoded[96..128]),
            U256::from(50u64) * U256::from(10u64).pow(U256::from(18u64))
        );
    }

    #[test]
    fn rejects_arity_mismatch() {
        let error = encode_values(&[spec("uint256")], &[]).expect_err("arity must match");
        assert!(error.contains("arity mismatch"), "got {error}");
    }

    #[test]
    fn rejects_oversized_fixed_bytes() {
        let error = encode_values(&[spec("bytes4")], &[json!("0xdeadbeefff")])
            .expect_err("five bytes must not fit bytes4");
        assert!(error.contains("bytes4"), "got {error}");
    }
}
