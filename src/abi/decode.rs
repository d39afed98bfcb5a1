//! ABI decoding of 32-byte-aligned return data, event payloads, and error
//! arguments back into JSON-typed values.
//!
//! The value mapping mirrors the encoder's input conventions so decoded
//! output can be re-encoded verbatim: `uint`/`int` render as decimal
//! strings (256-bit quantities never pass through floats), `address`,
//! `bytes`, and `bytesN` as lowercase `0x` hex, `bool` as a JSON bool,
//! arrays and tuples as JSON arrays. All offsets and lengths are bounds-
//! checked; malformed payloads produce errors, never panics.

use alloy_primitives::{Address, B256, U256};
use serde_json::Value;

use crate::abi::encode::parse_u256;
use crate::abi::{is_dynamic_type, split_array_type, static_word_size};
use crate::abi::{AbiParam, AbiTypeSpec};

pub fn decode_arguments(params: &[AbiParam], data: &[u8]) -> Result<Vec<Value>, String> {
    let specs: Vec<AbiTypeSpec> = params.iter().map(|param| param.spec.clone()).collect();
    decode_values(&specs, data)
}

/// Decode a slice of typed values from one encoding frame. Dynamic-type
/// offsets are interpreted relative to the start of `frame`.
pub fn decode_values(specs: &[AbiTypeSpec], frame: &[u8]) -> Result<Vec<Value>, String> {
    let mut out = Vec::with_capacity(specs.len());
    let mut head = 0usize;
    for (index, spec) in specs.iter().enumerate() {
        let field = format!("value[{index}]");
        if is_dynamic_type(spec) {
            let offset = usize_word(frame, head, &field)?;
            out.push(decode_dynamic(spec, frame, offset, &field)?);
            head = head.saturating_add(32);
        } else {
            let words = static_word_size(spec).unwrap_or(1);
            out.push(decode_static(spec, frame, head, &field)?);
            head = head.saturating_add(words.saturating_mul(32));
        }
    }
    Ok(out)
}

fn decode_static(
    spec: &AbiTypeSpec,
    frame: &[u8],
    offset: usize,
    field: &str,
) -> Result<Value, String> {
    if let Some((element_kind, Some(array_len))) = split_array_type(spec.kind.trim()) {
        let element = AbiTypeSpec {
            kind: element_kind,
            components: spec.components.clone(),
        };
        let element_words = static_word_size(&element).unwrap_or(1);
        let mut items = Vec::with_capacity(array_len);
        for idx in 0..array_len {
            items.push(decode_static(
                &element,
                frame,
                offset.saturating_add(idx.saturating_mul(element_words.saturating_mul(32))),
                &format!("{field}[{idx}]"),
            )?);
        }
        return Ok(Value::Array(items));
    }

    let kind = spec.kind.trim().to_ascii_lowercase();
    if kind == "tuple" {
        let mut items = Vec::with_capacity(spec.components.len());
        let mut cursor = offset;
        for (idx, component) in spec.components.iter().enumerate() {
            items.push(decode_static(
                component,
                frame,
                cursor,
                &format!("{field}.{idx}"),
            )?);
            let words = static_word_size(component).unwrap_or(1);
            cursor = cursor.saturating_add(words.saturating_mul(32));
        }
        return Ok(Value::Array(items));
    }

    let word = word_at(frame, offset, field)?;
    decode_primitive_word(&kind, word, field)
}

fn decode_dynamic(
    spec: &AbiTypeSpec,
    frame: &[u8],
    offset: usize,
    field: &str,
) -> Result<Value, String> {
    if let Some((element_kind, maybe_len)) = split_array_type(spec.kind.trim()) {
        let element = AbiTypeSpec {
            kind: element_kind,
            components: spec.components.clone(),
        };
        let (length, elements_frame) = match maybe_len {
            // T[]: length word, then a standard frame of `length` elements.
            None => {
                let length = usize_word(frame, offset, field)?;
                let start = offset.saturating_add(32);
                (length, slice_from(frame, start, field)?)
            }
            // T[n] lands here only when T itself is dynamic.
            Some(length) => (length, slice_from(frame, offset, field)?),
        };
        if length > elements_frame.len() / 32 {
            return Err(format!(
                "{field} declares {length} elements but only {} bytes remain",
                elements_frame.len()
            ));
        }
        let element_specs = vec![element; length];
        return decode_values(&element_specs, elements_frame).map(Value::Array);
    }

    let kind = spec.kind.trim().to_ascii_lowercase();
    match kind.as_str() {
        "tuple" => {
            let inner = slice_from(frame, offset, field)?;
            decode_values(&spec.components, inner).map(Value::Array)
        }
        "bytes" => {
            let bytes = length_prefixed_bytes(frame, offset, field)?;
            Ok(Value::String(format!("0x{}", hex::encode(bytes))))
        }
        "string" => {
            let bytes = length_prefixed_bytes(frame, offset, field)?;
            String::from_utf8(bytes.to_vec())
                .map(Value::String)
                .map_err(|error| format!("{field} is not valid utf-8: {error}"))
        }
        other => Err(format!("unsupported dynamic abi type: {other}")),
    }
}

fn decode_primitive_word(kind: &str, word: &[u8], field: &str) -> Result<Value, String> {
    match kind {
        "address" => {
            if word[..12].iter().any(|byte| *byte != 0) {
                return Err(format!("{field} address word has dirty upper bytes"));
            }
            Ok(Value::String(format!("0x{}", hex::encode(&word[12..]))))
        }
        "bool" => match word[31] {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(format!("{field} bool word holds {other}")),
        },
        _ if kind.starts_with("uint") || kind.starts_with("int") => {
            Ok(Value::String(U256::from_be_slice(word).to_string()))
        }
        _ if kind.starts_with("bytes") => {
            let width = kind
                .trim_start_matches("bytes")
                .parse::<usize>()
                .map_err(|_| format!("unsupported abi type: {kind}"))?;
            if !(1..=32).contains(&width) {
                return Err(format!("fixed bytes width must be in 1..=32, got {width}"));
            }
            Ok(Value::String(format!("0x{}", hex::encode(&word[..width]))))
        }
        other => Err(format!("unsupported abi primitive type: {other}")),
    }
}

fn word_at<'a>(frame: &'a [u8], offset: usize, field: &str) -> Result<&'a [u8], String> {
    frame
        .get(offset..offset.saturating_add(32))
        .ok_or_else(|| format!("{field} word at offset {offset} is out of bounds"))
}

fn usize_word(frame: &[u8], offset: usize, field: &str) -> Result<usize, String> {
    let word = word_at(frame, offset, field)?;
    let value = U256::from_be_slice(word);
    usize::try_from(value)
        .map_err(|_| format!("{field} offset/length word {value} exceeds usize"))
}

fn slice_from<'a>(frame: &'a [u8], start: usize, field: &str) -> Result<&'a [u8], String> {
    frame
        .get(start..)
        .ok_or_else(|| format!("{field} frame starting at {start} is out of bounds"))
}

fn length_prefixed_bytes<'a>(
    frame: &'a [u8],
    offset: usize,
    field: &str,
) -> Result<&'a [u8], String> {
    let length = usize_word(frame, offset, field)?;
    let start = offset.saturating_add(32);
    frame
        .get(start..start.saturating_add(length))
        .ok_or_else(|| format!("{field} payload of {length} bytes is out of bounds"))
}

// ── Typed extraction helpers ────────────────────────────────────────────────

pub fn as_u256(value: &Value, field: &str) -> Result<U256, String> {
    parse_u256(value, field)
}

pub fn as_u64(value: &Value, field: &str) -> Result<u64, String> {
    let wide = parse_u256(value, field)?;
    u64::try_from(wide).map_err(|_| format!("{field} value {wide} exceeds u64"))
}

pub fn as_u32(value: &Value, field: &str) -> Result<u32, String> {
    let wide = parse_u256(value, field)?;
    u32::try_from(wide).map_err(|_| format!("{field} value {wide} exceeds u32"))
}

pub fn as_address(value: &Value, field: &str) -> Result<Address, String> {
    crate::abi::encode::parse_address(value, field)
}

pub fn as_b256(value: &Value, field: &str) -> Result<B256, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("{field} must be a hex string"))?;
    raw.trim()
        .parse::<B256>()
        .map_err(|error| format!("failed to parse {field} as bytes32: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::encode::encode_values;
    use serde_json::json;

    fn spec(kind: &str) -> AbiTypeSpec {
        AbiTypeSpec::plain(kind)
    }

    #[test]
    fn round_trips_static_values() {
        let specs = [spec("uint256"), spec("address"), spec("bool")];
        let values = [
            json!("123456789012345678901234567890"),
            json!("0x9338b5153ae39bb89f50468e608ed9d764b755fd"),
            json!(true),
        ];
        let encoded = encode_values(&specs, &values).expect("should encode");
        let decoded = decode_values(&specs, &encoded).expect("should decode");
        assert_eq!(decoded.as_slice(), values.as_slice());
    }

    #[test]
    fn round_trips_dynamic_arrays_and_bytes() {
        let specs = [spec("uint256[]"), spec("bytes"), spec("string")];
        let values = [
            json!(["1", "2", "3"]),
            json!("0xdeadbeef"),
            json!("agent says hi"),
        ];
        let encoded = encode_values(&specs, &values).expect("should encode");
        let decoded = decode_values(&specs, &encoded).expect("should decode");
        assert_eq!(decoded.as_slice(), values.as_slice());
    }

    #[test]
    fn round_trips_tuple_array() {
        let agent_params = AbiTypeSpec {
            kind: "tuple[]".to_string(),
            components: vec![spec("uint32"), spec("uint96")],
        };
        let specs = [spec("uint256"), agent_params];
        let values = [
            json!("7"),
            json!([["1", "50000000000000000000"], ["1", "50000000000000000000"]]),
        ];
        let encoded = encode_values(&specs, &values).expect("should encode");
        let decoded = decode_values(&specs, &encoded).expect("should decode");
        assert_eq!(decoded.as_slice(), values.as_slice());
    }

    #[test]
    fn truncated_frame_is_an_error_not_a_panic() {
        let error =
            decode_values(&[spec("uint256")], &[0u8; 16]).expect_err("short frame must fail");
        assert!(error.contains("out of bounds"), "got {error}");
    }

    #[test]
    fn oversized_length_word_is_rejected() {
        // offset -> 32, length word claims usize::MAX elements
        let mut frame = Vec::new();
        frame.extend_from_slice(&crate::abi::encode::u256_word(U256::from(32u64)));
        frame.extend_from_slice(&crate::abi::encode::u256_word(U256::MAX));
        let error = decode_values(&[spec("uint256[]")], &frame)
            .expect_err("absurd length word must fail");
        assert!(
            error.contains("exceeds usize") || error.contains("elements"),
            "got {error}"
        );
    }

    #[test]
    fn bool_word_with_garbage_is_rejected() {
        let mut frame = vec![0u8; 32];
        frame[31] = 7;
        let error = decode_values(&[spec("bool")], &frame).expect_err("garbage bool must fail");
        assert!(error.contains("bool word"), "got {error}");
    }
}
