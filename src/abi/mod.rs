//! Solidity ABI substrate: interface descriptions, head/tail encoding of
//! JSON-typed arguments, and word-level decoding of return data, event
//! payloads, and error arguments.

pub mod decode;
pub mod encode;
pub mod interface;

pub use interface::{
    canonical_signature, canonical_type, event_topic, selector, AbiErrorSpec, AbiEventSpec,
    AbiFunctionSpec, AbiParam, AbiTypeSpec, ContractInterface,
};

/// Split `kind` into its element type and array length (`None` for a
/// dynamic `[]` suffix) when it carries an array suffix.
pub(crate) fn split_array_type(kind: &str) -> Option<(String, Option<usize>)> {
    if !kind.ends_with(']') {
        return None;
    }
    let start = kind.rfind('[')?;
    let base = kind[..start].to_string();
    let len_raw = &kind[start + 1..kind.len().saturating_sub(1)];
    if len_raw.is_empty() {
        return Some((base, None));
    }
    len_raw.parse::<usize>().ok().map(|len| (base, Some(len)))
}

pub(crate) fn is_dynamic_type(spec: &AbiTypeSpec) -> bool {
    static_word_size(spec).is_none()
}

/// Head-section word count for a static type; `None` when the type is
/// dynamic (unbounded arrays, `bytes`, `string`, or any composite holding
/// one).
pub(crate) fn static_word_size(spec: &AbiTypeSpec) -> Option<usize> {
    if let Some((element_kind, maybe_len)) = split_array_type(spec.kind.trim()) {
        let array_len = maybe_len?;
        let element = AbiTypeSpec {
            kind: element_kind,
            components: spec.components.clone(),
        };
        return static_word_size(&element).map(|words| words.saturating_mul(array_len));
    }

    let kind = spec.kind.trim().to_ascii_lowercase();
    if kind == "string" || kind == "bytes" {
        return None;
    }
    if kind == "tuple" {
        let mut words = 0usize;
        for component in &spec.components {
            words = words.saturating_add(static_word_size(component)?);
        }
        return Some(words);
    }
    Some(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_array_type_handles_fixed_and_dynamic_suffixes() {
        assert_eq!(
            split_array_type("uint256[]"),
            Some(("uint256".to_string(), None))
        );
        assert_eq!(
            split_array_type("address[3]"),
            Some(("address".to_string(), Some(3)))
        );
        assert_eq!(split_array_type("bytes32"), None);
    }

    #[test]
    fn static_word_size_accounts_for_nested_composites() {
        let static_pair = AbiTypeSpec {
            kind: "tuple".to_string(),
            components: vec![AbiTypeSpec::plain("uint256"), AbiTypeSpec::plain("address")],
        };
        assert_eq!(static_word_size(&static_pair), Some(2));

        let fixed_array = AbiTypeSpec {
            kind: "tuple[2]".to_string(),
            components: vec![AbiTypeSpec::plain("uint256"), AbiTypeSpec::plain("address")],
        };
        assert_eq!(static_word_size(&fixed_array), Some(4));

        let dynamic = AbiTypeSpec {
            kind: "tuple".to_string(),
            components: vec![AbiTypeSpec::plain("uint256"), AbiTypeSpec::plain("bytes")],
        };
        assert_eq!(static_word_size(&dynamic), None);
    }
}
