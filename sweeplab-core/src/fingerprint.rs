//! Parameter fingerprinting — deterministic identifiers for parameter sets.
//!
//! An identifier is `{KIND}_{hash}` where `hash` is the first 12 hex chars of a
//! BLAKE3 digest over the canonical JSON of the field map (BTreeMap → sorted
//! keys). An optional salt (a generation timestamp) is hashed in as well, so
//! sampled batches get fresh identifiers on every run while grid batches stay
//! reproducible.

use serde::Serialize;

use crate::domain::{FieldMap, ParamId, StrategyKind};

const HASH_LEN: usize = 12;

#[derive(Serialize)]
struct Canonical<'a> {
    strategy: &'a str,
    fields: &'a FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    salt: Option<&'a str>,
}

/// Identifier for a field map of the given kind.
pub fn param_id(kind: StrategyKind, fields: &FieldMap, salt: Option<&str>) -> ParamId {
    let canonical = Canonical {
        strategy: kind.as_str(),
        fields,
        salt,
    };
    // A struct of a str and a map of finite floats always serializes;
    // non-finite floats become `null`, which still hashes deterministically.
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    let digest = blake3::hash(json.as_bytes()).to_hex();
    ParamId::new(format!("{}_{}", kind.as_str(), &digest[..HASH_LEN]))
}
