use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter set identifier (strategy prefix + content hash).
///
/// Unique within a (strategy kind, symbol, version) scope; joins signals,
/// performance rows, selections and accounts across stages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamId(pub String);

impl ParamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version (experiment run) identifier: a creation timestamp.
///
/// Lexicographic order equals creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_id_serializes_as_plain_string() {
        let id = ParamId::new("RSI_abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"RSI_abc123\"");
    }

    #[test]
    fn version_ids_order_by_timestamp() {
        let a = VersionId::new("20240101_090000");
        let b = VersionId::new("20240101_090001");
        let c = VersionId::new("20240101_090001_001");
        assert!(a < b);
        assert!(b < c);
    }
}
