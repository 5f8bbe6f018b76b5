//! Tagged parameter sets — one variant per strategy kind.
//!
//! A `ParameterSet` is immutable once generated: an identifier plus typed
//! fields. The generic `FieldMap` form exists only at the edges (generation
//! from per-field domains, decoding persisted records) and is validated into
//! the typed variant immediately.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::ParamId;

/// Named numeric fields of a parameter set, in deterministic key order.
pub type FieldMap = BTreeMap<String, f64>;

/// Strategy kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "RSI")]
    Rsi,
    #[serde(rename = "CROSS")]
    Cross,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::Rsi, StrategyKind::Cross];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsi => "RSI",
            Self::Cross => "CROSS",
        }
    }

    /// Canonical field order. Grid enumeration walks fields in this order.
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            Self::Rsi => &["period", "upper", "lower"],
            Self::Cross => &["fast_period", "slow_period"],
        }
    }

    /// Whether a field holds a lookback length (positive integer).
    pub fn is_period_field(&self, field: &str) -> bool {
        field.ends_with("period")
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RSI" => Ok(Self::Rsi),
            "CROSS" => Ok(Self::Cross),
            other => Err(ParamError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Errors for parameter records that cannot become a typed `ParameterSet`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown strategy kind '{0}'")]
    UnknownStrategy(String),

    #[error("{kind} parameter record is missing field '{field}'")]
    MissingField { kind: StrategyKind, field: String },

    #[error("invalid value {value} for field '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: f64,
        reason: &'static str,
    },

    #[error("parameter record is missing its 'id'")]
    MissingId,

    #[error("parameter record '{id}' is tagged {found}, expected {expected}")]
    KindMismatch {
        id: String,
        expected: StrategyKind,
        found: String,
    },

    #[error("parameter record is not an object")]
    NotAnObject,
}

/// Longest lookback a period field may request, in bars.
pub const MAX_PERIOD: usize = 10_000;

/// Typed fields per strategy kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy")]
pub enum StrategyParams {
    #[serde(rename = "RSI")]
    Rsi {
        period: usize,
        upper: f64,
        lower: f64,
    },
    #[serde(rename = "CROSS")]
    Cross {
        fast_period: usize,
        slow_period: usize,
    },
}

impl StrategyParams {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Rsi { .. } => StrategyKind::Rsi,
            Self::Cross { .. } => StrategyKind::Cross,
        }
    }

    /// Largest lookback across all period fields.
    pub fn max_period(&self) -> usize {
        match *self {
            Self::Rsi { period, .. } => period,
            Self::Cross {
                fast_period,
                slow_period,
            } => fast_period.max(slow_period),
        }
    }

    /// Observations needed before a signal can be evaluated.
    pub fn required_history(&self) -> usize {
        self.max_period().saturating_add(1)
    }

    pub fn fields(&self) -> FieldMap {
        let mut map = FieldMap::new();
        match *self {
            Self::Rsi {
                period,
                upper,
                lower,
            } => {
                map.insert("period".into(), period as f64);
                map.insert("upper".into(), upper);
                map.insert("lower".into(), lower);
            }
            Self::Cross {
                fast_period,
                slow_period,
            } => {
                map.insert("fast_period".into(), fast_period as f64);
                map.insert("slow_period".into(), slow_period as f64);
            }
        }
        map
    }

    /// Validate a generic field map into the typed variant for `kind`.
    pub fn from_fields(kind: StrategyKind, fields: &FieldMap) -> Result<Self, ParamError> {
        match kind {
            StrategyKind::Rsi => Ok(Self::Rsi {
                period: period_field(kind, fields, "period")?,
                upper: real_field(kind, fields, "upper")?,
                lower: real_field(kind, fields, "lower")?,
            }),
            StrategyKind::Cross => Ok(Self::Cross {
                fast_period: period_field(kind, fields, "fast_period")?,
                slow_period: period_field(kind, fields, "slow_period")?,
            }),
        }
    }
}

fn real_field(kind: StrategyKind, fields: &FieldMap, name: &str) -> Result<f64, ParamError> {
    let value = *fields.get(name).ok_or_else(|| ParamError::MissingField {
        kind,
        field: name.to_string(),
    })?;
    if !value.is_finite() {
        return Err(ParamError::InvalidValue {
            field: name.to_string(),
            value,
            reason: "must be finite",
        });
    }
    Ok(value)
}

fn period_field(kind: StrategyKind, fields: &FieldMap, name: &str) -> Result<usize, ParamError> {
    let value = real_field(kind, fields, name)?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(ParamError::InvalidValue {
            field: name.to_string(),
            value,
            reason: "must be a positive integer",
        });
    }
    if value > MAX_PERIOD as f64 {
        return Err(ParamError::InvalidValue {
            field: name.to_string(),
            value,
            reason: "exceeds the longest supported lookback",
        });
    }
    Ok(value as usize)
}

/// One parameter combination with its identifier.
///
/// Serializes as a flat record: `{"id": ..., "strategy": "RSI", "period": 14, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub id: ParamId,
    #[serde(flatten)]
    pub params: StrategyParams,
}

impl ParameterSet {
    pub fn new(id: ParamId, params: StrategyParams) -> Self {
        Self { id, params }
    }

    pub fn kind(&self) -> StrategyKind {
        self.params.kind()
    }

    /// Decode one persisted parameter-log record for `kind`.
    ///
    /// Records may omit the `strategy` tag (the log is already scoped per
    /// kind); if present it must match. Numeric fields may be integers or floats.
    pub fn from_record(kind: StrategyKind, record: &serde_json::Value) -> Result<Self, ParamError> {
        let obj = record.as_object().ok_or(ParamError::NotAnObject)?;
        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(ParamError::MissingId)?;

        if let Some(tag) = obj.get("strategy").and_then(|v| v.as_str()) {
            if tag.parse::<StrategyKind>().ok() != Some(kind) {
                return Err(ParamError::KindMismatch {
                    id: id.to_string(),
                    expected: kind,
                    found: tag.to_string(),
                });
            }
        }

        let fields: FieldMap = kind
            .field_names()
            .iter()
            .filter_map(|name| {
                obj.get(*name)
                    .and_then(|v| v.as_f64())
                    .map(|v| (name.to_string(), v))
            })
            .collect();

        let params = StrategyParams::from_fields(kind, &fields)?;
        Ok(Self::new(ParamId::new(id), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("rsi".parse::<StrategyKind>().unwrap(), StrategyKind::Rsi);
        assert_eq!(" CROSS ".parse::<StrategyKind>().unwrap(), StrategyKind::Cross);
        assert!("MACD".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn from_fields_builds_rsi() {
        let mut fields = FieldMap::new();
        fields.insert("period".into(), 14.0);
        fields.insert("upper".into(), 70.0);
        fields.insert("lower".into(), 30.0);
        let params = StrategyParams::from_fields(StrategyKind::Rsi, &fields).unwrap();
        assert_eq!(
            params,
            StrategyParams::Rsi {
                period: 14,
                upper: 70.0,
                lower: 30.0
            }
        );
        assert_eq!(params.required_history(), 15);
    }

    #[test]
    fn from_fields_rejects_fractional_period() {
        let mut fields = FieldMap::new();
        fields.insert("fast_period".into(), 5.5);
        fields.insert("slow_period".into(), 20.0);
        let err = StrategyParams::from_fields(StrategyKind::Cross, &fields).unwrap_err();
        assert!(matches!(err, ParamError::InvalidValue { .. }));
    }

    #[test]
    fn from_fields_reports_missing_field() {
        let mut fields = FieldMap::new();
        fields.insert("fast_period".into(), 5.0);
        let err = StrategyParams::from_fields(StrategyKind::Cross, &fields).unwrap_err();
        assert_eq!(
            err,
            ParamError::MissingField {
                kind: StrategyKind::Cross,
                field: "slow_period".into()
            }
        );
    }

    #[test]
    fn serializes_as_flat_record() {
        let set = ParameterSet::new(
            ParamId::new("CROSS_1"),
            StrategyParams::Cross {
                fast_period: 5,
                slow_period: 20,
            },
        );
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            json!({"id": "CROSS_1", "strategy": "CROSS", "fast_period": 5, "slow_period": 20})
        );
        let back: ParameterSet = serde_json::from_value(value).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn from_record_accepts_float_periods_and_missing_tag() {
        let record = json!({"id": "RSI_a", "period": 14.0, "upper": 70, "lower": 30});
        let set = ParameterSet::from_record(StrategyKind::Rsi, &record).unwrap();
        assert_eq!(set.params.max_period(), 14);
    }

    #[test]
    fn from_record_rejects_oversized_periods() {
        let huge = serde_json::json!({"id": "RSI_big", "period": 1e300, "upper": 70, "lower": 30});
        assert!(matches!(
            ParameterSet::from_record(StrategyKind::Rsi, &huge),
            Err(ParamError::InvalidValue { ref field, .. }) if field == "period"
        ));

        let edge = serde_json::json!({"id": "CROSS_edge", "fast_period": 5, "slow_period": MAX_PERIOD});
        let set = ParameterSet::from_record(StrategyKind::Cross, &edge).unwrap();
        assert_eq!(set.params.required_history(), MAX_PERIOD + 1);
    }

    #[test]
    fn required_history_saturates() {
        let params = StrategyParams::Rsi {
            period: usize::MAX,
            upper: 70.0,
            lower: 30.0,
        };
        assert_eq!(params.required_history(), usize::MAX);
    }

    #[test]
    fn from_record_rejects_missing_fields() {
        let record = json!({"id": "RSI_a", "period": 14});
        let err = ParameterSet::from_record(StrategyKind::Rsi, &record).unwrap_err();
        assert!(matches!(err, ParamError::MissingField { .. }));
    }

    #[test]
    fn from_record_rejects_mismatched_tag() {
        let record = json!({"id": "x", "strategy": "CROSS", "period": 14, "upper": 70, "lower": 30});
        let err = ParameterSet::from_record(StrategyKind::Rsi, &record).unwrap_err();
        assert!(matches!(err, ParamError::KindMismatch { .. }));
    }

    #[test]
    fn from_record_requires_id() {
        let record = json!({"fast_period": 5, "slow_period": 20});
        assert_eq!(
            ParameterSet::from_record(StrategyKind::Cross, &record).unwrap_err(),
            ParamError::MissingId
        );
    }
}
