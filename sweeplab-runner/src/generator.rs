//! Parameter Generator — enumerate or sample parameter sets with stable ids.
//!
//! Grid mode walks the cartesian product of per-field domains in the
//! strategy's canonical field order (first field varies slowest) and keeps the
//! first `count` combinations. Identifiers are unsalted content hashes, so a
//! grid is reproducible.
//!
//! Random mode draws `count` independent uniform samples per field and salts
//! each identifier with the generation timestamp. Duplicate draws within one
//! batch are redrawn up to a bounded number of attempts.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{
    FieldMap, ParamError, ParamId, ParameterSet, StrategyKind, StrategyParams,
};
use sweeplab_core::fingerprint::param_id;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_COUNT: usize = 100;

/// Redraw budget per requested sample in random mode.
const REDRAWS_PER_SAMPLE: usize = 20;

/// Candidate values for one field.
///
/// In TOML: `upper = [70, 80]` or `period = { min = 5, max = 30 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDomain {
    Values(Vec<f64>),
    Range { min: f64, max: f64 },
}

impl FieldDomain {
    pub fn range(min: f64, max: f64) -> Self {
        Self::Range { min, max }
    }

    /// Finite candidate list for grid enumeration. Ranges expand to every
    /// integer in `[min, max]` for period fields only.
    fn discrete(&self, field: &str, is_period: bool) -> Result<Vec<f64>, GeneratorError> {
        let values = match self {
            Self::Values(values) => {
                let mut unique: Vec<f64> = Vec::with_capacity(values.len());
                for &v in values {
                    if !unique.iter().any(|u| *u == v) {
                        unique.push(v);
                    }
                }
                unique
            }
            Self::Range { min, max } => {
                check_range(field, *min, *max)?;
                if !is_period {
                    return Err(GeneratorError::NotDiscrete {
                        field: field.to_string(),
                    });
                }
                let lo = min.ceil() as i64;
                let hi = max.floor() as i64;
                (lo..=hi).map(|v| v as f64).collect()
            }
        };
        if values.is_empty() {
            return Err(GeneratorError::EmptyDomain {
                field: field.to_string(),
            });
        }
        Ok(values)
    }

    fn sample<R: Rng>(&self, field: &str, is_period: bool, rng: &mut R) -> Result<f64, GeneratorError> {
        match self {
            Self::Values(values) => {
                if values.is_empty() {
                    return Err(GeneratorError::EmptyDomain {
                        field: field.to_string(),
                    });
                }
                Ok(values[rng.gen_range(0..values.len())])
            }
            Self::Range { min, max } => {
                check_range(field, *min, *max)?;
                if is_period {
                    let lo = min.ceil() as i64;
                    let hi = max.floor() as i64;
                    if lo > hi {
                        return Err(GeneratorError::EmptyDomain {
                            field: field.to_string(),
                        });
                    }
                    Ok(rng.gen_range(lo..=hi) as f64)
                } else {
                    Ok(rng.gen_range(*min..=*max))
                }
            }
        }
    }
}

fn check_range(field: &str, min: f64, max: f64) -> Result<(), GeneratorError> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(GeneratorError::InvalidRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Grid,
    Random,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no domain given for field '{field}'")]
    MissingDomain { field: String },

    #[error("domain for field '{field}' is empty")]
    EmptyDomain { field: String },

    #[error("field '{field}' has a continuous range; grid mode needs explicit values")]
    NotDiscrete { field: String },

    #[error("invalid range for field '{field}': [{min}, {max}]")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Everything needed to generate one batch for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub strategy: StrategyKind,
    pub domains: BTreeMap<String, FieldDomain>,
    /// 0 keeps every grid combination.
    pub count: usize,
    pub mode: GenerationMode,
    /// Random mode only; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl GeneratorSpec {
    /// Built-in domains for a strategy kind.
    pub fn default_for(strategy: StrategyKind) -> Self {
        let mut domains = BTreeMap::new();
        match strategy {
            StrategyKind::Rsi => {
                domains.insert("period".into(), FieldDomain::range(5.0, 30.0));
                domains.insert("upper".into(), FieldDomain::Values(vec![70.0, 80.0]));
                domains.insert("lower".into(), FieldDomain::Values(vec![20.0, 30.0]));
            }
            StrategyKind::Cross => {
                domains.insert("fast_period".into(), FieldDomain::range(5.0, 20.0));
                domains.insert("slow_period".into(), FieldDomain::range(20.0, 60.0));
            }
        }
        Self {
            strategy,
            domains,
            count: DEFAULT_COUNT,
            mode: GenerationMode::Grid,
            seed: None,
        }
    }

    fn domain(&self, field: &str) -> Result<&FieldDomain, GeneratorError> {
        self.domains
            .get(field)
            .ok_or_else(|| GeneratorError::MissingDomain {
                field: field.to_string(),
            })
    }
}

/// Generated parameter sets: ordered list plus id lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBatch {
    pub sets: Vec<ParameterSet>,
    pub by_id: BTreeMap<ParamId, ParameterSet>,
}

impl ParamBatch {
    fn push(&mut self, set: ParameterSet) -> bool {
        if self.by_id.contains_key(&set.id) {
            return false;
        }
        self.by_id.insert(set.id.clone(), set.clone());
        self.sets.push(set);
        true
    }

    pub fn get(&self, id: &ParamId) -> Option<&ParameterSet> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Enumerate the grid in canonical field order and keep the first `count`.
pub fn generate_grid(spec: &GeneratorSpec) -> Result<ParamBatch, GeneratorError> {
    let kind = spec.strategy;
    let fields = kind.field_names();
    let axes = fields
        .iter()
        .map(|f| spec.domain(f)?.discrete(f, kind.is_period_field(f)))
        .collect::<Result<Vec<_>, _>>()?;

    let total: usize = axes.iter().map(Vec::len).product();
    let limit = if spec.count == 0 {
        total
    } else {
        spec.count.min(total)
    };

    let mut batch = ParamBatch::default();
    // Mixed-radix counter; the last field varies fastest.
    let mut index = vec![0usize; axes.len()];
    for _ in 0..total {
        if batch.len() >= limit {
            break;
        }
        let map: FieldMap = fields
            .iter()
            .zip(&axes)
            .zip(&index)
            .map(|((f, axis), &i)| (f.to_string(), axis[i]))
            .collect();
        let params = StrategyParams::from_fields(kind, &map)?;
        let id = param_id(kind, &map, None);
        if !batch.push(ParameterSet::new(id, params)) {
            debug!(strategy = %kind, "duplicate grid combination skipped");
        }

        for pos in (0..index.len()).rev() {
            index[pos] += 1;
            if index[pos] < axes[pos].len() {
                break;
            }
            index[pos] = 0;
        }
    }
    Ok(batch)
}

/// Draw `count` samples with ids salted by `salt`.
pub fn generate_random<R: Rng>(
    spec: &GeneratorSpec,
    rng: &mut R,
    salt: &str,
) -> Result<ParamBatch, GeneratorError> {
    let kind = spec.strategy;
    let fields = kind.field_names();
    let domains = fields
        .iter()
        .map(|f| spec.domain(f))
        .collect::<Result<Vec<_>, _>>()?;

    let count = if spec.count == 0 { DEFAULT_COUNT } else { spec.count };
    let budget = count * REDRAWS_PER_SAMPLE;
    let mut batch = ParamBatch::default();
    let mut draws = 0;
    while batch.len() < count && draws < budget {
        draws += 1;
        let mut map = FieldMap::new();
        for (f, domain) in fields.iter().zip(&domains) {
            map.insert(f.to_string(), domain.sample(f, kind.is_period_field(f), rng)?);
        }
        let params = StrategyParams::from_fields(kind, &map)?;
        let id = param_id(kind, &map, Some(salt));
        batch.push(ParameterSet::new(id, params));
    }
    if batch.len() < count {
        warn!(
            strategy = %kind,
            requested = count,
            produced = batch.len(),
            "sample space exhausted before reaching requested count"
        );
    }
    Ok(batch)
}

/// Per-symbol RNG: hash-derived from the master seed so symbols never share draws.
pub fn symbol_rng(seed: Option<u64>, symbol: &str) -> StdRng {
    match seed {
        Some(master) => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&master.to_le_bytes());
            hasher.update(symbol.as_bytes());
            let hash = hasher.finalize();
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash.as_bytes()[..8]);
            StdRng::seed_from_u64(u64::from_le_bytes(bytes))
        }
        None => StdRng::from_entropy(),
    }
}

/// Generate the batch for one symbol according to `spec.mode`.
pub fn generate_for_symbol(
    spec: &GeneratorSpec,
    symbol: &str,
    salt: &str,
) -> Result<ParamBatch, GeneratorError> {
    match spec.mode {
        GenerationMode::Grid => generate_grid(spec),
        GenerationMode::Random => {
            let mut rng = symbol_rng(spec.seed, symbol);
            generate_random(spec, &mut rng, salt)
        }
    }
}
