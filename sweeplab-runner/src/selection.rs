//! Strategy Selector — threshold filtering, ranking, and promotion.
//!
//! Ranking is a stable sort on one metric, so ties keep table order. `NaN`
//! metrics always sort after every real value, whatever the direction.
//! Drawdown ranks by magnitude: "ascending" puts the drawdown closest to zero
//! first.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{ParamId, ParameterSet};

use crate::performance::PerformanceRecord;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankField {
    TotalReturn,
    MaxDrawdown,
    #[default]
    Sharpe,
}

impl RankField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalReturn => "total_return",
            Self::MaxDrawdown => "max_drawdown",
            Self::Sharpe => "sharpe",
        }
    }

    pub fn default_direction(&self) -> SortDirection {
        match self {
            Self::TotalReturn | Self::Sharpe => SortDirection::Descending,
            Self::MaxDrawdown => SortDirection::Ascending,
        }
    }

    fn key(&self, record: &PerformanceRecord) -> f64 {
        match self {
            Self::TotalReturn => record.total_return,
            Self::MaxDrawdown => record.max_drawdown.abs(),
            Self::Sharpe => record.sharpe,
        }
    }
}

impl fmt::Display for RankField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total_return" => Ok(Self::TotalReturn),
            "max_drawdown" => Ok(Self::MaxDrawdown),
            "sharpe" | "sharpe_ratio" => Ok(Self::Sharpe),
            other => Err(format!(
                "unknown rank field '{other}' (expected total_return, max_drawdown or sharpe)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        })
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

/// Hard filters applied before ranking. A `NaN` metric fails any threshold set on it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_sharpe: Option<f64>,
    /// Largest allowed drawdown magnitude, e.g. `0.2` for 20%.
    pub max_drawdown: Option<f64>,
    pub min_total_return: Option<f64>,
}

impl Thresholds {
    pub fn passes(&self, r: &PerformanceRecord) -> bool {
        let sharpe_ok = self.min_sharpe.map_or(true, |min| r.sharpe >= min);
        let dd_ok = self
            .max_drawdown
            .map_or(true, |max| r.max_drawdown.abs() <= max.abs());
        let ret_ok = self
            .min_total_return
            .map_or(true, |min| r.total_return >= min);
        sharpe_ok && dd_ok && ret_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub rank_field: RankField,
    /// `None` uses the field's default direction.
    pub direction: Option<SortDirection>,
    pub top_n: usize,
    pub thresholds: Thresholds,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            rank_field: RankField::default(),
            direction: None,
            top_n: DEFAULT_TOP_N,
            thresholds: Thresholds::default(),
        }
    }
}

impl SelectionCriteria {
    pub fn direction(&self) -> SortDirection {
        self.direction
            .unwrap_or_else(|| self.rank_field.default_direction())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub rank_field: RankField,
    pub direction: SortDirection,
    pub top_n: usize,
    /// Rows that passed the thresholds, before truncation.
    pub eligible: usize,
    pub records: Vec<PerformanceRecord>,
}

impl SelectionResult {
    pub fn ids(&self) -> Vec<ParamId> {
        self.records.iter().map(|r| r.param_id.clone()).collect()
    }
}

/// Filter, stable-sort, and keep the top N.
pub fn select(records: &[PerformanceRecord], criteria: &SelectionCriteria) -> SelectionResult {
    let direction = criteria.direction();
    let field = criteria.rank_field;

    let mut kept: Vec<PerformanceRecord> = records
        .iter()
        .filter(|r| criteria.thresholds.passes(r))
        .cloned()
        .collect();
    let eligible = kept.len();

    kept.sort_by(|a, b| compare(field.key(a), field.key(b), direction));
    kept.truncate(criteria.top_n);

    SelectionResult {
        rank_field: field,
        direction,
        top_n: criteria.top_n,
        eligible,
        records: kept,
    }
}

fn compare(a: f64, b: f64, direction: SortDirection) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
    }
}

/// Full definitions of the selected sets, in parameter-log order.
pub fn promote(selection: &SelectionResult, log: &[ParameterSet]) -> Vec<ParameterSet> {
    let wanted: HashSet<&ParamId> = selection.records.iter().map(|r| &r.param_id).collect();
    log.iter()
        .filter(|set| wanted.contains(&set.id))
        .cloned()
        .collect()
}
