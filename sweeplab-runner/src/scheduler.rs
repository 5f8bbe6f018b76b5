//! Bounded task scheduler with per-unit failure collection.
//!
//! Units run on a rayon pool capped at `max_workers`. A unit that returns an
//! error, or panics, is recorded as a `UnitFailure`; its siblings keep
//! running. Successful outputs keep the input order.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MAX_WORKERS: usize = 3;

/// One unit that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: String,
    pub cause: String,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.cause)
    }
}

/// Outcome of one scheduled batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<T>,
    pub failures: Vec<UnitFailure>,
}

impl<T> BatchOutcome<T> {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScheduler {
    max_workers: usize,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl TaskScheduler {
    /// `max_workers` of 0 is treated as 1.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn sequential() -> Self {
        Self::new(1)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `work` over every unit; `label` names a unit in failure records.
    pub fn run<I, T, E, L, F>(&self, units: &[I], label: L, work: F) -> BatchOutcome<T>
    where
        I: Sync,
        T: Send,
        E: fmt::Display,
        L: Fn(&I) -> String + Sync,
        F: Fn(&I) -> Result<T, E> + Sync,
    {
        let attempt = |unit: &I| -> Result<T, UnitFailure> {
            match panic::catch_unwind(AssertUnwindSafe(|| work(unit))) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(UnitFailure {
                    unit: label(unit),
                    cause: e.to_string(),
                }),
                Err(payload) => Err(UnitFailure {
                    unit: label(unit),
                    cause: panic_message(payload.as_ref()),
                }),
            }
        };

        let results: Vec<Result<T, UnitFailure>> = if self.max_workers <= 1 || units.len() <= 1 {
            units.iter().map(attempt).collect()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
            {
                Ok(pool) => pool.install(|| units.par_iter().map(attempt).collect()),
                Err(e) => {
                    warn!(error = %e, "thread pool unavailable, running sequentially");
                    units.iter().map(attempt).collect()
                }
            }
        };

        let mut outcome = BatchOutcome {
            succeeded: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for result in results {
            match result {
                Ok(value) => outcome.succeeded.push(value),
                Err(failure) => {
                    warn!(unit = %failure.unit, cause = %failure.cause, "unit failed");
                    outcome.failures.push(failure);
                }
            }
        }
        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
