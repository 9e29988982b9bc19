//! Memory-aware batch sizing for ensemble prediction.
//!
//! Forest prediction materialises one leaf vector per tree per row before
//! averaging, so peak memory grows with `n_rows * n_estimators * n_outputs`.
//! The heuristic below caps a batch so that product fits in a budget derived
//! from free system memory.

use sysinfo::System;
use thicket_trees::Task;
use tracing::debug;

use crate::model::Model;

/// Smallest batch the heuristic ever returns.
pub const MIN_BATCH_SIZE: usize = 10;

/// Bytes charged per leaf value in the per-row estimate.
const BYTES_PER_VALUE: u64 = 16;

/// Free memory is never assumed below this, in bytes.
const FREE_MEMORY_FLOOR: u64 = 2_000_000_000;

/// The prediction budget is never below this, in bytes.
const BUDGET_FLOOR: u64 = 80_000_000_000;

/// What a model costs per predicted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Trees in the ensemble.
    pub n_estimators: usize,
    /// Prediction width: class count, or 1 for regression.
    pub n_outputs: usize,
    /// Task of the model.
    pub task: Task,
}

impl Footprint {
    /// Estimated bytes held per row while predicting.
    #[must_use]
    pub fn bytes_per_row(&self) -> u64 {
        let per_tree = match self.task {
            Task::Classification => self.n_outputs.max(1) as u64,
            Task::Regression => 1,
        };
        (self.n_estimators.max(1) as u64)
            .saturating_mul(per_tree)
            .saturating_mul(BYTES_PER_VALUE)
    }
}

/// Rows per batch for a model with `footprint` given `free_memory` bytes.
///
/// Returns 0 when one batch would cover all `n_rows`, meaning "predict in a
/// single pass". Otherwise the result is at least [`MIN_BATCH_SIZE`].
#[must_use]
pub fn forest_batch_size(footprint: Footprint, n_rows: usize, free_memory: u64) -> usize {
    let free = free_memory.max(FREE_MEMORY_FLOOR);
    let budget = (free / 2).max(BUDGET_FLOOR);
    let per_row = footprint.bytes_per_row();
    let rows = (budget - 1) / per_row + 1;
    let batch = usize::try_from(rows).unwrap_or(usize::MAX).max(MIN_BATCH_SIZE);
    if batch >= n_rows { 0 } else { batch }
}

/// Free system memory in bytes.
#[must_use]
pub fn free_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.free_memory()
}

/// Batch size for `model` over `n_rows`, or 0 for a single pass.
pub(crate) fn default_batch_size(model: &dyn Model, n_rows: usize) -> usize {
    let Some(footprint) = model.footprint() else {
        return 0;
    };
    let free = free_memory();
    let batch = forest_batch_size(footprint, n_rows, free);
    debug!(
        free_memory = free,
        bytes_per_row = footprint.bytes_per_row(),
        n_rows,
        batch,
        "computed default batch size"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(n_estimators: usize, n_outputs: usize) -> Footprint {
        Footprint {
            n_estimators,
            n_outputs,
            task: Task::Classification,
        }
    }

    #[test]
    fn small_inputs_predict_in_one_pass() {
        assert_eq!(forest_batch_size(classifier(500, 10), 100_000, 16_000_000_000), 0);
    }

    #[test]
    fn budget_limits_batch() {
        // 1e6 trees * 10 classes * 16 B = 1.6e8 B per row; 8e10 / 1.6e8 = 500 rows.
        assert_eq!(forest_batch_size(classifier(1_000_000, 10), 1_000, 1_000_000_000), 500);
    }

    #[test]
    fn plentiful_memory_raises_budget() {
        // Half of 4e11 is 2e11, enough for 1250 rows of 1.6e8 B.
        assert_eq!(forest_batch_size(classifier(1_000_000, 10), 1_000, 400_000_000_000), 0);
        assert_eq!(forest_batch_size(classifier(1_000_000, 10), 2_000, 400_000_000_000), 1_250);
    }

    #[test]
    fn batch_never_below_floor() {
        let huge = classifier(usize::MAX / 32, 1_000);
        assert_eq!(forest_batch_size(huge, 1_000_000, 0), MIN_BATCH_SIZE);
    }

    #[test]
    fn floor_above_row_count_means_single_pass() {
        let huge = classifier(usize::MAX / 32, 1_000);
        assert_eq!(forest_batch_size(huge, MIN_BATCH_SIZE, 0), 0);
        assert_eq!(forest_batch_size(huge, 5, 0), 0);
    }

    #[test]
    fn regression_ignores_output_width() {
        let reg = Footprint {
            n_estimators: 1_000_000,
            n_outputs: 10,
            task: Task::Regression,
        };
        assert_eq!(reg.bytes_per_row(), 16_000_000);
        assert_eq!(forest_batch_size(reg, 10_000, 0), 5_000);
    }
}
