//! Recalculation reporting.
//!
//! Every evaluation pass fills a [`RecalcReport`]; the model logs its
//! [`RecalcReport::log_line`] at debug level after each dispatch.

use std::time::Instant;

use crate::cell_id::CellId;

/// Errors kept per report, beyond which only the count grows.
const MAX_REPORTED_ERRORS: usize = 100;

/// What triggered a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecalcMode {
    /// Only cells downstream of a change
    #[default]
    Incremental,
    /// Every formula in the workbook
    Full,
}

impl RecalcMode {
    fn label(&self) -> &'static str {
        match self {
            RecalcMode::Incremental => "incremental",
            RecalcMode::Full => "full",
        }
    }
}

/// An error value produced during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcError {
    pub cell: CellId,
    /// Error code, e.g. `#DIV/0`
    pub code: String,
}

/// Report from one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    pub mode: RecalcMode,

    /// Time taken by the pass in microseconds.
    pub duration_us: u64,

    /// Number of formula evaluations (a cell re-dirtied by a spread counts
    /// once per evaluation).
    pub cells_evaluated: usize,

    /// Number of cells that ended the pass with `#CYCLE`.
    pub cycle_cells: usize,

    /// Number of array formulas blocked with `#SPREAD`.
    pub spread_errors: usize,

    /// Deepest on-demand evaluation chain.
    pub max_depth: usize,

    /// Error values produced (truncated to the first 100).
    pub errors: Vec<RecalcError>,

    pub error_count: usize,
}

impl RecalcReport {
    pub fn new(mode: RecalcMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub(crate) fn record_error(&mut self, cell: CellId, code: &str) {
        self.error_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(RecalcError {
                cell,
                code: code.to_string(),
            });
        }
    }

    pub(crate) fn finish(&mut self, started: Instant) {
        self.duration_us = started.elapsed().as_micros() as u64;
    }

    /// Fold a later pass into this one (chunked recomputes).
    pub(crate) fn merge(&mut self, other: RecalcReport) {
        self.duration_us += other.duration_us;
        self.cells_evaluated += other.cells_evaluated;
        self.cycle_cells += other.cycle_cells;
        self.spread_errors += other.spread_errors;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.error_count += other.error_count;
        let room = MAX_REPORTED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(other.errors.into_iter().take(room));
    }

    /// Format as a concise one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}us, depth={}, cycles={}, spread={}",
            self.cells_evaluated, self.duration_us, self.max_depth, self.cycle_cells, self.spread_errors
        )
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[recalc/full] 1402us  628 cells  depth=7  cycles=0  spread=0  errors=0`
    pub fn log_line(&self) -> String {
        format!(
            "[recalc/{}] {}us  {} cells  depth={}  cycles={}  spread={}  errors={}",
            self.mode.label(),
            self.duration_us,
            self.cells_evaluated,
            self.max_depth,
            self.cycle_cells,
            self.spread_errors,
            self.error_count
        )
    }
}
