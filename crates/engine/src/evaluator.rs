//! Formula evaluation.
//!
//! Cells move through `clean → dirty → evaluating → clean`. A change marks
//! its transitive dependents dirty (depth-first over the dependency graph
//! with a `visited` set); a pass then evaluates every dirty cell, pulling
//! dirty dependencies on demand. The stack of cells currently evaluating is
//! kept apart from the dirty set: meeting a cell that is already on the
//! stack is a cycle, meeting one that is merely clean is a diamond.
//!
//! Errors, cycles included, are stored as values. Array results spread
//! over the cells below and to the right of their formula unless something
//! is in the way, in which case the formula shows `#SPREAD`.

use std::cell::RefCell;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{Cell, CellContent};
use crate::cell_id::{CellId, SheetId};
use crate::dep_graph::DepGraph;
use crate::formula::compiler::{FormulaCell, FormulaContext};
use crate::formula::functions::FunctionRegistry;
use crate::formula::references::RangeRef;
use crate::formula::value::{Array2D, CellError, ErrorKind, EvalResult, Value};
use crate::recalc::{RecalcMode, RecalcReport};
use crate::services::ExternalDataCache;
use crate::spreading::SpreadingRelation;
use crate::workbook::Workbook;
use crate::zone::{to_xc, Zone};

/// A cell evaluated more often than this in one pass is treated as part of
/// a cycle. Only spreads feeding each other can get there.
const MAX_EVALUATIONS_PER_PASS: usize = 64;

/// What a pass reads from.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub workbook: &'a Workbook,
    pub functions: &'a FunctionRegistry,
    pub external: &'a ExternalDataCache,
}

#[derive(Debug, Default)]
struct EvalState {
    /// Results of formula cells and of the positions they spread over
    values: FxHashMap<CellId, Value>,
    dirty: FxHashSet<CellId>,
    spreading: SpreadingRelation,
}

/// Evaluated values and pending work.
#[derive(Debug, Default)]
pub struct Evaluator {
    state: RefCell<EvalState>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluated value of a position: formula result, literal, spread
    /// result or empty.
    pub fn value(&self, workbook: &Workbook, id: &CellId) -> Value {
        match workbook.cell(id) {
            Some(cell) if cell.is_formula() => self.stored(id),
            Some(cell) if !cell.text().is_empty() => literal_value(cell),
            _ => self.stored(id),
        }
    }

    fn stored(&self, id: &CellId) -> Value {
        self.state.borrow().values.get(id).cloned().unwrap_or_default()
    }

    /// Source formula spreading over `id`.
    pub fn spread_source(&self, id: &CellId) -> Option<CellId> {
        self.state.borrow().spreading.owner(id).cloned()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.state.borrow().dirty.is_empty()
    }

    /// Forget every value and mark all formulas dirty.
    pub fn reset(&self, workbook: &Workbook) {
        let mut state = self.state.borrow_mut();
        state.values.clear();
        state.spreading.clear();
        state.dirty = workbook.formula_cells().into_iter().collect();
    }

    /// Mark changed positions and everything downstream of them dirty.
    ///
    /// A changed position may also unblock or block a spread: sources
    /// waiting for it and the source currently spreading over it are
    /// re-dirtied too.
    pub fn mark_changed(&self, graph: &DepGraph, changed: &[CellId]) {
        let mut state = self.state.borrow_mut();
        let mut visited = FxHashSet::default();
        for id in changed {
            let mut roots = vec![id.clone()];
            roots.extend(state.spreading.blocked_by(id));
            roots.extend(state.spreading.owner(id).cloned());
            for root in roots {
                mark_dirty(graph, &mut state.dirty, &mut visited, root);
            }
        }
        log::trace!("marked {} cells dirty", visited.len());
    }

    /// Evaluate dirty cells, at most `limit` of them when given. Returns the
    /// report and the number of cells still dirty.
    pub fn evaluate(&self, env: EvalEnv<'_>, mode: RecalcMode, limit: Option<usize>) -> (RecalcReport, usize) {
        let pass = Pass::new(env, &self.state, mode);
        pass.run(limit);
        let report = pass.finish();
        (report, self.state.borrow().dirty.len())
    }

    /// Evaluate a formula that belongs to no cell, in the context of a sheet.
    pub fn evaluate_formula(&self, env: EvalEnv<'_>, sheet: &SheetId, formula: &FormulaCell) -> Value {
        let pass = Pass::new(env, &self.state, RecalcMode::Incremental);
        let ctx = CellContext {
            pass: &pass,
            sheet,
            cell: None,
            refs: &formula.dependencies,
        };
        let value = formula.compiled.execute(&ctx).into_scalar();
        if value.is_empty() {
            Value::Number(0.0)
        } else {
            value
        }
    }
}

fn mark_dirty(graph: &DepGraph, dirty: &mut FxHashSet<CellId>, visited: &mut FxHashSet<CellId>, root: CellId) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        stack.extend(graph.dependents(&id));
        dirty.insert(id);
    }
}

fn literal_value(cell: &Cell) -> Value {
    match &cell.content {
        CellContent::Literal { value, .. } => value.clone(),
        CellContent::Formula(_) => Value::Empty,
    }
}

/// Top-level results never display as blank.
fn non_empty(value: Value) -> Value {
    if value.is_empty() {
        Value::Number(0.0)
    } else {
        value
    }
}

/// One evaluation pass.
struct Pass<'a> {
    env: EvalEnv<'a>,
    state: &'a RefCell<EvalState>,
    /// Cells currently evaluating, outermost first
    in_progress: RefCell<Vec<CellId>>,
    cycle_members: RefCell<FxHashSet<CellId>>,
    evaluations: RefCell<FxHashMap<CellId, usize>>,
    report: RefCell<RecalcReport>,
    started: Instant,
}

impl<'a> Pass<'a> {
    fn new(env: EvalEnv<'a>, state: &'a RefCell<EvalState>, mode: RecalcMode) -> Self {
        Self {
            env,
            state,
            in_progress: RefCell::new(Vec::new()),
            cycle_members: RefCell::new(FxHashSet::default()),
            evaluations: RefCell::new(FxHashMap::default()),
            report: RefCell::new(RecalcReport::new(mode)),
            started: Instant::now(),
        }
    }

    fn run(&self, limit: Option<usize>) {
        let mut processed = 0;
        loop {
            let mut queue: Vec<CellId> = self.state.borrow().dirty.iter().cloned().collect();
            if queue.is_empty() {
                return;
            }
            // Spreads may re-dirty cells already evaluated; go round again
            queue.sort();
            for id in queue {
                if limit.is_some_and(|l| processed >= l) {
                    return;
                }
                if self.state.borrow().dirty.contains(&id) {
                    self.ensure(&id);
                    processed += 1;
                }
            }
        }
    }

    fn finish(self) -> RecalcReport {
        let mut report = self.report.into_inner();
        report.cycle_cells = self.cycle_members.borrow().len();
        report.finish(self.started);
        report
    }

    /// Bring a cell up to date and return its value.
    fn ensure(&self, id: &CellId) -> Value {
        if let Some(at) = self.in_progress.borrow().iter().position(|c| c == id) {
            let mut members = self.cycle_members.borrow_mut();
            members.extend(self.in_progress.borrow()[at..].iter().cloned());
            return CellError::cycle().into();
        }
        if !self.state.borrow().dirty.contains(id) {
            return self.stored(id);
        }

        let depth = {
            let mut stack = self.in_progress.borrow_mut();
            stack.push(id.clone());
            stack.len()
        };
        {
            let mut report = self.report.borrow_mut();
            report.max_depth = report.max_depth.max(depth);
        }

        let result = self.compute(id);

        self.in_progress.borrow_mut().pop();
        self.state.borrow_mut().dirty.remove(id);
        match result {
            Some(result) => self.store(id, result),
            None => self.forget(id),
        }
        self.stored(id)
    }

    fn stored(&self, id: &CellId) -> Value {
        self.state.borrow().values.get(id).cloned().unwrap_or_default()
    }

    /// Run the cell's formula. `None` for cells that are no longer formulas.
    fn compute(&self, id: &CellId) -> Option<EvalResult> {
        let formula = self.env.workbook.cell(id)?.formula()?;
        let count = {
            let mut evaluations = self.evaluations.borrow_mut();
            let count = evaluations.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.report.borrow_mut().cells_evaluated += 1;
        if count > MAX_EVALUATIONS_PER_PASS {
            self.cycle_members.borrow_mut().insert(id.clone());
            return Some(CellError::cycle().into());
        }
        let ctx = CellContext {
            pass: self,
            sheet: &id.sheet,
            cell: Some(id),
            refs: &formula.dependencies,
        };
        Some(formula.compiled.execute(&ctx))
    }

    /// Drop the value and spread of a cell that is no longer a formula.
    fn forget(&self, id: &CellId) {
        self.release(id);
        let mut state = self.state.borrow_mut();
        // The position may have been claimed by a spread earlier in the pass
        if state.spreading.owner(id).is_none() {
            state.values.remove(id);
        }
        state.spreading.unblock(id);
    }

    fn store(&self, id: &CellId, result: EvalResult) {
        let result = if self.cycle_members.borrow().contains(id) {
            CellError::cycle().into()
        } else {
            result
        };
        self.release(id);

        let value = match result {
            EvalResult::Array(array) if !array.is_scalar() && !array.is_empty() => self.spread(id, array),
            other => {
                self.state.borrow_mut().spreading.unblock(id);
                non_empty(other.into_scalar())
            }
        };
        if let Value::Error(e) = &value {
            self.report.borrow_mut().record_error(id.clone(), e.code());
        }
        self.state.borrow_mut().values.insert(id.clone(), value);
    }

    /// Place an array result. Returns the value of the source cell.
    fn spread(&self, source: &CellId, array: Array2D) -> Value {
        let (rows, cols) = (array.rows(), array.cols());
        let zone = Zone::new(source.row, source.col, source.row + rows - 1, source.col + cols - 1);
        let Some(sheet) = self.env.workbook.sheet(&source.sheet) else {
            return CellError::reference("Invalid sheet").into();
        };

        let blocker = if zone.bottom >= sheet.rows || zone.right >= sheet.cols {
            Some("Array result exceeds the sheet".to_string())
        } else {
            let state = self.state.borrow();
            zone.positions()
                .filter(|&pos| pos != (source.row, source.col))
                .find(|&(row, col)| {
                    let occupied = sheet.cell(row, col).is_some_and(|c| !c.text().is_empty());
                    let position = CellId::new(source.sheet.clone(), row, col);
                    let claimed = state.spreading.owner(&position).is_some_and(|o| o != source);
                    occupied || claimed
                })
                .map(|(row, col)| {
                    format!(
                        "Array result was not expanded because it would overwrite data in {}",
                        to_xc(col, row)
                    )
                })
        };
        if let Some(message) = blocker {
            self.state.borrow_mut().spreading.block(source, zone);
            self.report.borrow_mut().spread_errors += 1;
            return CellError::new(ErrorKind::Spread, message).into();
        }

        let mut positions = Vec::with_capacity(rows * cols - 1);
        {
            let mut state = self.state.borrow_mut();
            for r in 0..rows {
                for c in 0..cols {
                    if (r, c) == (0, 0) {
                        continue;
                    }
                    let position = CellId::new(source.sheet.clone(), source.row + r, source.col + c);
                    let value = non_empty(array.get(r, c).cloned().unwrap_or_default());
                    state.values.insert(position.clone(), value);
                    positions.push(position);
                }
            }
            state.spreading.claim(source, positions.clone());
        }
        for position in &positions {
            self.redirty_readers(position, source);
        }
        non_empty(array.top_left())
    }

    /// Give up the cells a source spread over.
    fn release(&self, source: &CellId) {
        let released = {
            let mut state = self.state.borrow_mut();
            let released = state.spreading.release(source);
            for position in &released {
                state.values.remove(position);
            }
            released
        };
        for position in &released {
            self.redirty_readers(position, source);
            let waiting = self.state.borrow().spreading.blocked_by(position);
            let mut state = self.state.borrow_mut();
            state.dirty.extend(waiting.into_iter().filter(|w| w != source));
        }
    }

    /// A spread position changed value: its readers are stale even if they
    /// were evaluated earlier in this pass.
    fn redirty_readers(&self, position: &CellId, source: &CellId) {
        let graph = self.env.workbook.dep_graph();
        let mut visited = FxHashSet::default();
        visited.insert(source.clone());
        let readers = graph.dependents(position);
        let mut state = self.state.borrow_mut();
        for reader in readers {
            mark_dirty(graph, &mut state.dirty, &mut visited, reader);
        }
    }

    /// Value of a position, evaluating what it depends on first.
    fn read_position(&self, id: &CellId) -> Value {
        match self.env.workbook.cell(id) {
            Some(cell) if cell.is_formula() => self.ensure(id),
            Some(cell) if !cell.text().is_empty() => literal_value(cell),
            _ => {
                let owner = self.state.borrow().spreading.owner(id).cloned();
                if let Some(owner) = owner {
                    self.ensure(&owner);
                }
                self.stored(id)
            }
        }
    }

    fn read_zone(&self, sheet: &SheetId, zone: &Zone) -> EvalResult {
        let mut array = Array2D::new(zone.height(), zone.width());
        for (row, col) in zone.positions() {
            let value = self.read_position(&CellId::new(sheet.clone(), row, col));
            array.set(row - zone.top, col - zone.left, value);
        }
        EvalResult::Array(array)
    }
}

/// Reference lookups for one running formula.
struct CellContext<'p, 'a> {
    pass: &'p Pass<'a>,
    sheet: &'p SheetId,
    cell: Option<&'p CellId>,
    refs: &'p [RangeRef],
}

impl FormulaContext for CellContext<'_, '_> {
    fn reference(&self, index: usize) -> EvalResult {
        let Some(range) = self.refs.get(index) else {
            return CellError::reference("Invalid reference").into();
        };
        let resolved = match range.resolve(self.sheet, self.pass.env.workbook) {
            Ok(resolved) => resolved,
            Err(e) => return e.into(),
        };
        if range.is_single_cell() {
            let (row, col) = self
                .pass
                .env
                .workbook
                .sheet(&resolved.sheet)
                .map(|s| s.main_position(resolved.zone.top, resolved.zone.left))
                .unwrap_or((resolved.zone.top, resolved.zone.left));
            self.pass
                .read_position(&CellId::new(resolved.sheet, row, col))
                .into()
        } else {
            self.pass.read_zone(&resolved.sheet, &resolved.zone)
        }
    }

    fn range_union(&self, indexes: &[usize]) -> EvalResult {
        let mut union: Option<(SheetId, Zone)> = None;
        for &index in indexes {
            let Some(range) = self.refs.get(index) else {
                return CellError::reference("Invalid reference").into();
            };
            let resolved = match range.resolve(self.sheet, self.pass.env.workbook) {
                Ok(resolved) => resolved,
                Err(e) => return e.into(),
            };
            union = match union {
                None => Some((resolved.sheet, resolved.zone)),
                Some((sheet, zone)) if sheet == resolved.sheet => Some((sheet, zone.union(&resolved.zone))),
                Some(_) => return CellError::reference("Range spans several sheets").into(),
            };
        }
        match union {
            Some((sheet, zone)) => self.pass.read_zone(&sheet, &zone),
            None => CellError::reference("Invalid reference").into(),
        }
    }

    fn functions(&self) -> &FunctionRegistry {
        self.pass.env.functions
    }

    fn external(&self) -> &ExternalDataCache {
        self.pass.env.external
    }

    fn current_cell(&self) -> Option<&CellId> {
        self.cell
    }
}
