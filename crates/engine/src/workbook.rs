use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{is_formula_text, Cell, CellContent, Style};
use crate::cell_id::{CellId, SheetId};
use crate::dep_graph::{DepGraph, Precedents};
use crate::formula::compiler::{FormulaCell, FormulaCompiler};
use crate::formula::references::{RangeRef, SheetResolver, SheetTarget};
use crate::formula::value::Value;
use crate::sheet::Sheet;
use crate::zone::{Dimension, Zone};

/// Characters a sheet name may not contain.
const FORBIDDEN_SHEET_NAME_CHARS: &[char] = &['*', '?', '/', '\\', '[', ']', '!'];

/// Check that a sheet name is non-empty and free of reserved characters.
pub fn is_valid_sheet_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(FORBIDDEN_SHEET_NAME_CHARS)
}

/// Sheets in display order, the formula compiler shared by every cell, and
/// the dependency graph of all formulas.
#[derive(Debug, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    compiler: FormulaCompiler,

    /// Rebuilt after structural changes, updated per cell otherwise.
    dep_graph: DepGraph,
}

impl SheetResolver for Workbook {
    fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.sheet_by_name(name).map(|s| s.id.clone())
    }

    fn sheet_size(&self, sheet: &SheetId) -> Option<(usize, usize)> {
        self.sheet(sheet).map(|s| (s.rows, s.cols))
    }
}

impl Workbook {
    /// Create a workbook without sheets.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_ids(&self) -> Vec<SheetId> {
        self.sheets.iter().map(|s| s.id.clone()).collect()
    }

    pub fn sheet(&self, id: &SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| &s.id == id)
    }

    pub fn sheet_mut(&mut self, id: &SheetId) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| &s.id == id)
    }

    pub fn sheet_index(&self, id: &SheetId) -> Option<usize> {
        self.sheets.iter().position(|s| &s.id == id)
    }

    /// Find a sheet by name (case-insensitive)
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// True if no sheet other than `exclude` uses the name (case-insensitive).
    pub fn is_name_available(&self, name: &str, exclude: Option<&SheetId>) -> bool {
        !self
            .sheets
            .iter()
            .any(|s| Some(&s.id) != exclude && s.name.eq_ignore_ascii_case(name))
    }

    /// First free name of the form `<base>`, `<base> (2)`, `<base> (3)`...
    pub fn unique_sheet_name(&self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 2;
        while !self.is_name_available(&name, None) {
            name = format!("{} ({})", base, n);
            n += 1;
        }
        name
    }

    // =========================================================================
    // Sheet lifecycle
    // =========================================================================

    /// Insert a new empty sheet at `position` (clamped to the sheet count).
    pub fn create_sheet(
        &mut self,
        id: SheetId,
        name: &str,
        position: usize,
        rows: usize,
        cols: usize,
    ) -> usize {
        let index = position.min(self.sheets.len());
        self.sheets.insert(index, Sheet::new(id, name, rows, cols));
        index
    }

    pub fn delete_sheet(&mut self, id: &SheetId) -> Option<Sheet> {
        let index = self.sheet_index(id)?;
        Some(self.sheets.remove(index))
    }

    /// Copy a sheet, placing the copy right after the original.
    pub fn duplicate_sheet(&mut self, source: &SheetId, new_id: SheetId, name: &str) -> Option<usize> {
        let index = self.sheet_index(source)?;
        let mut copy = self.sheets[index].clone();
        copy.id = new_id;
        copy.name = name.to_string();
        self.sheets.insert(index + 1, copy);
        Some(index + 1)
    }

    /// Rename a sheet and every reference naming it.
    pub fn rename_sheet(&mut self, id: &SheetId, name: &str) -> bool {
        let Some(old) = self.sheet(id).map(|s| s.name.clone()) else {
            return false;
        };
        self.adapt_references(id, |r| r.rename_sheet(&old, name));
        if let Some(sheet) = self.sheet_mut(id) {
            sheet.name = name.to_string();
        }
        true
    }

    /// Restore a sheet object as is (loading).
    pub(crate) fn push_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    // =========================================================================
    // Cells
    // =========================================================================

    pub fn cell(&self, id: &CellId) -> Option<&Cell> {
        self.sheet(&id.sheet)?.cell(id.row, id.col)
    }

    /// Compile canonical formula text.
    pub fn compile(&mut self, text: &str) -> FormulaCell {
        self.compiler.compile_cell(text)
    }

    pub fn compiler(&self) -> &FormulaCompiler {
        &self.compiler
    }

    /// Build cell content from input text, compiling formulas.
    pub fn make_content(&mut self, text: &str) -> CellContent {
        if is_formula_text(text) {
            CellContent::Formula(self.compiler.compile_cell(text))
        } else {
            Cell::literal(text).content
        }
    }

    /// Set the content of a cell, keeping its style and format.
    pub fn set_cell_content(&mut self, id: &CellId, text: &str) {
        let content = self.make_content(text);
        self.update_cell(id, |cell| cell.content = content);
    }

    pub fn set_cell_style(&mut self, id: &CellId, style: Option<Style>) {
        let style = style.filter(|s| !s.is_default());
        self.update_cell(id, |cell| cell.style = style);
    }

    pub fn set_cell_format(&mut self, id: &CellId, format: Option<String>) {
        let format = format.filter(|f| !f.is_empty());
        self.update_cell(id, |cell| cell.format = format);
    }

    /// Apply `f` to the cell (created empty if missing), drop it if nothing
    /// is left and refresh its dependency edges.
    fn update_cell(&mut self, id: &CellId, f: impl FnOnce(&mut Cell)) {
        let Some(sheet) = self.sheet_mut(&id.sheet) else {
            return;
        };
        let mut cell = sheet
            .remove_cell(id.row, id.col)
            .unwrap_or_else(|| Cell::literal(""));
        f(&mut cell);
        sheet.set_cell(id.row, id.col, cell);
        self.update_cell_dependencies(id);
    }

    /// Remove a cell entirely.
    pub fn clear_cell(&mut self, id: &CellId) -> Option<Cell> {
        let removed = self.sheet_mut(&id.sheet)?.remove_cell(id.row, id.col);
        self.dep_graph.clear_cell(id);
        removed
    }

    /// Every formula cell, sorted.
    pub fn formula_cells(&self) -> Vec<CellId> {
        let mut out: Vec<CellId> = self
            .sheets
            .iter()
            .flat_map(|sheet| {
                sheet
                    .cells_iter()
                    .filter(|(_, cell)| cell.is_formula())
                    .map(|((row, col), _)| CellId::new(sheet.id.clone(), *row, *col))
            })
            .collect();
        out.sort();
        out
    }

    // =========================================================================
    // Merges
    // =========================================================================

    /// Merge a zone. Content outside its top-left cell is dropped.
    pub fn add_merge(&mut self, sheet_id: &SheetId, zone: Zone) {
        let Some(sheet) = self.sheet_mut(sheet_id) else {
            return;
        };
        for (row, col) in sheet.cells_in_zone(&zone) {
            if (row, col) != (zone.top, zone.left) {
                sheet.remove_cell(row, col);
            }
        }
        sheet.add_merge(zone);
    }

    pub fn remove_merge(&mut self, sheet_id: &SheetId, zone: &Zone) -> bool {
        self.sheet_mut(sheet_id)
            .is_some_and(|sheet| sheet.remove_merge(zone))
    }

    pub fn set_merges(&mut self, sheet_id: &SheetId, merges: Vec<Zone>) {
        if let Some(sheet) = self.sheet_mut(sheet_id) {
            sheet.set_merges(merges);
        }
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Insert rows/columns before `at` and shift every reference to the sheet.
    pub fn insert_dimension(&mut self, sheet_id: &SheetId, dimension: Dimension, at: usize, quantity: usize) {
        let Some(sheet) = self.sheet_mut(sheet_id) else {
            return;
        };
        sheet.insert_dimension(dimension, at, quantity);
        self.adapt_references(sheet_id, |r| r.insert(dimension, at, quantity));
    }

    /// Remove rows/columns (sorted, deduplicated). References to removed
    /// positions become `#REF`.
    pub fn remove_dimension(&mut self, sheet_id: &SheetId, dimension: Dimension, removed: &[usize]) {
        let Some(sheet) = self.sheet_mut(sheet_id) else {
            return;
        };
        sheet.remove_dimension(dimension, removed);
        self.adapt_references(sheet_id, |r| r.remove(dimension, removed));
    }

    /// Drop rows of `zone` whose values in `columns` repeat an earlier row,
    /// moving the remaining rows up. References to moved cells follow them.
    ///
    /// `value_of(row, col)` supplies the evaluated value of a position.
    /// Returns the number of removed rows.
    pub fn remove_duplicates(
        &mut self,
        sheet_id: &SheetId,
        zone: Zone,
        columns: &[usize],
        has_header: bool,
        value_of: impl Fn(usize, usize) -> Value,
    ) -> usize {
        let first = if has_header { zone.top + 1 } else { zone.top };
        if first > zone.bottom {
            return 0;
        }
        let mut seen = FxHashSet::default();
        let mut kept = Vec::new();
        for row in first..=zone.bottom {
            let key: Vec<String> = columns.iter().map(|&col| duplicate_key(&value_of(row, col))).collect();
            if seen.insert(key) {
                kept.push(row);
            }
        }
        let removed = zone.bottom - first + 1 - kept.len();
        if removed == 0 {
            return 0;
        }

        let Some(sheet) = self.sheet_mut(sheet_id) else {
            return 0;
        };
        let data = Zone::new(first, zone.left, zone.bottom, zone.right);
        let mut taken: FxHashMap<(usize, usize), Cell> = FxHashMap::default();
        for (row, col) in sheet.cells_in_zone(&data) {
            if let Some(cell) = sheet.remove_cell(row, col) {
                taken.insert((row, col), cell);
            }
        }
        let mut moves: FxHashMap<usize, usize> = FxHashMap::default();
        for (i, &row) in kept.iter().enumerate() {
            let target = first + i;
            moves.insert(row, target);
            for col in zone.left..=zone.right {
                if let Some(cell) = taken.remove(&(row, col)) {
                    sheet.set_cell(target, col, cell);
                }
            }
        }

        self.adapt_references(sheet_id, |r| {
            if r.invalid || r.is_full_col || r.is_full_row {
                return;
            }
            if r.zone.left < zone.left || r.zone.right > zone.right {
                return;
            }
            if let (Some(&top), Some(&bottom)) = (moves.get(&r.zone.top), moves.get(&r.zone.bottom)) {
                if bottom >= top && bottom - top == r.zone.bottom - r.zone.top {
                    r.zone = r.zone.with_span(Dimension::Row, top, bottom);
                }
            }
        });
        removed
    }

    /// Rewrite the references of every formula that target `sheet_id`,
    /// re-rendering and recompiling the formulas that changed.
    fn adapt_references(&mut self, sheet_id: &SheetId, mut adapt: impl FnMut(&mut RangeRef)) {
        let Some(target_name) = self.sheet(sheet_id).map(|s| s.name.clone()) else {
            return;
        };
        let mut rewrites = Vec::new();
        for sheet in &self.sheets {
            for ((row, col), cell) in sheet.cells_iter() {
                let Some(formula) = cell.formula() else {
                    continue;
                };
                let mut dependencies = formula.dependencies.clone();
                let mut changed = false;
                for dep in &mut dependencies {
                    let targets = match &dep.sheet {
                        SheetTarget::Current => &sheet.id == sheet_id,
                        SheetTarget::Named(name) => name.eq_ignore_ascii_case(&target_name),
                    };
                    if targets {
                        let before = dep.clone();
                        adapt(dep);
                        changed |= *dep != before;
                    }
                }
                if changed {
                    rewrites.push((
                        CellId::new(sheet.id.clone(), *row, *col),
                        formula.render_with(&dependencies),
                    ));
                }
            }
        }
        for (id, text) in rewrites {
            log::trace!("reference rewrite {} -> {}", id, text);
            let content = CellContent::Formula(self.compiler.compile_cell(&text));
            if let Some(cell) = self
                .sheet_mut(&id.sheet)
                .and_then(|s| s.remove_cell(id.row, id.col))
            {
                let mut cell = cell;
                cell.content = content;
                if let Some(sheet) = self.sheet_mut(&id.sheet) {
                    sheet.set_cell(id.row, id.col, cell);
                }
            }
        }
    }

    // =========================================================================
    // Dependency graph
    // =========================================================================

    pub fn dep_graph(&self) -> &DepGraph {
        &self.dep_graph
    }

    /// Rebuild the dependency graph from scratch.
    pub fn rebuild_dependencies(&mut self) {
        let mut graph = DepGraph::new();
        for id in self.formula_cells() {
            let preds = self.precedents_of(&id);
            graph.replace_edges(id, preds);
        }
        self.dep_graph = graph;
    }

    /// Refresh the edges of one cell after its content changed.
    pub fn update_cell_dependencies(&mut self, id: &CellId) {
        let preds = self.precedents_of(id);
        self.dep_graph.replace_edges(id.clone(), preds);
    }

    /// What a cell's formula reads. Single cells inside a merge resolve to
    /// the merge's top-left cell.
    fn precedents_of(&self, id: &CellId) -> Precedents {
        let mut preds = Precedents::default();
        let Some(formula) = self.cell(id).and_then(Cell::formula) else {
            return preds;
        };
        for dep in &formula.dependencies {
            let Some(sheet_id) = dep.target_sheet(&id.sheet, self) else {
                continue;
            };
            if dep.is_single_cell() {
                let (row, col) = match self.sheet(&sheet_id) {
                    Some(sheet) => sheet.main_position(dep.zone.top, dep.zone.left),
                    None => (dep.zone.top, dep.zone.left),
                };
                preds.cells.insert(CellId::new(sheet_id, row, col));
            } else {
                preds.ranges.push((sheet_id, dep.zone));
            }
        }
        preds
    }
}

/// Comparison key for duplicate detection: text is case-insensitive.
fn duplicate_key(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Number(n) => format!("n:{}", n),
        Value::Text(s) => format!("t:{}", s.to_lowercase()),
        Value::Boolean(b) => format!("b:{}", b),
        Value::Error(e) => format!("e:{}", e.code()),
    }
}
