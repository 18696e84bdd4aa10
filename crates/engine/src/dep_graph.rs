//! Dependency graph for formula cells.
//!
//! Tracks precedents (what a formula reads) and dependents (which formulas
//! read a given position) so that a change only re-dirties what it can
//! affect.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! Single-cell references are exact edges. Multi-cell ranges are stored
//! once per formula as a zone edge on the target sheet rather than one edge
//! per covered position; a lookup for a position tests those zones.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::{CellId, SheetId};
use crate::zone::Zone;

/// Precedents of one formula cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Precedents {
    pub cells: FxHashSet<CellId>,
    pub ranges: Vec<(SheetId, Zone)>,
}

impl Precedents {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.ranges.is_empty()
    }
}

/// Persistent dependency graph.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B].cells then B ∈ succs[A],
///    and every range in preds[B].ranges has a matching entry in
///    range_succs, and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **Atomic updates:** `replace_edges` is the only mutator that touches
///    both directions.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    preds: FxHashMap<CellId, Precedents>,

    /// Referenced position -> formula cells reading it
    succs: FxHashMap<CellId, FxHashSet<CellId>>,

    /// Per sheet: zones read by formula cells
    range_succs: FxHashMap<SheetId, Vec<(Zone, CellId)>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precedents(&self, cell: &CellId) -> Option<&Precedents> {
        self.preds.get(cell)
    }

    /// Formula cells reading `cell`, directly or through a range. Sorted.
    pub fn dependents(&self, cell: &CellId) -> Vec<CellId> {
        let mut out: FxHashSet<CellId> = self.succs.get(cell).cloned().unwrap_or_default();
        if let Some(ranges) = self.range_succs.get(&cell.sheet) {
            out.extend(
                ranges
                    .iter()
                    .filter(|(zone, _)| zone.contains(cell.row, cell.col))
                    .map(|(_, reader)| reader.clone()),
            );
        }
        let mut out: Vec<CellId> = out.into_iter().collect();
        out.sort();
        out
    }

    pub fn formula_cell_count(&self) -> usize {
        self.preds.len()
    }

    /// Replace all edges of a formula cell. Pass empty precedents to clear.
    pub fn replace_edges(&mut self, formula_cell: CellId, new_preds: Precedents) {
        // Remove old edges
        if let Some(old) = self.preds.remove(&formula_cell) {
            for pred in old.cells {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&formula_cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
            for (sheet, _) in old.ranges {
                if let Some(ranges) = self.range_succs.get_mut(&sheet) {
                    ranges.retain(|(_, reader)| reader != &formula_cell);
                    if ranges.is_empty() {
                        self.range_succs.remove(&sheet);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds.cells {
            self.succs
                .entry(pred.clone())
                .or_default()
                .insert(formula_cell.clone());
        }
        for (sheet, zone) in &new_preds.ranges {
            self.range_succs
                .entry(sheet.clone())
                .or_default()
                .push((*zone, formula_cell.clone()));
        }
        self.preds.insert(formula_cell, new_preds);
    }

    pub fn clear_cell(&mut self, cell: &CellId) {
        self.replace_edges(cell.clone(), Precedents::default());
    }

    pub fn clear(&mut self) {
        self.preds.clear();
        self.succs.clear();
        self.range_succs.clear();
    }

    /// Check invariants. Test helper.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "empty precedents stored for {}", cell);
            for pred in &preds.cells {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(cell)),
                    "missing succ edge {} -> {}",
                    pred,
                    cell
                );
            }
            for (sheet, zone) in &preds.ranges {
                assert!(
                    self.range_succs
                        .get(sheet)
                        .is_some_and(|r| r.iter().any(|(z, c)| z == zone && c == cell)),
                    "missing range edge for {}",
                    cell
                );
            }
        }
        for (pred, deps) in &self.succs {
            assert!(!deps.is_empty());
            for dep in deps {
                assert!(
                    self.preds.get(dep).is_some_and(|p| p.cells.contains(pred)),
                    "missing pred edge {} -> {}",
                    pred,
                    dep
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(sheet: &str, row: usize, col: usize) -> CellId {
        CellId::new(SheetId::new(sheet), row, col)
    }

    fn cells(list: &[CellId]) -> Precedents {
        Precedents {
            cells: list.iter().cloned().collect(),
            ranges: Vec::new(),
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();
        assert!(graph.dependents(&cell("s", 0, 0)).is_empty());
        assert_eq!(graph.formula_cell_count(), 0);
        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        let mut graph = DepGraph::new();
        let a1 = cell("s", 0, 0);
        let b1 = cell("s", 0, 1);
        graph.replace_edges(b1.clone(), cells(&[a1.clone()]));

        assert_eq!(graph.dependents(&a1), vec![b1.clone()]);
        assert!(graph.precedents(&b1).is_some_and(|p| p.cells.contains(&a1)));
        graph.assert_consistent();
    }

    #[test]
    fn test_rewiring() {
        let mut graph = DepGraph::new();
        let a1 = cell("s", 0, 0);
        let a2 = cell("s", 1, 0);
        let b1 = cell("s", 0, 1);
        graph.replace_edges(b1.clone(), cells(&[a1.clone()]));
        graph.replace_edges(b1.clone(), cells(&[a2.clone()]));

        assert!(graph.dependents(&a1).is_empty());
        assert_eq!(graph.dependents(&a2), vec![b1]);
        graph.assert_consistent();
    }

    #[test]
    fn test_range_edges_cover_zone() {
        let mut graph = DepGraph::new();
        let c1 = cell("s", 0, 2);
        graph.replace_edges(
            c1.clone(),
            Precedents {
                cells: FxHashSet::default(),
                ranges: vec![(SheetId::new("s"), Zone::new(0, 0, 9, 1))],
            },
        );

        assert_eq!(graph.dependents(&cell("s", 5, 1)), vec![c1.clone()]);
        assert!(graph.dependents(&cell("s", 10, 0)).is_empty());
        assert!(graph.dependents(&cell("other", 5, 1)).is_empty());

        graph.clear_cell(&c1);
        assert!(graph.dependents(&cell("s", 5, 1)).is_empty());
        graph.assert_consistent();
    }

    #[test]
    fn test_cross_sheet_and_direct_edges_merge() {
        let mut graph = DepGraph::new();
        let target = cell("data", 2, 0);
        let f1 = cell("s", 0, 0);
        let f2 = cell("s", 1, 0);
        graph.replace_edges(f1.clone(), cells(&[target.clone()]));
        graph.replace_edges(
            f2.clone(),
            Precedents {
                cells: FxHashSet::default(),
                ranges: vec![(SheetId::new("data"), Zone::new(0, 0, 3, 0))],
            },
        );
        assert_eq!(graph.dependents(&target), vec![f1, f2]);
        graph.assert_consistent();
    }
}
