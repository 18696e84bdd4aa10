use rustc_hash::FxHashMap;

use super::cell::Cell;
use super::cell_id::SheetId;
use super::zone::{insert_into_span, remove_from_index, remove_from_span, Dimension, Zone};

/// One sheet: sparse cell storage plus merged zones.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    cells: FxHashMap<(usize, usize), Cell>,
    merges: Vec<Zone>,
}

impl Sheet {
    pub fn new(id: SheetId, name: impl Into<String>, rows: usize, cols: usize) -> Self {
        Self {
            id,
            name: name.into(),
            rows,
            cols,
            cells: FxHashMap::default(),
            merges: Vec::new(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Store a cell, dropping it instead when nothing is left in it.
    /// Returns the previous cell.
    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) -> Option<Cell> {
        if cell.is_removable() {
            self.cells.remove(&(row, col))
        } else {
            self.cells.insert((row, col), cell)
        }
    }

    pub fn remove_cell(&mut self, row: usize, col: usize) -> Option<Cell> {
        self.cells.remove(&(row, col))
    }

    /// Iterate over all populated cells
    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &Cell)> {
        self.cells.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Populated positions inside a zone, row-major.
    pub fn cells_in_zone(&self, zone: &Zone) -> Vec<(usize, usize)> {
        let mut positions: Vec<(usize, usize)> = self
            .cells
            .keys()
            .filter(|(r, c)| zone.contains(*r, *c))
            .copied()
            .collect();
        positions.sort_unstable();
        positions
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn merges(&self) -> &[Zone] {
        &self.merges
    }

    pub fn add_merge(&mut self, zone: Zone) {
        self.merges.push(zone);
    }

    /// Remove the merge exactly matching `zone`.
    pub fn remove_merge(&mut self, zone: &Zone) -> bool {
        let before = self.merges.len();
        self.merges.retain(|m| m != zone);
        self.merges.len() != before
    }

    pub fn set_merges(&mut self, merges: Vec<Zone>) {
        self.merges = merges;
    }

    /// The merge covering a position, if any.
    pub fn merge_at(&self, row: usize, col: usize) -> Option<&Zone> {
        self.merges.iter().find(|m| m.contains(row, col))
    }

    /// Position a reference to `(row, col)` reads: the top-left cell of the
    /// merge covering it, or itself.
    pub fn main_position(&self, row: usize, col: usize) -> (usize, usize) {
        match self.merge_at(row, col) {
            Some(m) => (m.top, m.left),
            None => (row, col),
        }
    }

    /// Insert `quantity` rows/columns before index `at`, shifting cells and
    /// merges after it.
    pub fn insert_dimension(&mut self, dimension: Dimension, at: usize, quantity: usize) {
        let cells_to_shift: Vec<(usize, usize)> = self
            .cells
            .keys()
            .filter(|&&pos| axis(pos, dimension) >= at)
            .copied()
            .collect();
        let moved: Vec<_> = cells_to_shift
            .into_iter()
            .filter_map(|pos| self.cells.remove(&pos).map(|cell| (pos, cell)))
            .collect();
        for (pos, cell) in moved {
            let new_pos = with_axis(pos, dimension, axis(pos, dimension) + quantity);
            self.cells.insert(new_pos, cell);
        }

        for merge in &mut self.merges {
            let (start, end) = merge.span(dimension);
            let (start, end) = insert_into_span(start, end, at, quantity);
            *merge = merge.with_span(dimension, start, end);
        }

        match dimension {
            Dimension::Row => self.rows += quantity,
            Dimension::Col => self.cols += quantity,
        }
    }

    /// Delete rows/columns (`removed` sorted ascending, deduplicated),
    /// shifting the remaining ones back. Merges shrink with them and vanish
    /// once they cover a single cell.
    pub fn remove_dimension(&mut self, dimension: Dimension, removed: &[usize]) {
        let positions: Vec<(usize, usize)> = self.cells.keys().copied().collect();
        let moved: Vec<_> = positions
            .into_iter()
            .filter_map(|pos| self.cells.remove(&pos).map(|cell| (pos, cell)))
            .collect();
        for (pos, cell) in moved {
            if let Some(index) = remove_from_index(axis(pos, dimension), removed) {
                self.cells.insert(with_axis(pos, dimension, index), cell);
            }
        }

        self.merges = self
            .merges
            .iter()
            .filter_map(|merge| {
                let (start, end) = merge.span(dimension);
                let (start, end) = remove_from_span(start, end, removed)?;
                let merge = merge.with_span(dimension, start, end);
                (!merge.is_single_cell()).then_some(merge)
            })
            .collect();

        match dimension {
            Dimension::Row => self.rows -= removed.len(),
            Dimension::Col => self.cols -= removed.len(),
        }
    }
}

fn axis((row, col): (usize, usize), dimension: Dimension) -> usize {
    match dimension {
        Dimension::Row => row,
        Dimension::Col => col,
    }
}

fn with_axis((row, col): (usize, usize), dimension: Dimension, index: usize) -> (usize, usize) {
    match dimension {
        Dimension::Row => (index, col),
        Dimension::Col => (row, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Style;

    fn sheet() -> Sheet {
        Sheet::new(SheetId::new("s1"), "Sheet1", 10, 5)
    }

    #[test]
    fn test_empty_cell_is_not_stored() {
        let mut sheet = sheet();
        sheet.set_cell(0, 0, Cell::literal("1"));
        assert_eq!(sheet.cell_count(), 1);
        sheet.set_cell(0, 0, Cell::literal(""));
        assert_eq!(sheet.cell_count(), 0);
    }

    #[test]
    fn test_styled_empty_cell_is_kept() {
        let mut sheet = sheet();
        let mut cell = Cell::literal("");
        cell.style = Some(Style {
            bold: true,
            ..Style::default()
        });
        sheet.set_cell(1, 1, cell);
        assert!(sheet.cell(1, 1).is_some());
    }

    #[test]
    fn test_insert_rows_shifts_cells() {
        let mut sheet = sheet();
        sheet.set_cell(0, 0, Cell::literal("A"));
        sheet.set_cell(1, 0, Cell::literal("B"));
        sheet.set_cell(2, 0, Cell::literal("C"));

        sheet.insert_dimension(Dimension::Row, 1, 2);

        assert_eq!(sheet.rows, 12);
        assert_eq!(sheet.cell(0, 0).map(Cell::text), Some("A"));
        assert!(sheet.cell(1, 0).is_none());
        assert_eq!(sheet.cell(3, 0).map(Cell::text), Some("B"));
        assert_eq!(sheet.cell(4, 0).map(Cell::text), Some("C"));
    }

    #[test]
    fn test_remove_cols_shifts_cells() {
        let mut sheet = sheet();
        sheet.set_cell(0, 0, Cell::literal("A"));
        sheet.set_cell(0, 1, Cell::literal("B"));
        sheet.set_cell(0, 3, Cell::literal("D"));

        sheet.remove_dimension(Dimension::Col, &[1, 2]);

        assert_eq!(sheet.cols, 3);
        assert_eq!(sheet.cell(0, 0).map(Cell::text), Some("A"));
        assert_eq!(sheet.cell(0, 1).map(Cell::text), Some("D"));
        assert_eq!(sheet.cell_count(), 2);
    }

    #[test]
    fn test_merges_follow_structure() {
        let mut sheet = sheet();
        sheet.add_merge(Zone::new(1, 0, 2, 1));
        sheet.insert_dimension(Dimension::Row, 0, 1);
        assert_eq!(sheet.merges(), &[Zone::new(2, 0, 3, 1)]);

        // Removing one of its two columns leaves a single column merge
        sheet.remove_dimension(Dimension::Col, &[1]);
        assert_eq!(sheet.merges(), &[Zone::new(2, 0, 3, 0)]);

        // Removing a row turns it into a single cell, which is dropped
        sheet.remove_dimension(Dimension::Row, &[3]);
        assert!(sheet.merges().is_empty());
    }

    #[test]
    fn test_main_position_inside_merge() {
        let mut sheet = sheet();
        sheet.add_merge(Zone::new(0, 0, 1, 1));
        assert_eq!(sheet.main_position(1, 1), (0, 0));
        assert_eq!(sheet.main_position(2, 2), (2, 2));
        assert!(sheet.remove_merge(&Zone::new(0, 0, 1, 1)));
        assert_eq!(sheet.main_position(1, 1), (1, 1));
    }

    #[test]
    fn test_cells_in_zone_sorted() {
        let mut sheet = sheet();
        sheet.set_cell(3, 1, Cell::literal("x"));
        sheet.set_cell(1, 2, Cell::literal("y"));
        sheet.set_cell(9, 4, Cell::literal("z"));
        assert_eq!(sheet.cells_in_zone(&Zone::new(0, 0, 5, 3)), vec![(1, 2), (3, 1)]);
    }
}
