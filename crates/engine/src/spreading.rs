//! Array results spreading from a formula cell over its neighbours.

use rustc_hash::FxHashMap;

use crate::cell_id::CellId;
use crate::zone::Zone;

/// Which cells each array formula currently fills, and the inverse.
///
/// A position belongs to at most one spread. Sources whose array could not
/// be placed are kept with the zone they wanted, so that freeing that zone
/// can re-dirty them.
#[derive(Debug, Default, Clone)]
pub struct SpreadingRelation {
    results: FxHashMap<CellId, Vec<CellId>>,
    owners: FxHashMap<CellId, CellId>,
    blocked: FxHashMap<CellId, Zone>,
}

impl SpreadingRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source spreading over `position`, if any. The source cell itself is
    /// not part of its own spread.
    pub fn owner(&self, position: &CellId) -> Option<&CellId> {
        self.owners.get(position)
    }

    pub fn results_of(&self, source: &CellId) -> &[CellId] {
        self.results.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_source(&self, cell: &CellId) -> bool {
        self.results.contains_key(cell)
    }

    /// Record that `source` fills `positions`.
    pub fn claim(&mut self, source: &CellId, positions: Vec<CellId>) {
        for position in &positions {
            self.owners.insert(position.clone(), source.clone());
        }
        self.results.insert(source.clone(), positions);
        self.blocked.remove(source);
    }

    /// Forget the spread of `source`, returning the positions it filled.
    pub fn release(&mut self, source: &CellId) -> Vec<CellId> {
        let positions = self.results.remove(source).unwrap_or_default();
        for position in &positions {
            self.owners.remove(position);
        }
        positions
    }

    pub fn block(&mut self, source: &CellId, zone: Zone) {
        self.blocked.insert(source.clone(), zone);
    }

    pub fn unblock(&mut self, source: &CellId) {
        self.blocked.remove(source);
    }

    /// Blocked sources whose wanted zone contains `position`.
    pub fn blocked_by(&self, position: &CellId) -> Vec<CellId> {
        let mut sources: Vec<CellId> = self
            .blocked
            .iter()
            .filter(|(source, zone)| {
                source.sheet == position.sheet
                    && source != &position
                    && zone.contains(position.row, position.col)
            })
            .map(|(source, _)| source.clone())
            .collect();
        sources.sort();
        sources
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.owners.clear();
        self.blocked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_id::SheetId;

    fn cell(row: usize, col: usize) -> CellId {
        CellId::new(SheetId::new("s"), row, col)
    }

    #[test]
    fn test_claim_and_release() {
        let mut spreading = SpreadingRelation::new();
        let source = cell(0, 0);
        spreading.claim(&source, vec![cell(1, 0), cell(2, 0)]);

        assert_eq!(spreading.owner(&cell(2, 0)), Some(&source));
        assert!(spreading.owner(&source).is_none());
        assert!(spreading.is_source(&source));

        let released = spreading.release(&source);
        assert_eq!(released.len(), 2);
        assert!(spreading.owner(&cell(1, 0)).is_none());
        assert!(spreading.results_of(&source).is_empty());
    }

    #[test]
    fn test_blocked_sources() {
        let mut spreading = SpreadingRelation::new();
        let source = cell(0, 0);
        spreading.block(&source, Zone::new(0, 0, 2, 0));
        assert_eq!(spreading.blocked_by(&cell(2, 0)), vec![source.clone()]);
        assert!(spreading.blocked_by(&cell(3, 0)).is_empty());

        // A successful claim clears the blocked state
        spreading.claim(&source, vec![cell(1, 0)]);
        assert!(spreading.blocked_by(&cell(2, 0)).is_empty());
    }
}
