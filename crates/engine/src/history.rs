use crate::commands::Command;

/// One undoable step: the commands as dispatched and the commands that
/// revert them, already in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub id: String,
    pub commands: Vec<Command>,
    pub inverses: Vec<Command>,
}

/// Linear local undo/redo history. Remote revisions never enter it.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<Revision>,
    redo_stack: Vec<Revision>,
    max_entries: usize,
}

impl History {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries,
        }
    }

    /// Record a new revision. Clears the redo stack.
    pub fn record(&mut self, revision: Revision) {
        self.redo_stack.clear();
        self.push_undo(revision);
    }

    fn push_undo(&mut self, revision: Revision) {
        self.undo_stack.push(revision);

        // Limit history size
        if self.undo_stack.len() > self.max_entries {
            self.undo_stack.remove(0);
        }
    }

    /// Pop the revision to undo; the caller hands it back with `undone`.
    pub fn take_undo(&mut self) -> Option<Revision> {
        self.undo_stack.pop()
    }

    pub fn undone(&mut self, revision: Revision) {
        self.redo_stack.push(revision);
    }

    pub fn take_redo(&mut self) -> Option<Revision> {
        self.redo_stack.pop()
    }

    /// Put back a redone revision without touching the redo stack.
    pub fn redone(&mut self, revision: Revision) {
        self.push_undo(revision);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
