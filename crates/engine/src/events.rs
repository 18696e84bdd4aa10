//! Event types for model change notifications.
//!
//! Hosts drain these after a dispatch instead of polling the model. Tests
//! use them to check ordering of revisions and job lifecycles.

use crate::commands::CommandKind;

/// Lifecycle of a cooperative job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Queued { id: u64, name: String },
    Started { id: u64, name: String },
    /// The job yielded and will be stepped again
    Continued { id: u64, name: String },
    Done { id: u64, name: String },
}

/// Events emitted by the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A command was applied to the workbook (local, undo/redo or remote).
    CommandApplied { kind: CommandKind },

    /// A local revision entered the undo stack. Emitted once per successful
    /// dispatch.
    RevisionAdded { revision_id: String },

    Undone { revision_id: String },
    Redone { revision_id: String },

    /// A revision from another client was applied.
    RemoteRevisionApplied { client_id: String, revision_id: String },

    ClientLeft { client_id: String },

    /// An evaluation pass finished.
    Evaluated { cells: usize, cycles: usize },

    Job(JobEvent),

    /// The host supplied a pending external value.
    ExternalResolved { key: String },
}

/// Accumulates events until the host drains them.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ModelEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: ModelEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ModelEvent] {
        &self.events
    }

    /// Take every collected event.
    pub fn drain(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to only job events.
    pub fn jobs(&self) -> Vec<&JobEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ModelEvent::Job(j) => Some(j),
                _ => None,
            })
            .collect()
    }

    /// Filter to only added revisions.
    pub fn revisions_added(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ModelEvent::RevisionAdded { revision_id } => Some(revision_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_collector_filtering() {
        let mut collector = EventCollector::new();

        collector.push(ModelEvent::CommandApplied {
            kind: CommandKind::UpdateCell,
        });
        collector.push(ModelEvent::RevisionAdded {
            revision_id: "r1".into(),
        });
        collector.push(ModelEvent::Job(JobEvent::Queued {
            id: 1,
            name: "recompute".into(),
        }));

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.revisions_added(), vec!["r1"]);
        assert_eq!(collector.jobs().len(), 1);
    }

    #[test]
    fn test_drain_empties() {
        let mut collector = EventCollector::new();
        collector.push(ModelEvent::Evaluated { cells: 2, cycles: 0 });
        let events = collector.drain();
        assert_eq!(events.len(), 1);
        assert!(collector.is_empty());
    }
}
