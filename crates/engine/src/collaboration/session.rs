use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::message::{CollaborationMessage, RemoteRevision};
use super::transport::TransportService;
use crate::commands::Command;

/// What the model should do after reading the inbox, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Revision(RemoteRevision),
    ClientLeft(String),
}

/// One client's membership in a collaborative session.
///
/// Outgoing revisions are numbered per client. Incoming revisions are
/// released in their author's sequence order: an early arrival waits in a
/// per-author buffer until the gap before it is filled, a repeated sequence
/// is dropped.
pub struct Session {
    client_id: String,
    transport: Rc<dyn TransportService>,
    next_sequence: u64,
    inbox: Rc<RefCell<VecDeque<CollaborationMessage>>>,
    expected: FxHashMap<String, u64>,
    buffered: FxHashMap<String, BTreeMap<u64, RemoteRevision>>,
}

impl Session {
    /// Register with the transport as `client_id`.
    pub fn join(client_id: impl Into<String>, transport: Rc<dyn TransportService>) -> Self {
        let client_id = client_id.into();
        let inbox: Rc<RefCell<VecDeque<CollaborationMessage>>> = Rc::default();
        let sink = inbox.clone();
        transport.on_new_message(
            &client_id,
            Box::new(move |message| sink.borrow_mut().push_back(message.clone())),
        );
        log::info!("client {} joined session", client_id);
        Self {
            client_id,
            transport,
            next_sequence: 0,
            inbox,
            expected: FxHashMap::default(),
            buffered: FxHashMap::default(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Broadcast a local revision.
    pub fn send_revision(&mut self, revision_id: &str, commands: Vec<Command>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.transport
            .send_message(CollaborationMessage::RemoteRevision(RemoteRevision {
                client_id: self.client_id.clone(),
                sequence,
                revision_id: revision_id.to_string(),
                commands,
            }));
    }

    /// True if messages arrived since the last [`Session::take_ready`].
    pub fn has_incoming(&self) -> bool {
        !self.inbox.borrow().is_empty()
    }

    /// Revisions waiting for an earlier sequence number.
    pub fn buffered_len(&self) -> usize {
        self.buffered.values().map(BTreeMap::len).sum()
    }

    /// Read the inbox and return everything that can be applied now.
    pub fn take_ready(&mut self) -> Vec<SessionUpdate> {
        let messages: Vec<CollaborationMessage> = self.inbox.borrow_mut().drain(..).collect();
        let mut ready = Vec::new();
        for message in messages {
            match message {
                CollaborationMessage::RemoteRevision(revision) => self.accept(revision, &mut ready),
                CollaborationMessage::ClientLeft(left) => {
                    self.expected.remove(&left.client_id);
                    if let Some(waiting) = self.buffered.remove(&left.client_id) {
                        if !waiting.is_empty() {
                            log::warn!(
                                "client {} left with {} revisions never completed",
                                left.client_id,
                                waiting.len()
                            );
                        }
                    }
                    ready.push(SessionUpdate::ClientLeft(left.client_id));
                }
            }
        }
        ready
    }

    fn accept(&mut self, revision: RemoteRevision, ready: &mut Vec<SessionUpdate>) {
        let author = revision.client_id.clone();
        let expected = self.expected.get(&author).copied().unwrap_or(0);
        if revision.sequence < expected {
            log::warn!(
                "dropping duplicate revision {} from {} (sequence {}, expected {})",
                revision.revision_id,
                author,
                revision.sequence,
                expected
            );
            return;
        }
        if revision.sequence > expected {
            log::debug!(
                "buffering revision {} from {} (sequence {}, expected {})",
                revision.revision_id,
                author,
                revision.sequence,
                expected
            );
            let waiting = self.buffered.entry(author).or_default();
            if waiting.contains_key(&revision.sequence) {
                log::warn!("dropping duplicate buffered revision {}", revision.revision_id);
            } else {
                waiting.insert(revision.sequence, revision);
            }
            return;
        }

        ready.push(SessionUpdate::Revision(revision));
        let mut next = expected + 1;
        if let Some(waiting) = self.buffered.get_mut(&author) {
            while let Some(revision) = waiting.remove(&next) {
                ready.push(SessionUpdate::Revision(revision));
                next += 1;
            }
        }
        self.expected.insert(author, next);
    }

    /// Leave the session; other clients are notified.
    pub fn leave(&self) {
        log::info!("client {} left session", self.client_id);
        self.transport.leave(&self.client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration::transport::LocalTransport;

    fn sequences(updates: &[SessionUpdate]) -> Vec<u64> {
        updates
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::Revision(r) => Some(r.sequence),
                SessionUpdate::ClientLeft(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_out_of_order_is_buffered() {
        let bus = Rc::new(LocalTransport::manual());
        let mut alice = Session::join("alice", bus.clone());
        let mut bob = Session::join("bob", bus.clone());

        alice.send_revision("r0", Vec::new());
        alice.send_revision("r1", Vec::new());
        alice.send_revision("r2", Vec::new());

        bus.deliver_at(2);
        bus.deliver_at(1);
        assert!(sequences(&bob.take_ready()).is_empty());
        assert_eq!(bob.buffered_len(), 2);

        bus.deliver_all();
        assert_eq!(sequences(&bob.take_ready()), vec![0, 1, 2]);
        assert_eq!(bob.buffered_len(), 0);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let bus = Rc::new(LocalTransport::manual());
        let mut bob = Session::join("bob", bus.clone());
        let message = CollaborationMessage::RemoteRevision(RemoteRevision {
            client_id: "alice".into(),
            sequence: 0,
            revision_id: "r0".into(),
            commands: Vec::new(),
        });
        bus.send_message(message.clone());
        bus.send_message(message);
        bus.deliver_all();
        assert_eq!(sequences(&bob.take_ready()), vec![0]);
    }

    #[test]
    fn test_client_left_reported() {
        let bus = Rc::new(LocalTransport::immediate());
        let alice = Session::join("alice", bus.clone());
        let mut bob = Session::join("bob", bus.clone());
        alice.leave();
        assert!(bob.has_incoming());
        assert_eq!(bob.take_ready(), vec![SessionUpdate::ClientLeft("alice".into())]);
    }
}
