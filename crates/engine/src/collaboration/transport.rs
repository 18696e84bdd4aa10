//! Message transport between collaborating models.
//!
//! The engine only needs three operations from a network layer; hosts wire
//! them to whatever they use (websocket, server push). [`LocalTransport`] is
//! an in-memory bus for tests and single-process setups.

use std::cell::RefCell;

use super::message::{ClientLeft, CollaborationMessage};

pub type MessageCallback = Box<dyn FnMut(&CollaborationMessage)>;

pub trait TransportService {
    /// Broadcast to every other registered client.
    fn send_message(&self, message: CollaborationMessage);

    /// Register `callback` to receive messages sent by other clients.
    fn on_new_message(&self, client_id: &str, callback: MessageCallback);

    /// Unregister a client and tell the others it left.
    fn leave(&self, client_id: &str);
}

/// When [`LocalTransport`] hands messages to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Inside `send_message`
    Immediate,
    /// Only when the test calls one of the `deliver_*` methods
    Manual,
}

struct Listener {
    client_id: String,
    /// Taken out while it runs
    callback: Option<MessageCallback>,
}

struct Inner {
    delivery: Delivery,
    listeners: Vec<Listener>,
    pending: Vec<CollaborationMessage>,
}

/// In-memory broadcast bus.
pub struct LocalTransport {
    inner: RefCell<Inner>,
}

impl LocalTransport {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            inner: RefCell::new(Inner {
                delivery,
                listeners: Vec::new(),
                pending: Vec::new(),
            }),
        }
    }

    pub fn immediate() -> Self {
        Self::new(Delivery::Immediate)
    }

    pub fn manual() -> Self {
        Self::new(Delivery::Manual)
    }

    /// Messages sent but not yet delivered (manual delivery).
    pub fn pending_len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Deliver the oldest pending message. Returns false if none.
    pub fn deliver_next(&self) -> bool {
        self.deliver_at(0)
    }

    /// Deliver the pending message at `index`, out of order. Returns false
    /// if there is no such message.
    pub fn deliver_at(&self, index: usize) -> bool {
        let message = {
            let mut inner = self.inner.borrow_mut();
            if index >= inner.pending.len() {
                return false;
            }
            inner.pending.remove(index)
        };
        self.deliver(&message);
        true
    }

    /// Deliver every pending message in send order.
    pub fn deliver_all(&self) {
        while self.deliver_next() {}
    }

    fn deliver(&self, message: &CollaborationMessage) {
        let sender = message.client_id();
        let count = self.inner.borrow().listeners.len();
        for i in 0..count {
            let taken = {
                let mut inner = self.inner.borrow_mut();
                match inner.listeners.get_mut(i) {
                    Some(listener) if listener.client_id != sender => listener.callback.take(),
                    _ => None,
                }
            };
            let Some(mut callback) = taken else {
                continue;
            };
            callback(message);
            if let Some(listener) = self.inner.borrow_mut().listeners.get_mut(i) {
                listener.callback = Some(callback);
            }
        }
    }
}

impl TransportService for LocalTransport {
    fn send_message(&self, message: CollaborationMessage) {
        let delivery = self.inner.borrow().delivery;
        match delivery {
            Delivery::Immediate => self.deliver(&message),
            Delivery::Manual => self.inner.borrow_mut().pending.push(message),
        }
    }

    fn on_new_message(&self, client_id: &str, callback: MessageCallback) {
        self.inner.borrow_mut().listeners.push(Listener {
            client_id: client_id.to_string(),
            callback: Some(callback),
        });
    }

    fn leave(&self, client_id: &str) {
        self.inner
            .borrow_mut()
            .listeners
            .retain(|l| l.client_id != client_id);
        self.send_message(CollaborationMessage::ClientLeft(ClientLeft {
            client_id: client_id.to_string(),
        }));
    }
}
