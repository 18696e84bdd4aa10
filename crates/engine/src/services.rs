//! Services injected into a [`crate::model::Model`] at construction.
//!
//! Everything that would otherwise be process-wide state (id generation,
//! caches of externally provided values) lives here and dies with the model.

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;
use crate::formula::value::{CellError, ErrorKind, Value};

/// Source of unique ids for sheets and revisions.
pub trait UidGenerator {
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl UidGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic ids (`prefix-1`, `prefix-2`, ...), for tests and replays.
#[derive(Debug)]
pub struct SequentialUidGenerator {
    prefix: String,
    next: u64,
}

impl SequentialUidGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl UidGenerator for SequentialUidGenerator {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone)]
enum ExternalEntry {
    Pending,
    Ready(Value),
}

/// Values supplied asynchronously by the host (currency rates and the like).
///
/// Functions ask for a key during evaluation. Unknown keys are recorded as
/// pending and the function sees a `Loading...` error; once the host resolves
/// the key, every cell that asked for it is re-evaluated.
#[derive(Debug, Default)]
pub struct ExternalDataCache {
    entries: RefCell<FxHashMap<String, ExternalEntry>>,
    readers: RefCell<FxHashMap<String, FxHashSet<CellId>>>,
}

impl ExternalDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key on behalf of `reader`, registering the request if the
    /// key is unknown.
    pub fn request(&self, key: &str, reader: Option<&CellId>) -> Value {
        if let Some(reader) = reader {
            self.readers
                .borrow_mut()
                .entry(key.to_string())
                .or_default()
                .insert(reader.clone());
        }
        let mut entries = self.entries.borrow_mut();
        match entries.get(key) {
            Some(ExternalEntry::Ready(value)) => value.clone(),
            Some(ExternalEntry::Pending) => Value::Error(loading(key)),
            None => {
                log::debug!("external value requested: {}", key);
                entries.insert(key.to_string(), ExternalEntry::Pending);
                Value::Error(loading(key))
            }
        }
    }

    /// Keys requested but not yet resolved, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, e)| matches!(e, ExternalEntry::Pending))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Store a value and return the cells that read the key.
    pub fn resolve(&self, key: &str, value: Value) -> Vec<CellId> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), ExternalEntry::Ready(value));
        let mut readers: Vec<CellId> = self
            .readers
            .borrow()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        readers.sort();
        readers
    }

    /// Forget which cells read which keys (before a full recompute).
    pub fn clear_readers(&self) {
        self.readers.borrow_mut().clear();
    }
}

fn loading(key: &str) -> CellError {
    CellError::new(ErrorKind::Loading, format!("Waiting for {}", key))
}

/// Service container handed to the model.
pub struct Services {
    pub uid: Box<dyn UidGenerator>,
    pub external: ExternalDataCache,
}

impl Services {
    pub fn new(uid: Box<dyn UidGenerator>) -> Self {
        Self {
            uid,
            external: ExternalDataCache::new(),
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(Box::new(UuidGenerator))
    }
}
