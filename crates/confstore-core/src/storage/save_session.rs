//! Two-phase save protocol.
//!
//! Phase one collects states into a [`SaveSessionProducer`] per storage
//! (`set_state`, no I/O). Phase two turns each producer into a
//! [`SaveSession`] (or nothing, when no data changed) and commits it. The
//! [`SaveSessionProducerManager`] owns the producers of one save pass and
//! aggregates every failure into a [`SaveResult`] instead of stopping at the
//! first one.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::state_storage::{changed_components, to_component_element, StateMap, StateStorage};
use crate::xml::Element;

/// Collects pending states for one storage
pub trait SaveSessionProducer: Send {
    fn file_spec(&self) -> &str;

    /// Stage `state` for `component`; `None` or an empty element removes the
    /// component's data
    fn set_state(&mut self, component: &str, state: Option<Element>) -> Result<()>;

    /// `None` when nothing staged differs from what is stored
    fn create_save_session(self: Box<Self>) -> Result<Option<Box<dyn SaveSession>>>;
}

/// The commit half of a save; the only place doing I/O
pub trait SaveSession: Send {
    fn save(self: Box<Self>) -> Result<()>;
}

/// Backend side of [`StateMapSaveSessionProducer`]
pub trait StateMapSink: Send + Sync + 'static {
    fn sink_file_spec(&self) -> &str;

    /// States as last loaded or saved
    fn current_states(&self) -> Result<StateMap>;

    /// Persist `states` (an empty map removes the stored data)
    fn write_states(&self, states: StateMap) -> Result<()>;

    /// Force a session even when no state changed (pending migrations)
    fn needs_save(&self) -> bool {
        false
    }
}

/// Copy-on-write producer shared by the XML-backed storages
pub struct StateMapSaveSessionProducer<S: StateMapSink> {
    sink: Arc<S>,
    original: StateMap,
    modified: Option<StateMap>,
}

impl<S: StateMapSink> StateMapSaveSessionProducer<S> {
    pub fn new(sink: Arc<S>) -> Result<Self> {
        let original = sink.current_states()?;
        Ok(Self {
            sink,
            original,
            modified: None,
        })
    }

    fn current(&self) -> &StateMap {
        self.modified.as_ref().unwrap_or(&self.original)
    }
}

impl<S: StateMapSink> SaveSessionProducer for StateMapSaveSessionProducer<S> {
    fn file_spec(&self) -> &str {
        self.sink.sink_file_spec()
    }

    fn set_state(&mut self, component: &str, state: Option<Element>) -> Result<()> {
        let fragment = state
            .filter(|state| !state.is_empty())
            .map(|state| to_component_element(component, &state));

        let unchanged = match (self.current().get(component), &fragment) {
            (None, None) => true,
            (Some(stored), Some(new)) => stored.canonical_eq(new),
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        let original = &self.original;
        let states = self.modified.get_or_insert_with(|| original.clone());
        match fragment {
            Some(fragment) => {
                states.insert(component.to_string(), fragment);
            }
            None => {
                states.remove(component);
            }
        }
        Ok(())
    }

    fn create_save_session(self: Box<Self>) -> Result<Option<Box<dyn SaveSession>>> {
        let this = *self;
        let changed = this
            .modified
            .as_ref()
            .map(|modified| !changed_components(&this.original, modified).is_empty())
            .unwrap_or(false);
        if !changed && !this.sink.needs_save() {
            return Ok(None);
        }
        let states = this.modified.unwrap_or(this.original);
        Ok(Some(Box::new(StateMapSaveSession {
            sink: this.sink,
            states,
        })))
    }
}

struct StateMapSaveSession<S: StateMapSink> {
    sink: Arc<S>,
    states: StateMap,
}

impl<S: StateMapSink> SaveSession for StateMapSaveSession<S> {
    fn save(self: Box<Self>) -> Result<()> {
        self.sink.write_states(self.states)
    }
}

/// One failed target (a file spec, a component or a scheme) of a save pass
#[derive(Debug)]
pub struct SaveFailure {
    pub target: String,
    pub error: Error,
}

/// Outcome of a save pass
#[derive(Debug, Default)]
pub struct SaveResult {
    pub errors: Vec<SaveFailure>,
    /// Targets actually written or deleted
    pub changed: Vec<String>,
}

impl SaveResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, target: impl Into<String>, error: Error) {
        self.errors.push(SaveFailure {
            target: target.into(),
            error,
        });
    }

    pub fn merge(&mut self, other: SaveResult) {
        self.errors.extend(other.errors);
        self.changed.extend(other.changed);
    }

    /// Whether `target` is among the failures
    pub fn failed(&self, target: &str) -> bool {
        self.errors.iter().any(|failure| failure.target == target)
    }

    /// Collapse into one error listing every failed target
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.errors.is_empty() {
            return Ok(self.changed);
        }
        let summary = self
            .errors
            .iter()
            .map(|failure| format!("{}: {}", failure.target, failure.error))
            .collect::<Vec<_>>()
            .join("; ");
        Err(StorageSystemError::SaveFailed {
            count: self.errors.len(),
            summary,
        }
        .into())
    }
}

/// Producers of one save pass, keyed by file spec
#[derive(Default)]
pub struct SaveSessionProducerManager {
    producers: BTreeMap<String, Box<dyn SaveSessionProducer>>,
    result: SaveResult,
}

impl SaveSessionProducerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer for `storage`, created on first request
    pub fn get_producer(
        &mut self,
        storage: &Arc<dyn StateStorage>,
    ) -> Result<Option<&mut (dyn SaveSessionProducer + 'static)>> {
        let key = storage.file_spec().to_string();
        if !self.producers.contains_key(&key) {
            match Arc::clone(storage).create_save_session_producer()? {
                Some(producer) => {
                    self.producers.insert(key.clone(), producer);
                }
                None => return Ok(None),
            }
        }
        Ok(self.producers.get_mut(&key).map(|producer| producer.as_mut()))
    }

    /// Record a phase-one failure; the pass goes on
    pub fn add_error(&mut self, target: impl Into<String>, error: Error) {
        self.result.add_error(target, error);
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Commit every session, in file spec order
    pub fn save(self) -> SaveResult {
        let mut result = self.result;
        for (file_spec, producer) in self.producers {
            match producer.create_save_session() {
                Ok(None) => {}
                Ok(Some(session)) => match session.save() {
                    Ok(()) => result.changed.push(file_spec),
                    Err(error) => result.add_error(file_spec, error),
                },
                Err(error) => result.add_error(file_spec, error),
            }
        }
        result
    }
}
