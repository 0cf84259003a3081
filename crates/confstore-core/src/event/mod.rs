//! # Store events
//!
//! Notifications published by a component store, and the deferral queue that
//! holds external change notifications back while a save is running.
pub mod dispatcher;

use std::fmt::Debug;
use std::path::PathBuf;

/// Type for listener identifiers
pub type ListenerId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Backing files were modified outside the engine
    FilesChanged(Vec<PathBuf>),
    /// A component was reloaded after an external change
    ComponentReloaded(String),
    /// A save pass finished; lists the targets written or deleted
    SaveCompleted { changed: Vec<String>, failed: usize },
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::FilesChanged(_) => "store.files_changed",
            StoreEvent::ComponentReloaded(_) => "store.component_reloaded",
            StoreEvent::SaveCompleted { .. } => "store.save_completed",
        }
    }
}

pub trait StoreListener: Send + Sync + Debug {
    fn on_event(&self, event: &StoreEvent);
}

pub use dispatcher::EventDispatcher;

#[cfg(test)]
mod tests;
