//! # Storage System
//!
//! Maps file specs to storages and persists component states.
//!
//! - [`macros`]: `$MACRO$` path expansion and collapse.
//! - [`manager`]: [`StateStorageManager`], one per store, creating and caching
//!   storages by normalized file spec.
//! - Backends implementing [`StateStorage`]: [`file_based`] (shared XML file),
//!   [`directory_based`] (one file per split part), [`binary`] (binary cache)
//!   and [`controller`] (settings-controller decorator).
//! - [`save_session`]: the two-phase save protocol and [`SaveResult`].
//! - [`stream_provider`], [`watch`]: capabilities supplied by the embedder.
//! - [`obsolete`]: declarations of component data that may be pruned.
pub mod binary;
pub mod controller;
pub mod descriptor;
pub mod directory_based;
pub mod error;
pub mod file_based;
pub mod macros;
pub mod manager;
pub mod obsolete;
pub mod save_session;
pub mod state_storage;
pub mod stream_provider;
pub mod watch;

pub use descriptor::{RoamingType, StorageDescriptor, StorageKind, StoreScope};
pub use directory_based::{NamedChildSplitter, StateSplitter};
pub use error::StorageSystemError;
pub use macros::{Macro, MacroPathResolver};
pub use manager::StateStorageManager;
pub use obsolete::{ObsoleteStorageDeclaration, ObsoleteStorageRegistry};
pub use save_session::{SaveResult, SaveSession, SaveSessionProducer, SaveSessionProducerManager};
pub use state_storage::{StateMap, StateStorage};
pub use stream_provider::StreamProvider;
pub use watch::{FileWatcher, WatchHandle};

#[cfg(test)]
mod tests;
