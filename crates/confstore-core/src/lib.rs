//! # confstore-core
//!
//! Configuration persistence engine. Named component states are mapped to
//! durable storages (shared XML files, per-item directories, binary caches,
//! controller-backed storages), saved through a two-phase save session
//! protocol, and reconciled with external file changes. User-owned named
//! artifacts ("schemes") are handled by the [`scheme`] module.
pub mod component;
pub mod config;
pub mod event;
pub mod kernel;
pub mod scheme;
pub mod settings;
pub mod storage;
pub mod utils;
pub mod xml;

// Re-export key public types for easier use by the binary and embedders
pub use component::{ComponentSpec, ComponentStore, PersistentStateComponent};
pub use config::{ConfigFormat, EngineConfig};
pub use kernel::Application;
pub use kernel::error::{Error, Result};
pub use scheme::{Scheme, SchemeManager, SchemeProcessor};
pub use settings::{DelegatedSettingsController, SettingsController};
pub use storage::{
    RoamingType, SaveResult, StateStorage, StateStorageManager, StorageDescriptor, StoreScope,
    StreamProvider,
};
pub use xml::Element;

#[cfg(test)]
mod tests;
