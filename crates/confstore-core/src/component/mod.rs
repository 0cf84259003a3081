//! # Component Store
//!
//! Registered components are opaque state holders
//! ([`PersistentStateComponent`]) described by a [`ComponentSpec`]: a name,
//! an ordered storage list (one active entry, any number of deprecated ones),
//! an optional plugin origin and the properties settings controllers may
//! supply. The [`ComponentStore`] loads their states, saves the dirty ones
//! through the two-phase save protocol and reloads them on external change.
pub mod error;
pub mod spec;
pub mod store;
pub mod traits;

pub use error::ComponentError;
pub use spec::ComponentSpec;
pub use store::ComponentStore;
pub use traits::PersistentStateComponent;
