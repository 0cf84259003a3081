//! # Component Store Errors
//!
//! [`ComponentError`] covers registration problems and failures raised while a
//! component's state is loaded or produced.
use thiserror::Error;

use crate::kernel::error::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    /// The stored state could not be applied. The component keeps its
    /// pre-load state; nothing is remembered, so a later init may succeed.
    #[error("Cannot load state of component '{component}'{}: {source}", origin_suffix(.plugin_id))]
    LoadFailed {
        component: String,
        plugin_id: Option<String>,
        #[source]
        source: Box<Error>,
    },

    /// The component failed to produce its current state during a save
    #[error("Cannot get state of component '{component}': {source}")]
    StateUnavailable {
        component: String,
        #[source]
        source: Box<Error>,
    },

    /// Raised by components rejecting a document in `load_state`
    #[error("State rejected: {0}")]
    StateRejected(String),

    #[error("Component '{0}' is not registered")]
    NotRegistered(String),

    #[error("Component '{0}' is already registered")]
    AlreadyRegistered(String),
}

fn origin_suffix(plugin_id: &Option<String>) -> String {
    match plugin_id {
        Some(id) => format!(" (plugin '{id}')"),
        None => String::new(),
    }
}
