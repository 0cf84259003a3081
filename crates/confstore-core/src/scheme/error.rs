//! # Scheme Manager Errors
use thiserror::Error;

use crate::kernel::error::Error;

#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("Another scheme is already named '{0}'")]
    DuplicateName(String),

    #[error("Scheme '{0}' not found")]
    NotFound(String),

    #[error("Cannot read scheme from '{file}': {source}")]
    Read {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Cannot write scheme '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The target file still holds data of a scheme whose own write failed
    /// in the same pass
    #[error("Not writing scheme '{name}': '{file}' still holds an unsaved scheme")]
    TargetBusy { name: String, file: String },
}
