//! # Kernel Errors
//!
//! Defines the crate-wide [`Error`] enum. Each subsystem owns a typed error
//! ([`StorageSystemError`], [`ComponentError`], [`SchemeError`]) which is
//! wrapped here through `#[from]`, so `?` works across module boundaries.
//! Lifecycle failures of store owners are reported with the phase they
//! happened in.
use std::result::Result as StdResult;

use std::path::PathBuf;
use crate::component::error::ComponentError;
use crate::scheme::error::SchemeError;
use crate::storage::error::StorageSystemError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Component registration, load or state error
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// Scheme manager error
    #[error("Scheme error: {0}")]
    Scheme(#[from] SchemeError),

    /// Error occurring during a specific lifecycle phase of a store owner.
    #[error("Kernel lifecycle error during {phase:?}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in an owner's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Bootstrap")]
    Bootstrap,
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<crate::xml::XmlError> for Error {
    fn from(err: crate::xml::XmlError) -> Self {
        Error::StorageSystem(StorageSystemError::Xml {
            path: PathBuf::new(),
            source: err,
        })
    }
}

// Helper to create Io errors with context
impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        })
    }

    /// True when this error (or the storage error it wraps) is an unresolved macro
    pub fn is_unresolved_macro(&self) -> bool {
        matches!(
            self,
            Error::StorageSystem(StorageSystemError::UnresolvedMacro { .. })
        )
    }
}
