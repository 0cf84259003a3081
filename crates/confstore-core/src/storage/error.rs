//! # Storage System Errors
//!
//! Defines [`StorageSystemError`], the error enum for everything below the
//! component store: macro resolution, file-spec validation, disk I/O, document
//! parsing, stream provider failures and engine configuration loading.
use std::path::PathBuf;
use thiserror::Error;

use crate::xml::XmlError;

#[derive(Debug, Error)]
pub enum StorageSystemError {
    #[error("I/O error during operation '{operation}' on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// A recognized `$MACRO$` token has no registered value (or expands into itself)
    #[error("Cannot resolve macro '{macro_name}' in '{path}'; known macros: {known}")]
    UnresolvedMacro {
        macro_name: String,
        path: String,
        known: String,
    },

    #[error("Invalid file spec '{spec}': {reason}")]
    InvalidFileSpec { spec: String, reason: String },

    #[error("Invalid storage declaration for component '{component}': {reason}")]
    InvalidStorageSpec { component: String, reason: String },

    #[error("Cannot parse '{}': {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: XmlError,
    },

    #[error("Attempted to write to a read-only resource: {}", .0.display())]
    ReadOnly(PathBuf),

    #[error("Stream provider failed during '{operation}' for '{file_spec}': {message}")]
    StreamProvider {
        file_spec: String,
        operation: String,
        message: String,
    },

    #[error("No storage registered for '{0}'")]
    UnknownStorage(String),

    #[error("Save failed for {count} target(s): {summary}")]
    SaveFailed { count: usize, summary: String },

    #[error("Serialization to '{format}' failed: {source}")]
    SerializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Deserialization from '{format}' failed: {source}")]
    DeserializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Unsupported configuration format: {0}")]
    UnsupportedConfigFormat(String),
}

// Helper for creating Io errors, ensuring path is always included.
impl StorageSystemError {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        }
    }

    pub fn xml(source: XmlError, path: PathBuf) -> Self {
        StorageSystemError::Xml { path, source }
    }
}
