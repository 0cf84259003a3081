use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::xml::{self, Element};

/// Raw content of a scheme file whose full parse is deferred until the
/// scheme is first accessed
#[derive(Debug, Clone)]
pub struct SchemeDataHolder {
    file_name: String,
    bytes: Vec<u8>,
}

impl SchemeDataHolder {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Root tag and attributes only
    pub fn root_attributes(&self) -> Result<Element> {
        xml::read_root_attributes(&self.bytes)
            .map_err(|e| StorageSystemError::xml(e, self.file_name.clone().into()).into())
    }

    /// Full document
    pub fn read(&self) -> Result<Element> {
        xml::parse(&self.bytes).map_err(|e| StorageSystemError::xml(e, self.file_name.clone().into()).into())
    }
}
