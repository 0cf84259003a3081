//! # XML document model
//!
//! Component states and scheme contents are handled as an owned XML-equivalent
//! tree ([`Element`]): a tag name, ordered attributes, ordered children and
//! optional text. The engine never looks inside a state beyond this shape.
//!
//! - [`reader`] parses documents, tolerating a byte-order mark and any prolog,
//!   comments or processing instructions.
//! - [`writer`] renders the canonical form: attributes sorted by name,
//!   two-space indentation, `\n` line separators and no prolog. Two elements
//!   that render identically are considered equal by the storages.
//! - [`binary`] is the compact length-prefixed encoding used by binary caches.
pub mod binary;
pub mod element;
pub mod error;
pub mod reader;
pub mod writer;

pub use element::Element;
pub use error::XmlError;
pub use reader::{parse, read_root_attributes};
pub use writer::write_element;

#[cfg(test)]
mod tests;
