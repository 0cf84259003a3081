//! # Scheme Manager
//!
//! Schemes are named, user-editable artifacts stored one file per scheme in a
//! directory (colour schemes, keymaps, code styles). A [`SchemeManager`]
//! loads them lazily, keeps names unique, compares them against bundled
//! baselines by digest and saves them with rename-aware file handling.
pub mod data_holder;
pub mod digest;
pub mod error;
pub mod manager;
pub mod naming;

use std::fmt::Debug;

use crate::kernel::error::Result;
use crate::xml::Element;

pub use data_holder::SchemeDataHolder;
pub use error::SchemeError;
pub use manager::SchemeManager;

/// A named artifact managed by a [`SchemeManager`]
pub trait Scheme: Debug {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: &str);
}

/// Converts schemes to and from documents and observes manager changes
pub trait SchemeProcessor<T: Scheme> {
    fn read_scheme(&self, element: Element) -> Result<T>;

    /// Document to store; the scheme name must be kept inside it
    fn write_scheme(&self, scheme: &T) -> Result<Element>;

    /// Scheme name from the root element, read before the full parse
    fn scheme_name(&self, root: &Element) -> Option<String> {
        root.attribute("name").map(str::to_owned)
    }

    /// Non-persistent schemes are listed but never written
    fn is_persistent(&self, _scheme: &T) -> bool {
        true
    }

    fn on_scheme_added(&self, _scheme: &T) {}

    fn on_scheme_deleted(&self, _scheme: &T) {}

    fn on_current_scheme_switched(&self, _old: Option<&T>, _new: Option<&T>) {}
}

#[cfg(test)]
mod tests;
