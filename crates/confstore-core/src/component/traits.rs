use std::fmt::Debug;

use crate::kernel::error::Result;
use crate::xml::Element;

/// A state holder registered with a [`ComponentStore`](crate::component::ComponentStore).
///
/// States are opaque documents. Returning `None` (or an empty element) from
/// `get_state` means "default state": the component's data is removed from
/// its storage.
pub trait PersistentStateComponent: Send + Sync + Debug {
    /// Current state to persist
    fn get_state(&self) -> Result<Option<Element>>;

    /// Apply a stored state. An error leaves the component as it was.
    fn load_state(&self, state: Element) -> Result<()>;

    /// Called instead of `load_state` when no storage holds data
    fn no_state_loaded(&self) {}

    /// Called once after the first successful load
    fn initialize_component(&self) {}

    /// Counter bumped on every modification; `None` disables the unchanged
    /// fast path and the state is compared on every save
    fn state_modification_count(&self) -> Option<u64> {
        None
    }
}
