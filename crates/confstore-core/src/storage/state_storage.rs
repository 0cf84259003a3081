use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::kernel::constants::COMPONENT_TAG;
use crate::kernel::error::Result;
use crate::settings::PropertyDescriptor;
use crate::storage::save_session::SaveSessionProducer;
use crate::storage::stream_provider::StreamProvider;
use crate::xml::Element;

/// Tag given to a state handed to a component
pub const STATE_TAG: &str = "state";

/// Component name -> `<component name="...">` fragment, ordered by name
pub type StateMap = BTreeMap<String, Element>;

/// One logical storage unit (a file, a directory or a cache blob).
///
/// Reads are served from a cache filled on first access; the cache is updated
/// by successful saves and by [`StateStorage::analyze_external_change`].
pub trait StateStorage: Send + Sync + Debug {
    /// Normalized file spec this storage was created for
    fn file_spec(&self) -> &str;

    /// Current backing path
    fn path(&self) -> PathBuf;

    /// Re-point the storage after its macros changed; drops cached data
    fn set_path(&self, path: PathBuf);

    /// Whether a change of `path` concerns this storage
    fn owns_path(&self, path: &Path) -> bool {
        let own = self.path();
        path == own || path.starts_with(&own)
    }

    /// Raw document as stored, `None` when nothing is stored
    fn load_local_data(&self) -> Result<Option<Element>>;

    /// State of one component, as handed to the component
    fn get_state(&self, component: &str) -> Result<Option<Element>>;

    fn has_state(&self, component: &str) -> Result<bool> {
        Ok(self.get_state(component)?.is_some())
    }

    /// Names of the components with data in this storage
    fn component_names(&self) -> Result<Vec<String>>;

    /// A stored layout change (such as a per-OS move) is waiting for the
    /// next save, even when no state changed
    fn has_pending_migration(&self) -> bool {
        false
    }

    /// Start a save pass against this storage
    fn create_save_session_producer(self: Arc<Self>) -> Result<Option<Box<dyn SaveSessionProducer>>>;

    /// Reload after an external modification of `changed`; returns the
    /// components whose data differs from what was cached
    fn analyze_external_change(&self, changed: &[PathBuf]) -> Result<BTreeSet<String>>;

    /// Properties of `component` that settings controllers may supply
    fn declare_properties(&self, _component: &str, _properties: &[PropertyDescriptor]) {}

    fn dispose(&self);
}

/// Wrap a component state into its `<component name="...">` fragment
pub fn to_component_element(name: &str, state: &Element) -> Element {
    let mut element = state.clone();
    element.set_name(COMPONENT_TAG);
    element.set_attribute("name", name);
    element
}

/// Inverse of [`to_component_element`]
pub fn from_component_element(element: &Element) -> Element {
    let mut state = element.clone();
    state.set_name(STATE_TAG);
    state.remove_attribute("name");
    state
}

/// Collect the named `<component>` children of a document root
pub fn states_from_document(root: &Element) -> StateMap {
    let mut states = StateMap::new();
    for child in root.children() {
        match (child.name(), child.attribute("name")) {
            (COMPONENT_TAG, Some(name)) => {
                states.insert(name.to_string(), child.clone());
            }
            _ => log::warn!("Ignoring unexpected <{}> element in <{}>", child.name(), root.name()),
        }
    }
    states
}

/// Build a document from `template` (the scope root) and the fragments
pub fn document_from_states(template: &Element, states: &StateMap) -> Element {
    let mut root = template.clone();
    for fragment in states.values() {
        root.add_child(fragment.clone());
    }
    root
}

/// Components whose fragment was added, removed or changed between two maps
pub fn changed_components(old: &StateMap, new: &StateMap) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, fragment) in old {
        match new.get(name) {
            Some(other) if other.canonical_eq(fragment) => {}
            _ => {
                changed.insert(name.clone());
            }
        }
    }
    for name in new.keys() {
        if !old.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

/// Lazily loaded copy of a storage's state map
#[derive(Debug, Default)]
pub struct CachedStateMap {
    states: Mutex<Option<StateMap>>,
}

impl CachedStateMap {
    /// Cached map, loading it with `load` on first access
    pub fn get_or_load<F>(&self, load: F) -> Result<StateMap>
    where
        F: FnOnce() -> Result<StateMap>,
    {
        let mut guard = self.states.lock();
        if let Some(states) = guard.as_ref() {
            return Ok(states.clone());
        }
        let states = load()?;
        *guard = Some(states.clone());
        Ok(states)
    }

    /// Look up one fragment without cloning the whole map
    pub fn with_fragment<F, T>(&self, load: F, name: &str, map: impl FnOnce(Option<&Element>) -> T) -> Result<T>
    where
        F: FnOnce() -> Result<StateMap>,
    {
        let mut guard = self.states.lock();
        if guard.is_none() {
            *guard = Some(load()?);
        }
        Ok(map(guard.as_ref().and_then(|states| states.get(name))))
    }

    pub fn set(&self, states: StateMap) {
        *self.states.lock() = Some(states);
    }

    /// Replace the cache, returning the previous content if it was loaded
    pub fn replace(&self, states: StateMap) -> Option<StateMap> {
        self.states.lock().replace(states)
    }

    pub fn invalidate(&self) {
        *self.states.lock() = None;
    }
}

/// Settings shared by the storages of one manager
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Root element of shared documents (`<application>`, `<project>`, ...)
    pub root_element: Element,
    /// Subfolder for per-OS storages
    pub os_code: String,
    pub stream_provider: Option<Arc<dyn StreamProvider>>,
    pub clear_read_only: bool,
}
