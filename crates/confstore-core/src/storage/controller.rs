use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kernel::error::Result;
use crate::settings::{GetResult, OldValueSupplier, PropertyDescriptor, SetResult, SettingDescriptor, SettingsController};
use crate::storage::save_session::{SaveSession, SaveSessionProducer};
use crate::storage::state_storage::{StateStorage, STATE_TAG};
use crate::xml::Element;

/// Decorates a storage so that declared properties are first offered to the
/// settings controller chain.
///
/// Reads: a controller-resolved value replaces the local `<option>`.
/// Writes: a controller may substitute the value stored locally; the
/// component's in-memory value is untouched.
#[derive(Debug)]
pub struct ControllerBackedStorage {
    inner: Arc<dyn StateStorage>,
    controller: Arc<SettingsController>,
    properties: Arc<RwLock<HashMap<String, Vec<PropertyDescriptor>>>>,
}

impl ControllerBackedStorage {
    pub fn new(inner: Arc<dyn StateStorage>, controller: Arc<SettingsController>) -> Self {
        Self {
            inner,
            controller,
            properties: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn properties_of(&self, component: &str) -> Vec<PropertyDescriptor> {
        self.properties.read().get(component).cloned().unwrap_or_default()
    }
}

impl StateStorage for ControllerBackedStorage {
    fn file_spec(&self) -> &str {
        self.inner.file_spec()
    }

    fn path(&self) -> PathBuf {
        self.inner.path()
    }

    fn set_path(&self, path: PathBuf) {
        self.inner.set_path(path)
    }

    fn owns_path(&self, path: &Path) -> bool {
        self.inner.owns_path(path)
    }

    fn load_local_data(&self) -> Result<Option<Element>> {
        self.inner.load_local_data()
    }

    fn get_state(&self, component: &str) -> Result<Option<Element>> {
        let local = self.inner.get_state(component)?;
        let properties = self.properties_of(component);
        if properties.is_empty() {
            return Ok(local);
        }

        let mut state = local.clone().unwrap_or_else(|| Element::new(STATE_TAG));
        let mut overridden = false;
        for property in &properties {
            let old_value = local
                .as_ref()
                .and_then(|local| local.option_value(&property.name))
                .map(str::to_owned);
            let supplier = OldValueSupplier::new(move || old_value.clone());
            let key = SettingDescriptor::for_property(component, property, Some(supplier));
            if let GetResult::Resolved(value) = self.controller.get_item(&key) {
                state.set_option(&property.name, value.as_deref());
                overridden = true;
            }
        }

        if local.is_none() && (!overridden || state.is_empty()) {
            return Ok(None);
        }
        Ok(Some(state))
    }

    fn has_state(&self, component: &str) -> Result<bool> {
        self.inner.has_state(component)
    }

    fn component_names(&self) -> Result<Vec<String>> {
        self.inner.component_names()
    }

    fn has_pending_migration(&self) -> bool {
        self.inner.has_pending_migration()
    }

    fn create_save_session_producer(self: Arc<Self>) -> Result<Option<Box<dyn SaveSessionProducer>>> {
        let Some(inner) = Arc::clone(&self.inner).create_save_session_producer()? else {
            return Ok(None);
        };
        Ok(Some(Box::new(ControllerSaveSessionProducer {
            inner,
            controller: Arc::clone(&self.controller),
            properties: Arc::clone(&self.properties),
        })))
    }

    fn analyze_external_change(&self, changed: &[PathBuf]) -> Result<BTreeSet<String>> {
        self.inner.analyze_external_change(changed)
    }

    fn declare_properties(&self, component: &str, properties: &[PropertyDescriptor]) {
        self.properties
            .write()
            .insert(component.to_string(), properties.to_vec());
    }

    fn dispose(&self) {
        self.inner.dispose()
    }
}

struct ControllerSaveSessionProducer {
    inner: Box<dyn SaveSessionProducer>,
    controller: Arc<SettingsController>,
    properties: Arc<RwLock<HashMap<String, Vec<PropertyDescriptor>>>>,
}

impl SaveSessionProducer for ControllerSaveSessionProducer {
    fn file_spec(&self) -> &str {
        self.inner.file_spec()
    }

    fn set_state(&mut self, component: &str, state: Option<Element>) -> Result<()> {
        let properties = self.properties.read().get(component).cloned().unwrap_or_default();
        let state = match state {
            Some(mut state) if !properties.is_empty() => {
                for property in &properties {
                    let value = state.option_value(&property.name).map(str::to_owned);
                    let key = SettingDescriptor::for_property(component, property, None);
                    if let SetResult::Substituted(local) = self.controller.set_item(&key, value.as_deref()) {
                        state.set_option(&property.name, local.as_deref());
                    }
                }
                Some(state)
            }
            other => other,
        };
        self.inner.set_state(component, state)
    }

    fn create_save_session(self: Box<Self>) -> Result<Option<Box<dyn SaveSession>>> {
        self.inner.create_save_session()
    }
}
