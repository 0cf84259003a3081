use crate::component::error::ComponentError;
use crate::kernel::error::Result;
use crate::settings::PropertyDescriptor;
use crate::storage::descriptor::{StorageDescriptor, StoreScope};
use crate::storage::error::StorageSystemError;

/// Registration metadata of a component
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub name: String,
    /// Declared storages; empty means the scope's default storage
    pub storages: Vec<StorageDescriptor>,
    /// Plugin contributing the component, reported in load failures
    pub plugin_id: Option<String>,
    /// Properties settings controllers may supply
    pub properties: Vec<PropertyDescriptor>,
    pub reload_on_external_change: bool,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storages: Vec::new(),
            plugin_id: None,
            properties: Vec::new(),
            reload_on_external_change: true,
        }
    }

    pub fn storage(mut self, descriptor: StorageDescriptor) -> Self {
        self.storages.push(descriptor);
        self
    }

    pub fn plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn without_reload(mut self) -> Self {
        self.reload_on_external_change = false;
        self
    }

    /// Exactly one non-deprecated storage, unless none are declared
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ComponentError::StateRejected("component name is empty".to_string()).into());
        }
        if self.storages.is_empty() {
            return Ok(());
        }
        let active = self.storages.iter().filter(|storage| !storage.deprecated).count();
        if active != 1 {
            return Err(StorageSystemError::InvalidStorageSpec {
                component: self.name.clone(),
                reason: format!("expected exactly one non-deprecated storage, found {active}"),
            }
            .into());
        }
        Ok(())
    }

    /// Active storage first, then the deprecated ones in declaration order
    pub fn resolved_storages(&self, scope: StoreScope) -> Vec<StorageDescriptor> {
        if self.storages.is_empty() {
            return vec![StorageDescriptor::new(scope.default_file_spec())];
        }
        let mut ordered: Vec<StorageDescriptor> =
            self.storages.iter().filter(|storage| !storage.deprecated).cloned().collect();
        ordered.extend(self.storages.iter().filter(|storage| storage.deprecated).cloned());
        ordered
    }
}
