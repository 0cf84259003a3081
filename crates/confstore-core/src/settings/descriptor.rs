use std::fmt;
use std::sync::Arc;

/// Lazily yields the locally stored value of a setting
#[derive(Clone)]
pub struct OldValueSupplier(Arc<dyn Fn() -> Option<String> + Send + Sync>);

impl OldValueSupplier {
    pub fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(supplier))
    }

    pub fn get(&self) -> Option<String> {
        (self.0)()
    }
}

impl fmt::Debug for OldValueSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OldValueSupplier")
    }
}

/// Context attached to a setting key
#[derive(Debug, Clone)]
pub enum SettingTag {
    /// Component owning the property
    ComponentName(String),
    /// Value currently stored locally, for migration decisions
    OldLocalValue(OldValueSupplier),
    /// Property must not leave this machine
    NonShareable,
}

/// Immutable key plus tags handed to controllers
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    key: String,
    tags: Vec<SettingTag>,
}

impl SettingDescriptor {
    pub fn new(key: impl Into<String>, tags: Vec<SettingTag>) -> Self {
        Self { key: key.into(), tags }
    }

    /// Descriptor of `component.property`
    pub fn for_property(component: &str, property: &PropertyDescriptor, old_value: Option<OldValueSupplier>) -> Self {
        let mut tags = vec![SettingTag::ComponentName(component.to_string())];
        if let Some(supplier) = old_value {
            tags.push(SettingTag::OldLocalValue(supplier));
        }
        if property.non_shareable {
            tags.push(SettingTag::NonShareable);
        }
        Self::new(format!("{component}.{}", property.name), tags)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> &[SettingTag] {
        &self.tags
    }

    pub fn component_name(&self) -> Option<&str> {
        self.tags.iter().find_map(|tag| match tag {
            SettingTag::ComponentName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn old_local_value(&self) -> Option<String> {
        self.tags.iter().find_map(|tag| match tag {
            SettingTag::OldLocalValue(supplier) => supplier.get(),
            _ => None,
        })
    }

    pub fn is_non_shareable(&self) -> bool {
        self.tags.iter().any(|tag| matches!(tag, SettingTag::NonShareable))
    }
}

/// A component property controllers may manage; stored locally as an
/// `<option name="..." value="..."/>` child of the component state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub non_shareable: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            non_shareable: false,
        }
    }

    pub fn non_shareable(mut self) -> Self {
        self.non_shareable = true;
        self
    }
}
