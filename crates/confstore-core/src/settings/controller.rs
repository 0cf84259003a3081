use std::fmt::Debug;
use std::sync::Arc;

use crate::settings::descriptor::SettingDescriptor;

/// Answer of a controller asked for a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// Use this value; `None` selects the property default
    Resolved(Option<String>),
    Inapplicable,
}

/// Answer of a controller told about a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetResult {
    /// Store this value locally instead (`None` stores nothing)
    Substituted(Option<String>),
    Inapplicable,
}

/// One link of the controller chain
pub trait DelegatedSettingsController: Send + Sync + Debug {
    fn get_item(&self, key: &SettingDescriptor) -> GetResult;
    fn set_item(&self, key: &SettingDescriptor, value: Option<&str>) -> SetResult;
}

/// Ordered chain of delegated controllers
#[derive(Debug, Default, Clone)]
pub struct SettingsController {
    delegates: Vec<Arc<dyn DelegatedSettingsController>>,
}

impl SettingsController {
    pub fn new(delegates: Vec<Arc<dyn DelegatedSettingsController>>) -> Self {
        Self { delegates }
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn get_item(&self, key: &SettingDescriptor) -> GetResult {
        for delegate in &self.delegates {
            let result = delegate.get_item(key);
            if result != GetResult::Inapplicable {
                log::debug!("Setting {} resolved by {:?}", key.key(), delegate);
                return result;
            }
        }
        GetResult::Inapplicable
    }

    pub fn set_item(&self, key: &SettingDescriptor, value: Option<&str>) -> SetResult {
        for delegate in &self.delegates {
            let result = delegate.set_item(key, value);
            if result != SetResult::Inapplicable {
                return result;
            }
        }
        SetResult::Inapplicable
    }
}
