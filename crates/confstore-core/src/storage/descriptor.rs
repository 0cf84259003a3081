use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kernel::constants::{
    DEFAULT_APP_FILE_SPEC, DEFAULT_PROJECT_FILE_SPEC, MODULE_DIR_MACRO, MODULE_FILE_MACRO, PROJECT_CONFIG_DIR_MACRO,
    ROOT_CONFIG_MACRO,
};
use crate::storage::directory_based::StateSplitter;
use crate::xml::Element;

/// Placement and sync policy of a storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamingType {
    /// Shared across machines, eligible for remote sync
    #[default]
    Default,
    /// Stored under an OS-specific subfolder
    PerOs,
    /// Local only, never handed to a stream provider
    Disabled,
}

impl RoamingType {
    pub fn is_roamable(self) -> bool {
        self != RoamingType::Disabled
    }
}

/// Backend used for a storage unit
#[derive(Clone, Default)]
pub enum StorageKind {
    /// One XML document holding `<component>` fragments
    #[default]
    Xml,
    /// A directory of XML files produced by a splitter
    Directory(Arc<dyn StateSplitter>),
    /// A binary-encoded document
    BinaryCache,
}

impl fmt::Debug for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Xml => write!(f, "Xml"),
            StorageKind::Directory(splitter) => write!(f, "Directory({splitter:?})"),
            StorageKind::BinaryCache => write!(f, "BinaryCache"),
        }
    }
}

/// One storage entry of a component's storage list
#[derive(Debug, Clone)]
pub struct StorageDescriptor {
    pub file_spec: String,
    pub roaming: RoamingType,
    /// Read for migration, never written; the component's data is removed on save
    pub deprecated: bool,
    pub exportable: bool,
    pub kind: StorageKind,
}

impl StorageDescriptor {
    pub fn new(file_spec: impl Into<String>) -> Self {
        Self {
            file_spec: file_spec.into(),
            roaming: RoamingType::Default,
            deprecated: false,
            exportable: false,
            kind: StorageKind::Xml,
        }
    }

    pub fn roaming(mut self, roaming: RoamingType) -> Self {
        self.roaming = roaming;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn exportable(mut self) -> Self {
        self.exportable = true;
        self
    }

    pub fn directory(mut self, splitter: Arc<dyn StateSplitter>) -> Self {
        self.kind = StorageKind::Directory(splitter);
        self
    }

    pub fn binary_cache(mut self) -> Self {
        self.kind = StorageKind::BinaryCache;
        self
    }
}

/// Owner level of a component store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Application,
    Project,
    Module,
}

impl StoreScope {
    /// Macro that relative file specs of this scope are resolved against
    pub fn root_macro(self) -> &'static str {
        match self {
            StoreScope::Application => ROOT_CONFIG_MACRO,
            StoreScope::Project => PROJECT_CONFIG_DIR_MACRO,
            StoreScope::Module => MODULE_DIR_MACRO,
        }
    }

    /// Root element wrapping the component fragments of a shared file
    pub fn root_element(self) -> Element {
        match self {
            StoreScope::Application => Element::new("application"),
            StoreScope::Project => Element::new("project").with_attribute("version", "4"),
            StoreScope::Module => Element::new("module").with_attribute("version", "4"),
        }
    }

    /// Storage used by components that declare none
    pub fn default_file_spec(self) -> &'static str {
        match self {
            StoreScope::Application => DEFAULT_APP_FILE_SPEC,
            StoreScope::Project => DEFAULT_PROJECT_FILE_SPEC,
            StoreScope::Module => MODULE_FILE_MACRO,
        }
    }

    pub fn is_project_level(self) -> bool {
        !matches!(self, StoreScope::Application)
    }
}
