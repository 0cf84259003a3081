use parking_lot::RwLock;

/// Components no longer expected in a storage file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoleteStorageDeclaration {
    pub file: String,
    pub components: Vec<String>,
    pub is_project_level: bool,
}

impl ObsoleteStorageDeclaration {
    pub fn new(file: impl Into<String>, components: &[&str], is_project_level: bool) -> Self {
        Self {
            file: file.into(),
            components: components.iter().map(|name| name.to_string()).collect(),
            is_project_level,
        }
    }
}

/// Registry of obsolete-storage declarations, consulted read-only on every save
#[derive(Debug, Default)]
pub struct ObsoleteStorageRegistry {
    declarations: RwLock<Vec<ObsoleteStorageDeclaration>>,
}

impl ObsoleteStorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, declaration: ObsoleteStorageDeclaration) {
        self.declarations.write().push(declaration);
    }

    /// Declarations for application (`false`) or project/module (`true`) stores
    pub fn declarations(&self, is_project_level: bool) -> Vec<ObsoleteStorageDeclaration> {
        self.declarations
            .read()
            .iter()
            .filter(|declaration| declaration.is_project_level == is_project_level)
            .cloned()
            .collect()
    }
}
