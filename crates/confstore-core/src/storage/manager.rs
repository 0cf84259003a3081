use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::kernel::error::Result;
use crate::settings::SettingsController;
use crate::storage::binary::BinaryCacheStorage;
use crate::storage::controller::ControllerBackedStorage;
use crate::storage::descriptor::{StorageDescriptor, StorageKind, StoreScope};
use crate::storage::directory_based::DirectoryBasedStorage;
use crate::storage::error::StorageSystemError;
use crate::storage::file_based::FileBasedStorage;
use crate::storage::macros::{contains_macro, validate_file_spec, Macro, MacroPathResolver};
use crate::storage::state_storage::{StateStorage, StorageOptions};
use crate::storage::stream_provider::StreamProvider;
use crate::storage::watch::{FileWatcher, WatchHandle};
use crate::utils::fs;

#[derive(Debug)]
struct StorageEntry {
    storage: Arc<dyn StateStorage>,
    expanded: PathBuf,
    watch: Option<WatchHandle>,
}

/// Owns the storages of one store (application, project or module).
///
/// Storages are created on first request and cached under their normalized
/// file spec until [`StateStorageManager::dispose`]. The macro table can be
/// replaced at any time; existing storages are re-pointed and re-watched.
#[derive(Debug)]
pub struct StateStorageManager {
    scope: StoreScope,
    macros: RwLock<MacroPathResolver>,
    storages: Mutex<HashMap<String, StorageEntry>>,
    options: StorageOptions,
    settings_controller: Option<Arc<SettingsController>>,
    file_watcher: Option<Arc<dyn FileWatcher>>,
}

impl StateStorageManager {
    pub fn new(scope: StoreScope, macros: Vec<Macro>, os_code: impl Into<String>) -> Self {
        Self {
            scope,
            macros: RwLock::new(MacroPathResolver::new(macros)),
            storages: Mutex::new(HashMap::new()),
            options: StorageOptions {
                root_element: scope.root_element(),
                os_code: os_code.into(),
                stream_provider: None,
                clear_read_only: false,
            },
            settings_controller: None,
            file_watcher: None,
        }
    }

    pub fn with_stream_provider(mut self, provider: Option<Arc<dyn StreamProvider>>) -> Self {
        self.options.stream_provider = provider;
        self
    }

    pub fn with_settings_controller(mut self, controller: Option<Arc<SettingsController>>) -> Self {
        self.settings_controller = controller.filter(|controller| !controller.is_empty());
        self
    }

    pub fn with_file_watcher(mut self, watcher: Option<Arc<dyn FileWatcher>>) -> Self {
        self.file_watcher = watcher;
        self
    }

    /// Clear the read-only flag of storage files instead of failing their save
    pub fn with_clear_read_only(mut self, clear: bool) -> Self {
        self.options.clear_read_only = clear;
        self
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    pub fn stream_provider(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.options.stream_provider.as_ref()
    }

    pub fn clear_read_only(&self) -> bool {
        self.options.clear_read_only
    }

    /// Snapshot of the active macro table
    pub fn macros(&self) -> MacroPathResolver {
        self.macros.read().clone()
    }

    /// Canonical key of a file spec.
    ///
    /// Relative specs and specs starting with the scope's root macro come back
    /// relative to that root; specs under other macros come back collapsed
    /// against the current table.
    pub fn normalize_file_spec(&self, spec: &str) -> Result<String> {
        validate_file_spec(spec)?;
        let root = self.scope.root_macro();

        let full = if let Some(rest) = spec.strip_prefix(root) {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() || rest.contains(root) {
                return Err(invalid_spec(spec, "the root macro may only prefix a relative path"));
            }
            format!("{root}/{rest}")
        } else if spec.contains(root) {
            return Err(invalid_spec(spec, "the root macro may only appear at the start"));
        } else if contains_macro(spec) {
            spec.to_string()
        } else {
            format!("{root}/{}", spec.trim_start_matches('/'))
        };

        let macros = self.macros.read();
        let collapsed = macros.collapse(&macros.expand(&full)?);
        let prefix = format!("{root}/");
        Ok(match collapsed.strip_prefix(&prefix) {
            Some(relative) => relative.to_string(),
            None => collapsed,
        })
    }

    /// Absolute path of a normalized spec
    pub fn expand_file_spec(&self, normalized: &str) -> Result<PathBuf> {
        let macros = self.macros.read();
        let expanded = if contains_macro(normalized) {
            macros.expand(normalized)?
        } else {
            macros.expand(&format!("{}/{normalized}", self.scope.root_macro()))?
        };
        Ok(PathBuf::from(expanded))
    }

    /// Cached storage for `descriptor`, created on first request
    pub fn get_or_create_storage(&self, descriptor: &StorageDescriptor) -> Result<Arc<dyn StateStorage>> {
        let key = self.normalize_file_spec(&descriptor.file_spec)?;
        let mut storages = self.storages.lock();
        if let Some(entry) = storages.get(&key) {
            return Ok(Arc::clone(&entry.storage));
        }

        let expanded = self.expand_file_spec(&key)?;
        let storage: Arc<dyn StateStorage> = match &descriptor.kind {
            StorageKind::Xml => {
                let file: Arc<dyn StateStorage> = Arc::new(FileBasedStorage::new(
                    key.clone(),
                    expanded.clone(),
                    descriptor.roaming,
                    self.options.clone(),
                ));
                match &self.settings_controller {
                    Some(controller) => Arc::new(ControllerBackedStorage::new(file, Arc::clone(controller))),
                    None => file,
                }
            }
            StorageKind::Directory(splitter) => Arc::new(DirectoryBasedStorage::new(
                key.clone(),
                expanded.clone(),
                Arc::clone(splitter),
                self.options.clone(),
            )),
            StorageKind::BinaryCache => {
                Arc::new(BinaryCacheStorage::new(key.clone(), expanded.clone(), self.options.clone()))
            }
        };
        log::debug!("Created {:?} storage {} at {}", descriptor.kind, key, storage.path().display());

        let watch = self.file_watcher.as_ref().map(|watcher| watcher.watch(&storage.path()));
        storages.insert(
            key,
            StorageEntry {
                storage: Arc::clone(&storage),
                expanded,
                watch,
            },
        );
        Ok(storage)
    }

    pub fn storages(&self) -> Vec<Arc<dyn StateStorage>> {
        self.storages
            .lock()
            .values()
            .map(|entry| Arc::clone(&entry.storage))
            .collect()
    }

    /// Storages concerned by a change of any of `paths`
    pub fn storages_for_paths(&self, paths: &[PathBuf]) -> Vec<Arc<dyn StateStorage>> {
        self.storages()
            .into_iter()
            .filter(|storage| paths.iter().any(|path| storage.owns_path(path)))
            .collect()
    }

    /// Replace the macro table; storages whose location moved are re-pointed
    /// and their watch is torn down before the new one is installed
    pub fn set_macros(&self, macros: Vec<Macro>) {
        let mut storages = self.storages.lock();
        self.macros.write().set_macros(macros);

        for (key, entry) in storages.iter_mut() {
            let expanded = match self.expand_file_spec(key) {
                Ok(expanded) => expanded,
                Err(e) => {
                    log::warn!("Storage {} no longer resolves: {}", key, e);
                    continue;
                }
            };
            if expanded == entry.expanded {
                continue;
            }
            log::debug!(
                "Re-pointing storage {} from {} to {}",
                key,
                entry.expanded.display(),
                expanded.display()
            );
            if let (Some(watcher), Some(handle)) = (&self.file_watcher, entry.watch.take()) {
                watcher.unwatch(handle);
            }
            entry.storage.set_path(expanded.clone());
            entry.expanded = expanded;
            entry.watch = self.file_watcher.as_ref().map(|watcher| watcher.watch(&entry.storage.path()));
        }
    }

    /// Move the backing file of `spec` to `new_location` (an expanded path).
    ///
    /// The new location is watched before the file moves and the old watch is
    /// released afterwards, so no change goes unnoticed.
    pub fn rename_file(&self, spec: &str, new_location: &Path) -> Result<()> {
        let key = self.normalize_file_spec(spec)?;
        let mut storages = self.storages.lock();
        let entry = storages
            .get_mut(&key)
            .ok_or_else(|| StorageSystemError::UnknownStorage(key.clone()))?;

        let old_path = entry.storage.path();
        let old_expanded = entry.expanded.clone();
        entry.storage.set_path(new_location.to_path_buf());
        let new_path = entry.storage.path();

        let new_watch = self.file_watcher.as_ref().map(|watcher| watcher.watch(&new_path));
        if old_path.exists() {
            if let Err(e) = fs::rename_file(&old_path, &new_path) {
                entry.storage.set_path(old_expanded);
                if let (Some(watcher), Some(handle)) = (&self.file_watcher, new_watch) {
                    watcher.unwatch(handle);
                }
                return Err(e);
            }
        }
        if let (Some(watcher), Some(handle)) = (&self.file_watcher, entry.watch.take()) {
            watcher.unwatch(handle);
        }
        entry.watch = new_watch;
        entry.expanded = new_location.to_path_buf();
        log::info!("Renamed {} to {}", old_path.display(), new_path.display());
        Ok(())
    }

    /// Release every storage and watch
    pub fn dispose(&self) {
        let mut storages = self.storages.lock();
        for (_, entry) in storages.drain() {
            if let (Some(watcher), Some(handle)) = (&self.file_watcher, entry.watch) {
                watcher.unwatch(handle);
            }
            entry.storage.dispose();
        }
    }
}

fn invalid_spec(spec: &str, reason: &str) -> crate::kernel::error::Error {
    StorageSystemError::InvalidFileSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
