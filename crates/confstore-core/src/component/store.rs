use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::component::error::ComponentError;
use crate::component::spec::ComponentSpec;
use crate::component::traits::PersistentStateComponent;
use crate::event::{EventDispatcher, StoreEvent};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::{Error, Result};
use crate::storage::descriptor::{StorageDescriptor, StoreScope};
use crate::storage::manager::StateStorageManager;
use crate::storage::obsolete::{ObsoleteStorageDeclaration, ObsoleteStorageRegistry};
use crate::storage::save_session::{SaveResult, SaveSessionProducerManager};
use crate::storage::state_storage::StateStorage;
use crate::xml::Element;

struct ComponentEntry {
    spec: ComponentSpec,
    component: Arc<dyn PersistentStateComponent>,
    active: Arc<dyn StateStorage>,
    deprecated: Vec<Arc<dyn StateStorage>>,
    loaded: bool,
    saved_modification_count: Option<u64>,
}

/// Everything a save pass needs from one loaded component
struct SaveCandidate {
    name: String,
    component: Arc<dyn PersistentStateComponent>,
    active: Arc<dyn StateStorage>,
    deprecated: Vec<Arc<dyn StateStorage>>,
    saved_modification_count: Option<u64>,
}

/// Component saved in a pass, with the counter to remember on success
struct SavedComponent {
    name: String,
    file_spec: String,
    modification_count: Option<u64>,
}

/// Maps registered components to their storages; loads and saves them.
///
/// Saves are serialized. External change notifications arriving while a save
/// runs are queued and reconciled before the save returns.
pub struct ComponentStore {
    scope: StoreScope,
    manager: Arc<StateStorageManager>,
    components: RwLock<BTreeMap<String, ComponentEntry>>,
    save_lock: tokio::sync::Mutex<()>,
    events: Arc<EventDispatcher>,
    obsolete: Option<Arc<ObsoleteStorageRegistry>>,
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("scope", &self.scope)
            .field("components", &self.component_names())
            .finish()
    }
}

impl ComponentStore {
    pub fn new(manager: Arc<StateStorageManager>) -> Self {
        Self {
            scope: manager.scope(),
            manager,
            components: RwLock::new(BTreeMap::new()),
            save_lock: tokio::sync::Mutex::new(()),
            events: Arc::new(EventDispatcher::new()),
            obsolete: None,
        }
    }

    pub fn with_obsolete_registry(mut self, registry: Arc<ObsoleteStorageRegistry>) -> Self {
        self.obsolete = Some(registry);
        self
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    pub fn storage_manager(&self) -> &Arc<StateStorageManager> {
        &self.manager
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.components.read().get(name).is_some_and(|entry| entry.loaded)
    }

    /// Register a component; its storages are resolved (and created) now
    pub fn register_component(&self, spec: ComponentSpec, component: Arc<dyn PersistentStateComponent>) -> Result<()> {
        spec.validate()?;
        if self.components.read().contains_key(&spec.name) {
            return Err(ComponentError::AlreadyRegistered(spec.name).into());
        }

        let mut storages = spec
            .resolved_storages(self.scope)
            .iter()
            .map(|descriptor| self.manager.get_or_create_storage(descriptor))
            .collect::<Result<Vec<_>>>()?;
        let active = storages.remove(0);
        if !spec.properties.is_empty() {
            active.declare_properties(&spec.name, &spec.properties);
        }

        log::debug!("Registered component {} in {}", spec.name, active.file_spec());
        let name = spec.name.clone();
        let mut components = self.components.write();
        if components.contains_key(&name) {
            return Err(ComponentError::AlreadyRegistered(name).into());
        }
        components.insert(
            name,
            ComponentEntry {
                spec,
                component,
                active,
                deprecated: storages,
                loaded: false,
                saved_modification_count: None,
            },
        );
        Ok(())
    }

    /// Load a component's state from its storages.
    ///
    /// The active storage wins; otherwise the first deprecated storage with
    /// data. The state is applied only after the read completed, so dropping
    /// the returned future leaves the component untouched. A failure is
    /// reported as [`ComponentError::LoadFailed`] and a later call retries.
    pub async fn init_component(&self, name: &str) -> Result<()> {
        self.load_component(name, false).await
    }

    /// Initialize every registered component not loaded yet; returns the
    /// first failure after attempting all of them
    pub async fn init_all_components(&self) -> Result<()> {
        let pending: Vec<String> = self
            .components
            .read()
            .iter()
            .filter(|(_, entry)| !entry.loaded)
            .map(|(name, _)| name.clone())
            .collect();

        let mut first_error = None;
        for name in pending {
            if let Err(e) = self.init_component(&name).await {
                log::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn load_component(&self, name: &str, reload: bool) -> Result<()> {
        let (component, storages, plugin_id) = {
            let components = self.components.read();
            let entry = components
                .get(name)
                .ok_or_else(|| ComponentError::NotRegistered(name.to_string()))?;
            let mut storages = vec![Arc::clone(&entry.active)];
            storages.extend(entry.deprecated.iter().cloned());
            (Arc::clone(&entry.component), storages, entry.spec.plugin_id.clone())
        };

        let owned_name = name.to_string();
        let state = tokio::task::spawn_blocking(move || read_state(&owned_name, &storages))
            .await
            .map_err(|e| Error::Other(format!("State read task for '{name}' failed: {e}")))
            .and_then(|read| read)
            .map_err(|e| load_failed(name, &plugin_id, e))?;

        let found = state.is_some();
        let applied = match state {
            Some(state) => component.load_state(state),
            None => {
                component.no_state_loaded();
                Ok(())
            }
        };
        applied.map_err(|e| load_failed(name, &plugin_id, e))?;

        if !reload {
            component.initialize_component();
        }
        if let Some(entry) = self.components.write().get_mut(name) {
            entry.loaded = true;
            entry.saved_modification_count = component.state_modification_count();
        }
        log::debug!(
            "{} component {} ({})",
            if reload { "Reloaded" } else { "Initialized" },
            name,
            if found { "stored state" } else { "default state" }
        );
        Ok(())
    }

    /// Persist every loaded component whose state changed (all of them when
    /// `force` is set).
    ///
    /// Data of each component is removed from its deprecated storages, and
    /// obsolete fragments of unregistered components are pruned. Failures of
    /// one storage do not stop the others; all are collected in the result.
    pub async fn save(&self, force: bool) -> SaveResult {
        let _guard = self.save_lock.lock().await;
        self.events.begin_deferral();

        let (candidates, registered) = {
            let components = self.components.read();
            let candidates: Vec<SaveCandidate> = components
                .iter()
                .filter(|(_, entry)| entry.loaded)
                .map(|(name, entry)| SaveCandidate {
                    name: name.clone(),
                    component: Arc::clone(&entry.component),
                    active: Arc::clone(&entry.active),
                    deprecated: entry.deprecated.clone(),
                    saved_modification_count: entry.saved_modification_count,
                })
                .collect();
            let registered: HashSet<String> = components.keys().cloned().collect();
            (candidates, registered)
        };
        let declarations = self
            .obsolete
            .as_ref()
            .map(|registry| registry.declarations(self.scope.is_project_level()))
            .unwrap_or_default();

        let manager = Arc::clone(&self.manager);
        let pass = tokio::task::spawn_blocking(move || {
            run_save_pass(candidates, &registered, &declarations, &manager, force)
        })
        .await;

        let result = match pass {
            Ok((result, saved)) => {
                let mut components = self.components.write();
                for saved in saved {
                    if result.failed(&saved.file_spec) || result.failed(&saved.name) {
                        continue;
                    }
                    if let Some(entry) = components.get_mut(&saved.name) {
                        entry.saved_modification_count = saved.modification_count;
                    }
                }
                result
            }
            Err(e) => {
                let mut result = SaveResult::default();
                result.add_error(format!("{:?} store", self.scope), Error::Other(format!("Save task failed: {e}")));
                result
            }
        };

        if result.is_ok() {
            log::debug!("Saved {:?} store: {} target(s) changed", self.scope, result.changed.len());
        } else {
            for failure in &result.errors {
                log::error!("Cannot save {}: {}", failure.target, failure.error);
            }
        }
        self.events.dispatch(&StoreEvent::SaveCompleted {
            changed: result.changed.clone(),
            failed: result.errors.len(),
        });

        for event in self.events.end_deferral() {
            if let StoreEvent::FilesChanged(paths) = event {
                if let Err(e) = self.reconcile(paths).await {
                    log::error!("Cannot apply external change: {}", e);
                }
            }
        }
        result
    }

    /// Handle files modified outside the engine. While a save is running the
    /// notification is queued and handled when the save completes.
    pub async fn notify_files_changed(&self, paths: Vec<PathBuf>) -> Result<Vec<String>> {
        let Some(StoreEvent::FilesChanged(paths)) = self.events.defer_if_active(StoreEvent::FilesChanged(paths))
        else {
            return Ok(Vec::new());
        };
        let _guard = self.save_lock.lock().await;
        self.reconcile(paths).await
    }

    /// Reload the components whose data changed in `paths`
    async fn reconcile(&self, paths: Vec<PathBuf>) -> Result<Vec<String>> {
        self.events.dispatch(&StoreEvent::FilesChanged(paths.clone()));
        let storages = self.manager.storages_for_paths(&paths);
        if storages.is_empty() {
            return Ok(Vec::new());
        }

        let changed = tokio::task::spawn_blocking(move || {
            let mut changed = BTreeSet::new();
            for storage in storages {
                changed.extend(storage.analyze_external_change(&paths)?);
            }
            Ok::<_, Error>(changed)
        })
        .await
        .map_err(|e| Error::Other(format!("Change analysis task failed: {e}")))??;

        let to_reload: Vec<String> = {
            let components = self.components.read();
            changed
                .into_iter()
                .filter(|name| match components.get(name) {
                    Some(entry) if entry.loaded && entry.spec.reload_on_external_change => true,
                    Some(entry) if entry.loaded => {
                        log::info!("Component {} changed externally but does not reload", name);
                        false
                    }
                    _ => false,
                })
                .collect()
        };

        let mut reloaded = Vec::new();
        let mut first_error = None;
        for name in to_reload {
            match self.load_component(&name, true).await {
                Ok(()) => {
                    self.events.dispatch(&StoreEvent::ComponentReloaded(name.clone()));
                    reloaded.push(name);
                }
                Err(e) => {
                    log::error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(reloaded),
        }
    }

    /// Release the storages of this store
    pub fn dispose(&self) {
        self.manager.dispose();
    }
}

#[async_trait]
impl KernelComponent for ComponentStore {
    fn name(&self) -> &'static str {
        match self.scope {
            StoreScope::Application => "ApplicationComponentStore",
            StoreScope::Project => "ProjectComponentStore",
            StoreScope::Module => "ModuleComponentStore",
        }
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.init_all_components().await
    }

    async fn stop(&self) -> Result<()> {
        let result = self.save(false).await.into_result();
        self.dispose();
        result.map(|_| ())
    }
}

fn read_state(name: &str, storages: &[Arc<dyn StateStorage>]) -> Result<Option<Element>> {
    for storage in storages {
        if let Some(state) = storage.get_state(name)? {
            log::debug!("Reading {} from {}", name, storage.file_spec());
            return Ok(Some(state));
        }
    }
    Ok(None)
}

fn load_failed(name: &str, plugin_id: &Option<String>, source: Error) -> Error {
    ComponentError::LoadFailed {
        component: name.to_string(),
        plugin_id: plugin_id.clone(),
        source: Box::new(source),
    }
    .into()
}

fn run_save_pass(
    candidates: Vec<SaveCandidate>,
    registered: &HashSet<String>,
    declarations: &[ObsoleteStorageDeclaration],
    manager: &StateStorageManager,
    force: bool,
) -> (SaveResult, Vec<SavedComponent>) {
    let mut producers = SaveSessionProducerManager::new();
    let mut saved = Vec::new();

    for candidate in candidates {
        let name = candidate.name.as_str();
        let migrating: Vec<&Arc<dyn StateStorage>> = candidate
            .deprecated
            .iter()
            .filter(|storage| match storage.has_state(name) {
                Ok(found) => found,
                Err(e) => {
                    log::warn!("Cannot inspect deprecated storage {}: {}", storage.file_spec(), e);
                    false
                }
            })
            .collect();

        let modification_count = candidate.component.state_modification_count();
        let unchanged = modification_count.is_some() && modification_count == candidate.saved_modification_count;
        if !force && unchanged && migrating.is_empty() && !candidate.active.has_pending_migration() {
            continue;
        }

        let state = match candidate.component.get_state() {
            Ok(state) => state,
            Err(e) => {
                let error = ComponentError::StateUnavailable {
                    component: name.to_string(),
                    source: Box::new(e),
                };
                producers.add_error(name, error.into());
                continue;
            }
        };

        match producers.get_producer(&candidate.active) {
            Ok(Some(producer)) => {
                if let Err(e) = producer.set_state(name, state) {
                    producers.add_error(name, e);
                    continue;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                producers.add_error(candidate.active.file_spec(), e);
                continue;
            }
        }

        for storage in migrating {
            match producers.get_producer(storage) {
                Ok(Some(producer)) => {
                    if let Err(e) = producer.set_state(name, None) {
                        producers.add_error(storage.file_spec(), e);
                    } else {
                        log::debug!("Removing {} from deprecated storage {}", name, storage.file_spec());
                    }
                }
                Ok(None) => {}
                Err(e) => producers.add_error(storage.file_spec(), e),
            }
        }

        saved.push(SavedComponent {
            name: name.to_string(),
            file_spec: candidate.active.file_spec().to_string(),
            modification_count,
        });
    }

    prune_obsolete(&mut producers, registered, declarations, manager);
    (producers.save(), saved)
}

fn prune_obsolete(
    producers: &mut SaveSessionProducerManager,
    registered: &HashSet<String>,
    declarations: &[ObsoleteStorageDeclaration],
    manager: &StateStorageManager,
) {
    for declaration in declarations {
        let storage = match manager.get_or_create_storage(&StorageDescriptor::new(declaration.file.as_str())) {
            Ok(storage) => storage,
            Err(e) => {
                log::warn!("Skipping obsolete storage {}: {}", declaration.file, e);
                continue;
            }
        };
        for component in &declaration.components {
            if registered.contains(component) {
                continue;
            }
            match storage.has_state(component) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    log::warn!("Cannot inspect obsolete storage {}: {}", declaration.file, e);
                    break;
                }
            }
            match producers.get_producer(&storage) {
                Ok(Some(producer)) => match producer.set_state(component, None) {
                    Ok(()) => log::info!("Pruning obsolete component {} from {}", component, declaration.file),
                    Err(e) => producers.add_error(storage.file_spec(), e),
                },
                Ok(None) => {}
                Err(e) => producers.add_error(storage.file_spec(), e),
            }
        }
    }
}
