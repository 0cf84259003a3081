use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::component::store::ComponentStore;
use crate::config::{path_value, EngineConfig};
use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::settings::SettingsController;
use crate::storage::descriptor::StoreScope;
use crate::storage::error::StorageSystemError;
use crate::storage::macros::Macro;
use crate::storage::manager::StateStorageManager;
use crate::storage::obsolete::ObsoleteStorageRegistry;
use crate::storage::save_session::SaveResult;
use crate::storage::stream_provider::StreamProvider;
use crate::storage::watch::FileWatcher;

/// Services supplied by the embedding application, shared by every store
#[derive(Debug, Clone, Default)]
pub struct ApplicationServices {
    pub stream_provider: Option<Arc<dyn StreamProvider>>,
    pub settings_controller: Option<Arc<SettingsController>>,
    pub file_watcher: Option<Arc<dyn FileWatcher>>,
}

/// Application-scope owner.
///
/// Holds the application store and every project or module store opened
/// through it. Stores are stopped in reverse opening order, the application
/// store last.
#[derive(Debug)]
pub struct Application {
    config: EngineConfig,
    services: ApplicationServices,
    obsolete: Arc<ObsoleteStorageRegistry>,
    app_store: Arc<ComponentStore>,
    opened: Mutex<Vec<Arc<ComponentStore>>>,
}

impl Application {
    pub fn new(config: EngineConfig, services: ApplicationServices) -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);
        log::info!("Using config directory: {}", config.config_dir.display());
        log::debug!("Using system directory: {}", config.system_dir.display());

        let obsolete = Arc::new(ObsoleteStorageRegistry::new());
        let manager = Self::storage_manager(&config, &services, StoreScope::Application, config.application_macros());
        let app_store = Arc::new(ComponentStore::new(manager).with_obsolete_registry(obsolete.clone()));

        Self {
            config,
            services,
            obsolete,
            app_store,
            opened: Mutex::new(Vec::new()),
        }
    }

    fn storage_manager(
        config: &EngineConfig,
        services: &ApplicationServices,
        scope: StoreScope,
        macros: Vec<Macro>,
    ) -> Arc<StateStorageManager> {
        Arc::new(
            StateStorageManager::new(scope, macros, config.os_code.clone())
                .with_stream_provider(services.stream_provider.clone())
                .with_settings_controller(services.settings_controller.clone())
                .with_file_watcher(services.file_watcher.clone())
                .with_clear_read_only(config.clear_read_only_files),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn app_store(&self) -> &Arc<ComponentStore> {
        &self.app_store
    }

    /// Registry where plugins declare storages of components they removed
    pub fn obsolete_storages(&self) -> &Arc<ObsoleteStorageRegistry> {
        &self.obsolete
    }

    /// Load every component registered in the application store
    pub async fn start(&self) -> Result<()> {
        lifecycle(&*self.app_store, KernelLifecyclePhase::Initialize, self.app_store.initialize().await)?;
        lifecycle(&*self.app_store, KernelLifecyclePhase::Start, self.app_store.start().await)
    }

    /// Open the store of the project in `project_dir`; its files live in
    /// the project's configuration directory
    pub async fn open_project(&self, project_dir: &Path) -> Result<Arc<ComponentStore>> {
        let config_dir = project_dir.join(constants::PROJECT_CONFIG_DIR_NAME);
        let macros = vec![
            Macro::new(constants::PROJECT_CONFIG_DIR_MACRO, path_value(&config_dir)),
            Macro::new(
                constants::WORKSPACE_FILE_MACRO,
                path_value(&config_dir.join(constants::WORKSPACE_FILE_NAME)),
            ),
        ];
        log::info!("Opening project store at {}", config_dir.display());
        self.open_store(StoreScope::Project, macros).await
    }

    /// Open the store of the module described by `module_file`
    pub async fn open_module(&self, module_file: &Path) -> Result<Arc<ComponentStore>> {
        let module_dir = module_dir(module_file)?;
        if module_file.extension().and_then(|ext| ext.to_str()) != Some(constants::MODULE_FILE_EXTENSION) {
            log::warn!(
                "Module file {} does not use the .{} extension",
                module_file.display(),
                constants::MODULE_FILE_EXTENSION
            );
        }
        let macros = vec![
            Macro::new(constants::MODULE_FILE_MACRO, path_value(module_file)),
            Macro::new(constants::MODULE_DIR_MACRO, path_value(&module_dir)),
        ];
        log::info!("Opening module store for {}", module_file.display());
        self.open_store(StoreScope::Module, macros).await
    }

    async fn open_store(&self, scope: StoreScope, macros: Vec<Macro>) -> Result<Arc<ComponentStore>> {
        let manager = Self::storage_manager(&self.config, &self.services, scope, macros);
        let store = Arc::new(ComponentStore::new(manager).with_obsolete_registry(self.obsolete.clone()));
        lifecycle(&*store, KernelLifecyclePhase::Initialize, store.initialize().await)?;
        self.opened.lock().await.push(store.clone());
        Ok(store)
    }

    /// Final save and disposal of one opened store
    pub async fn close(&self, store: &Arc<ComponentStore>) -> Result<()> {
        let removed = {
            let mut opened = self.opened.lock().await;
            let before = opened.len();
            opened.retain(|candidate| !Arc::ptr_eq(candidate, store));
            before != opened.len()
        };
        if !removed {
            return Err(Error::Other(format!("{} is not open", store.name())));
        }
        lifecycle(&**store, KernelLifecyclePhase::Shutdown, store.stop().await)
    }

    /// Save every store; failures of one store do not stop the others
    pub async fn save_all(&self, force: bool) -> SaveResult {
        let opened: Vec<Arc<ComponentStore>> = self.opened.lock().await.clone();
        let mut result = self.app_store.save(force).await;
        for store in opened {
            result.merge(store.save(force).await);
        }
        if !result.is_ok() {
            log::error!("Save finished with {} failure(s)", result.errors.len());
        }
        result
    }

    /// Stop every opened store, last opened first, then the application
    /// store. All stores are stopped; the first failure is returned.
    pub async fn shutdown(&self) -> Result<()> {
        log::info!("Shutting down stores...");
        let opened: Vec<Arc<ComponentStore>> = self.opened.lock().await.drain(..).collect();

        let mut first_error = None;
        for store in opened.iter().rev().chain(std::iter::once(&self.app_store)) {
            log::debug!("Stopping {}", store.name());
            if let Err(e) = lifecycle(&**store, KernelLifecyclePhase::Shutdown, store.stop().await) {
                log::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("Shutdown complete.");
                Ok(())
            }
        }
    }
}

fn module_dir(module_file: &Path) -> Result<PathBuf> {
    module_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            StorageSystemError::InvalidFileSpec {
                spec: module_file.display().to_string(),
                reason: "module file has no parent directory".to_string(),
            }
            .into()
        })
}

fn lifecycle(component: &dyn KernelComponent, phase: KernelLifecyclePhase, result: Result<()>) -> Result<()> {
    result.map_err(|e| Error::KernelLifecycleError {
        message: format!("{} failed during {}", component.name(), phase),
        component_name: Some(component.name().to_string()),
        phase,
        source: Some(Box::new(e)),
    })
}
