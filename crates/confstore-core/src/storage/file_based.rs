use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::kernel::error::Result;
use crate::storage::descriptor::RoamingType;
use crate::storage::error::StorageSystemError;
use crate::storage::save_session::{SaveSessionProducer, StateMapSaveSessionProducer, StateMapSink};
use crate::storage::state_storage::{
    changed_components, document_from_states, from_component_element, states_from_document, CachedStateMap,
    StateMap, StateStorage, StorageOptions,
};
use crate::storage::stream_provider::{self, StreamProvider};
use crate::utils::fs;
use crate::xml::{self, Element};

/// A single XML document holding the `<component>` fragments of every
/// component sharing the file.
///
/// Per-OS storages live in `<parent>/<os>/<name>`; a legacy top-level file is
/// read when the per-OS one is absent and deleted by the next save.
#[derive(Debug)]
pub struct FileBasedStorage {
    file_spec: String,
    roaming: RoamingType,
    options: StorageOptions,
    expanded_path: RwLock<PathBuf>,
    cache: CachedStateMap,
    legacy_pending: AtomicBool,
    disposed: AtomicBool,
}

impl FileBasedStorage {
    pub fn new(file_spec: impl Into<String>, path: PathBuf, roaming: RoamingType, options: StorageOptions) -> Self {
        Self {
            file_spec: file_spec.into(),
            roaming,
            options,
            expanded_path: RwLock::new(path),
            cache: CachedStateMap::default(),
            legacy_pending: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn roaming(&self) -> RoamingType {
        self.roaming
    }

    /// Top-level file a per-OS storage migrates from
    pub fn legacy_path(&self) -> Option<PathBuf> {
        match self.roaming {
            RoamingType::PerOs => Some(self.expanded_path.read().clone()),
            _ => None,
        }
    }

    fn applicable_provider(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.options
            .stream_provider
            .as_ref()
            .filter(|provider| provider.is_applicable(&self.file_spec, self.roaming))
    }

    fn exclusive_provider(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.applicable_provider().filter(|provider| provider.is_exclusive())
    }

    fn mirror_provider(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.applicable_provider().filter(|provider| !provider.is_exclusive())
    }

    fn read_stored(&self) -> Result<Option<(PathBuf, Vec<u8>)>> {
        if let Some(provider) = self.exclusive_provider() {
            let content = stream_provider::read_bytes(provider.as_ref(), &self.file_spec, self.roaming)?;
            return Ok(content
                .filter(|bytes| !bytes.is_empty())
                .map(|bytes| (PathBuf::from(&self.file_spec), bytes)));
        }

        let path = self.path();
        let legacy = self.legacy_path().filter(|legacy| legacy.is_file());
        self.legacy_pending.store(legacy.is_some(), Ordering::SeqCst);

        if let Some(bytes) = non_empty(fs::read_if_exists(&path)?, &path) {
            return Ok(Some((path, bytes)));
        }
        if let Some(legacy) = legacy {
            if let Some(bytes) = non_empty(fs::read_if_exists(&legacy)?, &legacy) {
                log::debug!("Reading {} from legacy location {}", self.file_spec, legacy.display());
                return Ok(Some((legacy, bytes)));
            }
        }
        Ok(None)
    }

    fn read_document(&self) -> Result<Option<Element>> {
        match self.read_stored()? {
            None => Ok(None),
            Some((path, bytes)) => {
                let root = xml::parse(&bytes).map_err(|e| StorageSystemError::xml(e, path))?;
                Ok(Some(root))
            }
        }
    }

    fn load_states(&self) -> Result<StateMap> {
        Ok(self
            .read_document()?
            .map(|root| states_from_document(&root))
            .unwrap_or_default())
    }

    fn write_local(&self, content: Option<&[u8]>) -> Result<()> {
        let path = self.path();
        match content {
            Some(content) => {
                let existing = fs::read_if_exists(&path)?;
                if existing.as_deref() == Some(content) {
                    log::debug!("{} is up to date", path.display());
                } else {
                    fs::write_atomically(&path, content, self.options.clear_read_only)?;
                    log::debug!("Wrote {}", path.display());
                }
            }
            None => {
                if fs::delete_file(&path)? {
                    log::debug!("Deleted {}", path.display());
                    if let Some(parent) = path.parent() {
                        fs::remove_dir_if_empty(parent)?;
                    }
                }
            }
        }

        if self.legacy_pending.swap(false, Ordering::SeqCst) {
            if let Some(legacy) = self.legacy_path() {
                if fs::delete_file(&legacy)? {
                    log::info!("Removed legacy file {} after per-OS migration", legacy.display());
                }
            }
        }
        Ok(())
    }
}

fn non_empty(content: Option<Vec<u8>>, path: &Path) -> Option<Vec<u8>> {
    match content {
        Some(bytes) if bytes.is_empty() => {
            log::warn!("Ignoring zero-length file {}", path.display());
            None
        }
        other => other,
    }
}

impl StateMapSink for FileBasedStorage {
    fn sink_file_spec(&self) -> &str {
        &self.file_spec
    }

    fn current_states(&self) -> Result<StateMap> {
        self.cache.get_or_load(|| self.load_states())
    }

    fn write_states(&self, states: StateMap) -> Result<()> {
        let content = (!states.is_empty())
            .then(|| document_from_states(&self.options.root_element, &states).to_xml_string().into_bytes());

        if let Some(provider) = self.exclusive_provider() {
            match &content {
                Some(content) => provider.write(&self.file_spec, content, self.roaming)?,
                None => {
                    provider.delete(&self.file_spec, self.roaming)?;
                }
            }
            self.cache.set(states);
            return Ok(());
        }

        self.write_local(content.as_deref())?;
        self.cache.set(states);

        if let Some(provider) = self.mirror_provider() {
            match &content {
                Some(content) => provider.write(&self.file_spec, content, self.roaming)?,
                None => {
                    provider.delete(&self.file_spec, self.roaming)?;
                }
            }
        }
        Ok(())
    }

    fn needs_save(&self) -> bool {
        self.legacy_pending.load(Ordering::SeqCst)
    }
}

impl StateStorage for FileBasedStorage {
    fn file_spec(&self) -> &str {
        &self.file_spec
    }

    fn path(&self) -> PathBuf {
        let expanded = self.expanded_path.read().clone();
        if self.roaming != RoamingType::PerOs {
            return expanded;
        }
        match (expanded.parent(), expanded.file_name()) {
            (Some(parent), Some(name)) => parent.join(&self.options.os_code).join(name),
            _ => expanded,
        }
    }

    fn set_path(&self, path: PathBuf) {
        *self.expanded_path.write() = path;
        self.legacy_pending.store(false, Ordering::SeqCst);
        self.cache.invalidate();
    }

    fn owns_path(&self, path: &Path) -> bool {
        path == self.path() || self.legacy_path().is_some_and(|legacy| path == legacy)
    }

    fn load_local_data(&self) -> Result<Option<Element>> {
        self.read_document()
    }

    fn get_state(&self, component: &str) -> Result<Option<Element>> {
        self.cache
            .with_fragment(|| self.load_states(), component, |fragment| fragment.map(from_component_element))
    }

    fn has_state(&self, component: &str) -> Result<bool> {
        self.cache
            .with_fragment(|| self.load_states(), component, |fragment| fragment.is_some())
    }

    fn component_names(&self) -> Result<Vec<String>> {
        Ok(self.current_states()?.into_keys().collect())
    }

    fn has_pending_migration(&self) -> bool {
        self.legacy_pending.load(Ordering::SeqCst)
    }

    fn create_save_session_producer(self: Arc<Self>) -> Result<Option<Box<dyn SaveSessionProducer>>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(Box::new(StateMapSaveSessionProducer::new(self)?)))
    }

    fn analyze_external_change(&self, _changed: &[PathBuf]) -> Result<BTreeSet<String>> {
        let fresh = self.load_states()?;
        let changed = match self.cache.replace(fresh.clone()) {
            Some(previous) => changed_components(&previous, &fresh),
            None => fresh.keys().cloned().collect(),
        };
        if !changed.is_empty() {
            log::debug!("External change of {} affects {:?}", self.file_spec, changed);
        }
        Ok(changed)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            log::debug!("Disposing storage {}", self.file_spec);
            self.cache.invalidate();
        }
    }
}
