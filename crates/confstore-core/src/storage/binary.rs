use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::kernel::error::Result;
use crate::storage::save_session::{SaveSessionProducer, StateMapSaveSessionProducer, StateMapSink};
use crate::storage::state_storage::{
    changed_components, document_from_states, from_component_element, states_from_document, CachedStateMap,
    StateMap, StateStorage, StorageOptions,
};
use crate::utils::fs;
use crate::xml::{binary, Element};

/// Local cache storing its document in the binary tree encoding.
///
/// A cache that cannot be decoded is reported and treated as empty; the next
/// save overwrites it.
#[derive(Debug)]
pub struct BinaryCacheStorage {
    file_spec: String,
    path: RwLock<PathBuf>,
    options: StorageOptions,
    cache: CachedStateMap,
    disposed: AtomicBool,
}

impl BinaryCacheStorage {
    pub fn new(file_spec: impl Into<String>, path: PathBuf, options: StorageOptions) -> Self {
        Self {
            file_spec: file_spec.into(),
            path: RwLock::new(path),
            options,
            cache: CachedStateMap::default(),
            disposed: AtomicBool::new(false),
        }
    }

    fn read_document(&self) -> Result<Option<Element>> {
        let path = self.path();
        let Some(bytes) = fs::read_if_exists(&path)? else {
            return Ok(None);
        };
        if bytes.is_empty() {
            log::warn!("Ignoring zero-length cache {}", path.display());
            return Ok(None);
        }
        match binary::decode(&bytes) {
            Ok(root) => Ok(Some(root)),
            Err(e) => {
                log::warn!("Discarding unreadable cache {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn load_states(&self) -> Result<StateMap> {
        Ok(self
            .read_document()?
            .map(|root| states_from_document(&root))
            .unwrap_or_default())
    }
}

impl StateMapSink for BinaryCacheStorage {
    fn sink_file_spec(&self) -> &str {
        &self.file_spec
    }

    fn current_states(&self) -> Result<StateMap> {
        self.cache.get_or_load(|| self.load_states())
    }

    fn write_states(&self, states: StateMap) -> Result<()> {
        let path = self.path();
        if states.is_empty() {
            if fs::delete_file(&path)? {
                log::debug!("Deleted cache {}", path.display());
            }
        } else {
            let encoded = binary::encode(&document_from_states(&self.options.root_element, &states));
            if fs::read_if_exists(&path)?.as_deref() != Some(encoded.as_slice()) {
                fs::write_atomically(&path, &encoded, self.options.clear_read_only)?;
                log::debug!("Wrote cache {} ({} bytes)", path.display(), encoded.len());
            }
        }
        self.cache.set(states);
        Ok(())
    }
}

impl StateStorage for BinaryCacheStorage {
    fn file_spec(&self) -> &str {
        &self.file_spec
    }

    fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    fn set_path(&self, path: PathBuf) {
        *self.path.write() = path;
        self.cache.invalidate();
    }

    fn load_local_data(&self) -> Result<Option<Element>> {
        self.read_document()
    }

    fn get_state(&self, component: &str) -> Result<Option<Element>> {
        self.cache
            .with_fragment(|| self.load_states(), component, |fragment| fragment.map(from_component_element))
    }

    fn component_names(&self) -> Result<Vec<String>> {
        Ok(self.current_states()?.into_keys().collect())
    }

    fn create_save_session_producer(self: Arc<Self>) -> Result<Option<Box<dyn SaveSessionProducer>>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(Box::new(StateMapSaveSessionProducer::new(self)?)))
    }

    fn analyze_external_change(&self, _changed: &[PathBuf]) -> Result<BTreeSet<String>> {
        let fresh = self.load_states()?;
        Ok(match self.cache.replace(fresh.clone()) {
            Some(previous) => changed_components(&previous, &fresh),
            None => fresh.keys().cloned().collect(),
        })
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cache.invalidate();
    }
}
