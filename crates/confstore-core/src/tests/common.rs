//! Fixtures shared by the unit and integration tests.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::component::{ComponentStore, PersistentStateComponent};
use crate::config::path_value;
use crate::kernel::constants::{APP_CONFIG_MACRO, CACHE_DIR_MACRO, OPTIONS_DIR_NAME, ROOT_CONFIG_MACRO};
use crate::kernel::error::{Error, Result};
use crate::storage::descriptor::{RoamingType, StoreScope};
use crate::storage::error::StorageSystemError;
use crate::storage::macros::Macro;
use crate::storage::manager::StateStorageManager;
use crate::storage::state_storage::StateStorage;
use crate::storage::stream_provider::{ChildProcessor, ReadConsumer, StreamProvider};
use crate::storage::watch::{FileWatcher, WatchHandle};
use crate::xml::Element;

pub const TEST_OS: &str = "linux";

/// Component keeping its state in memory, built from `<option>` children
#[derive(Debug, Default)]
pub struct TestComponent {
    state: Mutex<Option<Element>>,
    modifications: AtomicU64,
    track_modifications: bool,
    pub loads: AtomicUsize,
    pub state_reads: AtomicUsize,
    pub defaults: AtomicUsize,
    pub initialized: AtomicUsize,
    pub fail_load: AtomicBool,
}

impl TestComponent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reports a modification count, enabling the unchanged fast path
    pub fn tracking() -> Arc<Self> {
        Arc::new(Self {
            track_modifications: true,
            ..Self::default()
        })
    }

    pub fn set_option(&self, name: &str, value: &str) {
        let mut state = self.state.lock();
        state.get_or_insert_with(|| Element::new("state")).set_option(name, Some(value));
        self.modifications.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: Option<Element>) {
        *self.state.lock() = state;
        self.modifications.fetch_add(1, Ordering::SeqCst);
    }

    pub fn state(&self) -> Option<Element> {
        self.state.lock().clone()
    }

    pub fn option(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.option_value(name))
            .map(str::to_owned)
    }
}

impl PersistentStateComponent for TestComponent {
    fn get_state(&self) -> Result<Option<Element>> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().clone())
    }

    fn load_state(&self, state: Element) -> Result<()> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Error::from("state refused"));
        }
        *self.state.lock() = Some(state);
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn no_state_loaded(&self) {
        self.defaults.fetch_add(1, Ordering::SeqCst);
    }

    fn initialize_component(&self) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
    }

    fn state_modification_count(&self) -> Option<u64> {
        self.track_modifications
            .then(|| self.modifications.load(Ordering::SeqCst))
    }
}

/// Stream provider keeping entries in a map and recording every call
#[derive(Debug, Default)]
pub struct MemoryStreamProvider {
    exclusive: bool,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    pub writes: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_writes: AtomicBool,
    read_delay: Option<Duration>,
}

impl MemoryStreamProvider {
    pub fn exclusive() -> Arc<Self> {
        Arc::new(Self {
            exclusive: true,
            ..Self::default()
        })
    }

    pub fn mirror() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Exclusive provider whose reads block for `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            exclusive: true,
            read_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn put(&self, spec: &str, content: impl Into<Vec<u8>>) {
        self.entries.lock().insert(spec.to_string(), content.into());
    }

    pub fn get(&self, spec: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(spec).cloned()
    }

    pub fn get_string(&self, spec: &str) -> Option<String> {
        self.get(spec).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl StreamProvider for MemoryStreamProvider {
    fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn write(&self, file_spec: &str, content: &[u8], _roaming: RoamingType) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageSystemError::StreamProvider {
                file_spec: file_spec.to_string(),
                operation: "write".to_string(),
                message: "remote unavailable".to_string(),
            }
            .into());
        }
        self.writes.lock().push(file_spec.to_string());
        self.put(file_spec, content);
        Ok(())
    }

    fn read(&self, file_spec: &str, _roaming: RoamingType, consumer: &mut ReadConsumer<'_>) -> Result<()> {
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        let content = self.get(file_spec);
        consumer(content.as_deref())
    }

    fn delete(&self, file_spec: &str, _roaming: RoamingType) -> Result<bool> {
        self.deletes.lock().push(file_spec.to_string());
        Ok(self.entries.lock().remove(file_spec).is_some())
    }

    fn process_children(
        &self,
        path_prefix: &str,
        _roaming: RoamingType,
        filter: &dyn Fn(&str) -> bool,
        processor: &mut ChildProcessor<'_>,
    ) -> Result<()> {
        let prefix = format!("{}/", path_prefix.trim_end_matches('/'));
        let children: Vec<(String, Vec<u8>)> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(spec, bytes)| {
                spec.strip_prefix(&prefix)
                    .filter(|name| !name.contains('/'))
                    .map(|name| (name.to_string(), bytes.clone()))
            })
            .collect();
        for (name, bytes) in children {
            if filter(&name) && !processor(&name, &bytes, false)? {
                break;
            }
        }
        Ok(())
    }
}

/// File watcher recording subscriptions in order
#[derive(Debug, Default)]
pub struct RecordingWatcher {
    next: AtomicU64,
    active: Mutex<BTreeMap<WatchHandle, PathBuf>>,
    pub log: Mutex<Vec<String>>,
}

impl RecordingWatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.active.lock().values().cloned().collect()
    }
}

impl FileWatcher for RecordingWatcher {
    fn watch(&self, path: &Path) -> WatchHandle {
        let handle = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.lock().insert(handle, path.to_path_buf());
        self.log.lock().push(format!("watch {}", path.display()));
        handle
    }

    fn unwatch(&self, handle: WatchHandle) {
        if let Some(path) = self.active.lock().remove(&handle) {
            self.log.lock().push(format!("unwatch {}", path.display()));
        }
    }
}

/// Application macro table rooted at `root`
pub fn app_macros(root: &Path) -> Vec<Macro> {
    vec![
        Macro::new(ROOT_CONFIG_MACRO, path_value(root)),
        Macro::new(APP_CONFIG_MACRO, path_value(&root.join(OPTIONS_DIR_NAME))),
        Macro::new(CACHE_DIR_MACRO, path_value(&root.join("cache"))),
    ]
}

pub fn app_manager(root: &Path) -> StateStorageManager {
    StateStorageManager::new(StoreScope::Application, app_macros(root), TEST_OS)
}

pub fn app_store(root: &Path) -> ComponentStore {
    ComponentStore::new(Arc::new(app_manager(root)))
}

/// `<state>` with one `<option>` per pair
pub fn option_state(options: &[(&str, &str)]) -> Element {
    let mut state = Element::new("state");
    for (name, value) in options {
        state.set_option(name, Some(value));
    }
    state
}

pub fn read_string(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

/// Run one save pass against `storage`; returns whether a session was committed
pub fn save_states(storage: &Arc<dyn StateStorage>, states: Vec<(&str, Option<Element>)>) -> Result<bool> {
    let Some(mut producer) = Arc::clone(storage).create_save_session_producer()? else {
        return Ok(false);
    };
    for (component, state) in states {
        producer.set_state(component, state)?;
    }
    match producer.create_save_session()? {
        Some(session) => {
            session.save()?;
            Ok(true)
        }
        None => Ok(false),
    }
}
