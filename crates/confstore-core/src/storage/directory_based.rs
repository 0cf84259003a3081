use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::kernel::constants::COMPONENT_TAG;
use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::save_session::{SaveSessionProducer, StateMapSaveSessionProducer, StateMapSink};
use crate::storage::state_storage::{
    changed_components, from_component_element, to_component_element, CachedStateMap, StateMap, StateStorage,
    StorageOptions, STATE_TAG,
};
use crate::utils::fs;
use crate::xml::{self, Element};

const FILE_EXTENSION: &str = ".xml";

/// Splits a component state into one document per file and merges it back.
pub trait StateSplitter: Send + Sync + Debug {
    /// `(file name, part)` pairs; file names must be unique
    fn split_state(&self, state: &Element) -> Vec<(String, Element)>;

    /// Rebuild the state from the parts read back, in file name order
    fn merge_states(&self, parts: Vec<Element>) -> Element;
}

/// One file per child element, named after the child's `name` attribute (or
/// another configured attribute). Attributes and text of the state root are
/// not kept.
#[derive(Debug, Clone)]
pub struct NamedChildSplitter {
    attribute: String,
}

impl NamedChildSplitter {
    pub fn new() -> Self {
        Self::by_attribute("name")
    }

    pub fn by_attribute(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl Default for NamedChildSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSplitter for NamedChildSplitter {
    fn split_state(&self, state: &Element) -> Vec<(String, Element)> {
        let mut used = BTreeSet::new();
        let mut parts = Vec::with_capacity(state.children().len());
        for child in state.children() {
            let stem = fs::sanitize_file_name(child.attribute(&self.attribute).unwrap_or(child.name()));
            let mut file_name = format!("{stem}{FILE_EXTENSION}");
            let mut counter = 2;
            while !used.insert(file_name.to_lowercase()) {
                file_name = format!("{stem}{counter}{FILE_EXTENSION}");
                counter += 1;
            }
            parts.push((file_name, child.clone()));
        }
        parts
    }

    fn merge_states(&self, parts: Vec<Element>) -> Element {
        let mut state = Element::new(STATE_TAG);
        for part in parts {
            state.add_child(part);
        }
        state
    }
}

/// A directory holding one XML file per part of a component state.
///
/// Each file is a `<component name="...">` document wrapping one part. Only
/// changed files are rewritten, files of vanished parts are deleted and the
/// directory is removed once it is empty. The directory is never handed to a
/// stream provider.
#[derive(Debug)]
pub struct DirectoryBasedStorage {
    file_spec: String,
    dir: RwLock<PathBuf>,
    splitter: Arc<dyn StateSplitter>,
    options: StorageOptions,
    cache: CachedStateMap,
    disposed: AtomicBool,
}

impl DirectoryBasedStorage {
    pub fn new(
        file_spec: impl Into<String>,
        dir: PathBuf,
        splitter: Arc<dyn StateSplitter>,
        options: StorageOptions,
    ) -> Self {
        Self {
            file_spec: file_spec.into(),
            dir: RwLock::new(dir),
            splitter,
            options,
            cache: CachedStateMap::default(),
            disposed: AtomicBool::new(false),
        }
    }

    fn part_files(&self) -> Result<Vec<PathBuf>> {
        Ok(fs::list_files(&self.path())?
            .into_iter()
            .filter(|path| !fs::is_hidden(path))
            .filter(|path| fs::file_name_str(path).is_some_and(|name| name.ends_with(FILE_EXTENSION)))
            .collect())
    }

    fn load_states(&self) -> Result<StateMap> {
        let mut parts: BTreeMap<String, Vec<Element>> = BTreeMap::new();
        for file in self.part_files()? {
            let Some(bytes) = fs::read_if_exists(&file)? else {
                continue;
            };
            if bytes.is_empty() {
                log::warn!("Ignoring zero-length file {}", file.display());
                continue;
            }
            let root = xml::parse(&bytes).map_err(|e| StorageSystemError::xml(e, file.clone()))?;
            let name = match (root.name(), root.attribute("name")) {
                (COMPONENT_TAG, Some(name)) => name.to_string(),
                _ => {
                    log::warn!("Ignoring {}: not a component document", file.display());
                    continue;
                }
            };
            parts.entry(name).or_default().extend(root.children().iter().cloned());
        }

        Ok(parts
            .into_iter()
            .map(|(name, parts)| {
                let merged = self.splitter.merge_states(parts);
                let fragment = to_component_element(&name, &merged);
                (name, fragment)
            })
            .collect())
    }

    /// File name -> rendered content for every part of `states`
    fn render(&self, states: &StateMap) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        for (name, fragment) in states {
            let state = from_component_element(fragment);
            for (file_name, part) in self.splitter.split_state(&state) {
                let document = Element::new(COMPONENT_TAG).with_attribute("name", name.as_str()).with_child(part);
                if files
                    .insert(file_name.clone(), document.to_xml_string().into_bytes())
                    .is_some()
                {
                    log::warn!("Part file {} of {} produced twice; keeping the last", file_name, self.file_spec);
                }
            }
        }
        files
    }
}

impl StateMapSink for DirectoryBasedStorage {
    fn sink_file_spec(&self) -> &str {
        &self.file_spec
    }

    fn current_states(&self) -> Result<StateMap> {
        self.cache.get_or_load(|| self.load_states())
    }

    fn write_states(&self, states: StateMap) -> Result<()> {
        let dir = self.path();
        let files = self.render(&states);

        for (file_name, content) in &files {
            let path = dir.join(file_name);
            if fs::read_if_exists(&path)?.as_deref() != Some(content.as_slice()) {
                fs::write_atomically(&path, content, self.options.clear_read_only)?;
                log::debug!("Wrote {}", path.display());
            }
        }

        let mut deleted = false;
        for existing in self.part_files()? {
            let keep = fs::file_name_str(&existing).is_some_and(|name| files.contains_key(name));
            if !keep && fs::delete_file(&existing)? {
                log::debug!("Deleted {}", existing.display());
                deleted = true;
            }
        }
        if deleted || files.is_empty() {
            fs::remove_dir_if_empty(&dir)?;
        }

        self.cache.set(states);
        Ok(())
    }
}

impl StateStorage for DirectoryBasedStorage {
    fn file_spec(&self) -> &str {
        &self.file_spec
    }

    fn path(&self) -> PathBuf {
        self.dir.read().clone()
    }

    fn set_path(&self, path: PathBuf) {
        *self.dir.write() = path;
        self.cache.invalidate();
    }

    fn load_local_data(&self) -> Result<Option<Element>> {
        let states = self.load_states()?;
        if states.is_empty() {
            return Ok(None);
        }
        let mut root = self.options.root_element.clone();
        for fragment in states.into_values() {
            root.add_child(fragment);
        }
        Ok(Some(root))
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
