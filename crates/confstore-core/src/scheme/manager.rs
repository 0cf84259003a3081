use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kernel::constants::DEFAULT_SCHEME_EXTENSION;
use crate::kernel::error::{Error, Result};
use crate::scheme::data_holder::SchemeDataHolder;
use crate::scheme::digest::digest;
use crate::scheme::error::SchemeError;
use crate::scheme::naming::{unique_name, SchemeFile};
use crate::scheme::{Scheme, SchemeProcessor};
use crate::storage::descriptor::RoamingType;
use crate::storage::save_session::SaveResult;
use crate::storage::stream_provider::StreamProvider;
use crate::utils::fs::{self, StagedWrite};

enum Slot<T> {
    Lazy { name: String, holder: SchemeDataHolder },
    Loaded(T),
}

struct SchemeEntry<T> {
    slot: Slot<T>,
    /// File currently holding the scheme
    file: Option<SchemeFile>,
    /// Digest of the content the file holds
    persisted_digest: Option<String>,
    /// Digest of the bundled baseline, for bundled schemes
    bundled_digest: Option<String>,
    /// Written once with content differing from the baseline; stays a file
    detached: bool,
}

impl<T: Scheme> SchemeEntry<T> {
    fn name(&self) -> &str {
        match &self.slot {
            Slot::Lazy { name, .. } => name,
            Slot::Loaded(scheme) => scheme.name(),
        }
    }

    fn loaded(&self) -> Option<&T> {
        match &self.slot {
            Slot::Loaded(scheme) => Some(scheme),
            Slot::Lazy { .. } => None,
        }
    }
}

/// One scheme to be written in a save pass
struct PendingWrite {
    index: usize,
    name: String,
    old_file: Option<SchemeFile>,
    target: Option<SchemeFile>,
    content: Vec<u8>,
    digest: String,
}

enum Staged {
    Local(StagedWrite),
    Provider,
}

/// Named schemes stored one file per scheme in a directory.
///
/// Scheme states move from bundled-only to bundled-unmodified (a custom file
/// equal to the baseline), to custom once edited and saved, and to removed.
/// A scheme equal to its baseline is never written while it has not been
/// detached; once written it stays a file.
pub struct SchemeManager<T: Scheme, P: SchemeProcessor<T>> {
    dir_spec: String,
    dir: PathBuf,
    processor: P,
    extension: String,
    provider: Option<Arc<dyn StreamProvider>>,
    roaming: RoamingType,
    clear_read_only: bool,
    entries: Vec<SchemeEntry<T>>,
    current: Option<String>,
    files_to_delete: BTreeSet<String>,
    /// Keys of files skipped on load; never written over
    foreign_files: HashSet<String>,
}

impl<T: Scheme, P: SchemeProcessor<T>> SchemeManager<T, P> {
    /// `dir_spec` names the directory for stream providers, `dir` is its
    /// local location
    pub fn new(dir_spec: impl Into<String>, dir: PathBuf, processor: P) -> Self {
        Self {
            dir_spec: dir_spec.into(),
            dir,
            processor,
            extension: DEFAULT_SCHEME_EXTENSION.to_string(),
            provider: None,
            roaming: RoamingType::Default,
            clear_read_only: false,
            entries: Vec::new(),
            current: None,
            files_to_delete: BTreeSet::new(),
            foreign_files: HashSet::new(),
        }
    }

    /// Preferred file extension, including the dot
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_stream_provider(mut self, provider: Option<Arc<dyn StreamProvider>>, roaming: RoamingType) -> Self {
        self.provider = provider;
        self.roaming = roaming;
        self
    }

    pub fn with_clear_read_only(mut self, clear: bool) -> Self {
        self.clear_read_only = clear;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    fn applicable_provider(&self) -> Option<&Arc<dyn StreamProvider>> {
        self.provider
            .as_ref()
            .filter(|provider| provider.is_applicable(&self.dir_spec, self.roaming))
    }

    fn is_exclusive(&self) -> bool {
        self.applicable_provider().is_some_and(|provider| provider.is_exclusive())
    }

    fn provider_spec(&self, file_name: &str) -> String {
        format!("{}/{}", self.dir_spec.trim_end_matches('/'), file_name)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name() == name)
    }

    fn canonical(&self, scheme: &T) -> Result<(Vec<u8>, String)> {
        let content = self.processor.write_scheme(scheme)?.to_xml_string().into_bytes();
        let digest = digest(&content);
        Ok((content, digest))
    }

    /// Register a bundled scheme; returns its name
    pub fn load_bundled_scheme(&mut self, element: crate::xml::Element) -> Result<String> {
        let scheme = self.processor.read_scheme(element)?;
        let (_, bundled_digest) = self.canonical(&scheme)?;
        let name = scheme.name().to_string();

        if let Some(index) = self.index_of(&name) {
            self.materialize(index)?;
            let entry = &mut self.entries[index];
            entry.detached = entry.persisted_digest.as_deref() != Some(bundled_digest.as_str());
            entry.bundled_digest = Some(bundled_digest);
            return Ok(name);
        }

        self.processor.on_scheme_added(&scheme);
        self.entries.push(SchemeEntry {
            slot: Slot::Loaded(scheme),
            file: None,
            persisted_digest: None,
            bundled_digest: Some(bundled_digest),
            detached: false,
        });
        Ok(name)
    }

    /// Read the scheme files (local first, then stream provider entries with
    /// names not present locally). Files are parsed lazily; per-file failures
    /// are returned and the file is left alone.
    pub fn load_schemes(&mut self) -> Result<Vec<SchemeError>> {
        let mut local: BTreeMap<String, (SchemeFile, Vec<u8>)> = BTreeMap::new();

        if !self.is_exclusive() {
            for path in fs::list_files(&self.dir)? {
                if fs::is_hidden(&path) {
                    continue;
                }
                let Some(file) = fs::file_name_str(&path).and_then(|name| SchemeFile::parse(name, &self.extension))
                else {
                    continue;
                };
                let Some(bytes) = fs::read_if_exists(&path)? else {
                    continue;
                };
                self.add_found(&mut local, file, bytes);
            }
        }

        let mut remote: BTreeMap<String, (SchemeFile, Vec<u8>)> = BTreeMap::new();

        if let Some(provider) = self.applicable_provider().cloned() {
            let extension = self.extension.clone();
            let filter = |name: &str| SchemeFile::parse(name, &extension).is_some();
            let mut listed = Vec::new();
            provider.process_children(&self.dir_spec, self.roaming, &filter, &mut |name, bytes, _read_only| {
                if let Some(file) = SchemeFile::parse(name, &extension) {
                    listed.push((file, bytes.to_vec()));
                }
                Ok(true)
            })?;
            for (file, bytes) in listed {
                if !local.contains_key(&file.base.to_lowercase()) {
                    self.add_found(&mut remote, file, bytes);
                }
            }
        }

        // local files are registered first and win scheme name clashes
        let mut errors = Vec::new();
        for (_, (file, bytes)) in local.into_iter().chain(remote) {
            if bytes.is_empty() {
                log::warn!("Ignoring zero-length scheme file {}", file.file_name());
                continue;
            }
            if let Err(e) = self.add_loaded_file(file, bytes) {
                log::warn!("{}", e);
                errors.push(e);
            }
        }
        log::debug!("Loaded {} scheme(s) from {}", self.entries.len(), self.dir.display());
        Ok(errors)
    }

    /// Keep one file per base name. A base name present with both the
    /// preferred extension and `.xml` keeps the preferred file and deletes the
    /// other on the next save; any other clash is skipped and left on disk.
    fn add_found(&mut self, found: &mut BTreeMap<String, (SchemeFile, Vec<u8>)>, file: SchemeFile, bytes: Vec<u8>) {
        let key = file.base.to_lowercase();
        let Some((existing, _)) = found.get(&key) else {
            found.insert(key, (file, bytes));
            return;
        };

        if existing.base != file.base || existing.extension == file.extension {
            log::warn!("Ignoring scheme file {}: it clashes with {}", file.file_name(), existing.file_name());
            self.foreign_files.insert(file.key());
            return;
        }
        let keep_new = file.extension == self.extension;
        let loser = if keep_new { existing.file_name() } else { file.file_name() };
        log::info!("Scheme file {} is superseded and will be deleted", loser);
        self.files_to_delete.insert(loser);
        if keep_new {
            found.insert(key, (file, bytes));
        }
    }

    fn add_loaded_file(&mut self, file: SchemeFile, bytes: Vec<u8>) -> std::result::Result<(), SchemeError> {
        let holder = SchemeDataHolder::new(file.file_name(), bytes);
        let root = holder.root_attributes().map_err(|e| read_error(&file, e))?;
        let name = self.processor.scheme_name(&root).unwrap_or_else(|| file.base.clone());

        match self.index_of(&name) {
            None => {
                self.entries.push(SchemeEntry {
                    slot: Slot::Lazy { name, holder },
                    file: Some(file),
                    persisted_digest: None,
                    bundled_digest: None,
                    detached: false,
                });
                Ok(())
            }
            Some(index) if self.entries[index].bundled_digest.is_some() && self.entries[index].file.is_none() => {
                let element = holder.read().map_err(|e| read_error(&file, e))?;
                let scheme = self.processor.read_scheme(element).map_err(|e| read_error(&file, e))?;
                let (_, file_digest) = self.canonical(&scheme).map_err(|e| read_error(&file, e))?;
                let entry = &mut self.entries[index];
                entry.detached = entry.bundled_digest.as_deref() != Some(file_digest.as_str());
                entry.persisted_digest = Some(file_digest);
                entry.slot = Slot::Loaded(scheme);
                entry.file = Some(file);
                Ok(())
            }
            Some(_) => {
                log::warn!("Ignoring {}: another file defines scheme '{}'", file.file_name(), name);
                self.foreign_files.insert(file.key());
                Ok(())
            }
        }
    }

    fn materialize(&mut self, index: usize) -> Result<()> {
        let Slot::Lazy { holder, .. } = &self.entries[index].slot else {
            return Ok(());
        };
        let file_name = holder.file_name().to_string();
        let element = holder.read().map_err(|e| wrap_read(&file_name, e))?;
        let scheme = self.processor.read_scheme(element).map_err(|e| wrap_read(&file_name, e))?;
        let persisted = self.canonical(&scheme).ok().map(|(_, digest)| digest);

        let entry = &mut self.entries[index];
        entry.persisted_digest = persisted;
        entry.slot = Slot::Loaded(scheme);
        Ok(())
    }

    /// Digest of the file behind a lazy slot, taken before its scheme is
    /// replaced so an identical replacement is not written again
    fn lazy_file_digest(&self, slot: &Slot<T>) -> Option<String> {
        let Slot::Lazy { holder, .. } = slot else {
            return None;
        };
        let digest = holder
            .read()
            .and_then(|element| self.processor.read_scheme(element))
            .and_then(|scheme| self.canonical(&scheme));
        match digest {
            Ok((_, digest)) => Some(digest),
            Err(e) => {
                log::warn!("Cannot read {}: {}", holder.file_name(), e);
                None
            }
        }
    }

    /// Names in registration order, without parsing lazy schemes
    pub fn scheme_names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_scheme(&mut self, name: &str) -> Result<Option<&T>> {
        Ok(self.find_scheme_mut(name)?.map(|scheme| &*scheme))
    }

    /// Mutable access; use [`SchemeManager::rename_scheme`] to change names
    pub fn find_scheme_mut(&mut self, name: &str) -> Result<Option<&mut T>> {
        let Some(index) = self.index_of(name) else {
            return Ok(None);
        };
        self.materialize(index)?;
        Ok(match &mut self.entries[index].slot {
            Slot::Loaded(scheme) => Some(scheme),
            Slot::Lazy { .. } => None,
        })
    }

    /// All schemes, parsing lazy ones
    pub fn schemes(&mut self) -> Result<Vec<&T>> {
        for index in 0..self.entries.len() {
            self.materialize(index)?;
        }
        Ok(self.entries.iter().filter_map(SchemeEntry::loaded).collect())
    }

    /// Add a scheme. With `check_existing_name` a taken name becomes `name2`,
    /// `name3`, ...; without it a scheme of the same name is replaced (its
    /// file is reused). Returns the final name.
    pub fn add_scheme(&mut self, mut scheme: T, check_existing_name: bool) -> String {
        if check_existing_name {
            let unique = unique_name(scheme.name(), |candidate| self.index_of(candidate).is_some());
            if unique != scheme.name() {
                log::debug!("Scheme '{}' renamed to '{}' to keep names unique", scheme.name(), unique);
                scheme.set_name(&unique);
            }
        }
        let name = scheme.name().to_string();
        self.processor.on_scheme_added(&scheme);

        match self.index_of(&name) {
            Some(index) => {
                if let Some(digest) = self.lazy_file_digest(&self.entries[index].slot) {
                    self.entries[index].persisted_digest = Some(digest);
                }
                self.entries[index].slot = Slot::Loaded(scheme);
            }
            None => self.entries.push(SchemeEntry {
                slot: Slot::Loaded(scheme),
                file: None,
                persisted_digest: None,
                bundled_digest: None,
                detached: false,
            }),
        }
        name
    }

    /// Rename keeping names unique; returns the final name
    pub fn rename_scheme(&mut self, old: &str, new: &str) -> Result<String> {
        let index = self
            .index_of(old)
            .ok_or_else(|| SchemeError::NotFound(old.to_string()))?;
        if old == new {
            return Ok(new.to_string());
        }
        self.materialize(index)?;
        let unique = unique_name(new, |candidate| {
            self.index_of(candidate).is_some_and(|other| other != index)
        });
        if let Slot::Loaded(scheme) = &mut self.entries[index].slot {
            scheme.set_name(&unique);
        }
        if self.current.as_deref() == Some(old) {
            self.current = Some(unique.clone());
        }
        Ok(unique)
    }

    /// Remove a scheme; its file is deleted by the next save
    pub fn remove_scheme(&mut self, name: &str) -> Option<T> {
        let index = self.index_of(name)?;
        if let Err(e) = self.materialize(index) {
            log::warn!("Removing scheme '{}' without reading it: {}", name, e);
        }
        let entry = self.entries.remove(index);
        if let Some(file) = &entry.file {
            self.files_to_delete.insert(file.file_name());
        }

        let removed = match entry.slot {
            Slot::Loaded(scheme) => Some(scheme),
            Slot::Lazy { .. } => None,
        };
        if self.current.as_deref() == Some(name) {
            self.current = None;
            self.processor.on_current_scheme_switched(removed.as_ref(), None);
        }
        if let Some(scheme) = &removed {
            self.processor.on_scheme_deleted(scheme);
        }
        removed
    }

    /// Replace the whole list. Schemes whose name is no longer present are
    /// deleted on the next save; surviving names keep their files.
    pub fn set_schemes(&mut self, schemes: Vec<T>, current: Option<&str>) {
        let mut previous: BTreeMap<String, SchemeEntry<T>> = BTreeMap::new();
        for entry in self.entries.drain(..) {
            previous.entry(entry.name().to_string()).or_insert(entry);
        }

        for scheme in schemes {
            let entry = match previous.remove(scheme.name()) {
                Some(old) => SchemeEntry {
                    persisted_digest: self
                        .lazy_file_digest(&old.slot)
                        .or_else(|| old.persisted_digest.clone()),
                    slot: Slot::Loaded(scheme),
                    ..old
                },
                None => {
                    self.processor.on_scheme_added(&scheme);
                    SchemeEntry {
                        slot: Slot::Loaded(scheme),
                        file: None,
                        persisted_digest: None,
                        bundled_digest: None,
                        detached: false,
                    }
                }
            };
            self.entries.push(entry);
        }

        for (_, removed) in previous {
            if let Some(file) = &removed.file {
                self.files_to_delete.insert(file.file_name());
            }
            if let Slot::Loaded(scheme) = &removed.slot {
                self.processor.on_scheme_deleted(scheme);
            }
        }

        self.current = current.filter(|name| self.index_of(name).is_some()).map(str::to_owned);
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&mut self) -> Result<Option<&T>> {
        match self.current.clone() {
            Some(name) => self.find_scheme(&name),
            None => Ok(None),
        }
    }

    /// Switch the current scheme (`None` clears it)
    pub fn set_current(&mut self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            let index = self
                .index_of(name)
                .ok_or_else(|| SchemeError::NotFound(name.to_string()))?;
            self.materialize(index)?;
        }
        if let Some(old) = self.current.clone() {
            if let Some(index) = self.index_of(&old) {
                self.materialize(index)?;
            }
        }
        let old = self.current.take();
        self.current = name.map(str::to_owned);

        let old_scheme = old
            .as_deref()
            .and_then(|old| self.entries.iter().find(|entry| entry.name() == old))
            .and_then(SchemeEntry::loaded);
        let new_scheme = name
            .and_then(|name| self.entries.iter().find(|entry| entry.name() == name))
            .and_then(SchemeEntry::loaded);
        self.processor.on_current_scheme_switched(old_scheme, new_scheme);
        Ok(())
    }

    /// Write changed schemes and delete the files of removed or renamed ones.
    ///
    /// Every write is staged before any file is replaced or deleted, so two
    /// schemes swapping names never overwrite each other. A failing scheme
    /// only fails itself; a scheme whose target still holds a failed scheme's
    /// data is not written either.
    pub fn save(&mut self) -> SaveResult {
        let mut result = SaveResult::default();
        let mut busy: HashSet<String> = HashSet::new();
        let mut claimed: HashSet<String> = self.foreign_files.clone();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut writes: Vec<PendingWrite> = Vec::new();
        let mut redundant: Vec<(usize, SchemeFile)> = Vec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let name = entry.name().to_string();
            let scheme = match &entry.slot {
                Slot::Lazy { .. } => {
                    if let Some(file) = &entry.file {
                        claimed.insert(file.key());
                    }
                    seen_names.insert(name);
                    continue;
                }
                Slot::Loaded(scheme) => scheme,
            };

            if !seen_names.insert(name.clone()) {
                result.add_error(name.clone(), SchemeError::DuplicateName(name).into());
                if let Some(file) = &entry.file {
                    busy.insert(file.key());
                    claimed.insert(file.key());
                }
                continue;
            }
            if !self.processor.is_persistent(scheme) {
                if let Some(file) = &entry.file {
                    claimed.insert(file.key());
                }
                continue;
            }

            let (content, content_digest) = match self.canonical(scheme) {
                Ok(canonical) => canonical,
                Err(e) => {
                    result.add_error(name.clone(), write_error(&name, e));
                    if let Some(file) = &entry.file {
                        busy.insert(file.key());
                        claimed.insert(file.key());
                    }
                    continue;
                }
            };

            if !entry.detached && entry.bundled_digest.as_deref() == Some(content_digest.as_str()) {
                if let Some(file) = &entry.file {
                    redundant.push((index, file.clone()));
                }
                continue;
            }

            let desired = fs::sanitize_file_name(&name);
            let keeps_file = entry
                .file
                .as_ref()
                .is_some_and(|file| file.base == desired && file.extension == self.extension);
            if keeps_file {
                if let Some(file) = &entry.file {
                    claimed.insert(file.key());
                }
                if entry.persisted_digest.as_deref() == Some(content_digest.as_str()) {
                    continue;
                }
            }

            writes.push(PendingWrite {
                index,
                name,
                old_file: entry.file.clone(),
                target: keeps_file.then(|| entry.file.clone()).flatten(),
                content,
                digest: content_digest,
            });
        }

        for write in writes.iter_mut().filter(|write| write.target.is_none()) {
            let base = fs::sanitize_file_name(&write.name);
            let extension = self.extension.clone();
            let unique_base = unique_name(&base, |candidate| {
                claimed.contains(&SchemeFile::new(candidate, extension.as_str()).key())
            });
            let target = SchemeFile::new(unique_base, extension);
            claimed.insert(target.key());
            write.target = Some(target);
        }

        let mut failed: HashSet<usize> = HashSet::new();
        mark_busy_targets(&writes, &mut failed, &mut busy, &mut result);

        let exclusive = self.is_exclusive();
        let mut staged: Vec<(usize, Staged)> = Vec::new();
        for (position, write) in writes.iter().enumerate() {
            if failed.contains(&position) {
                continue;
            }
            let Some(target) = &write.target else {
                continue;
            };
            if exclusive {
                staged.push((position, Staged::Provider));
                continue;
            }
            match fs::stage_write(&self.dir.join(target.file_name()), &write.content, self.clear_read_only) {
                Ok(staged_write) => staged.push((position, Staged::Local(staged_write))),
                Err(e) => {
                    result.add_error(write.name.clone(), write_error(&write.name, e));
                    failed.insert(position);
                    if let Some(old) = &write.old_file {
                        busy.insert(old.key());
                    }
                }
            }
        }
        mark_busy_targets(&writes, &mut failed, &mut busy, &mut result);

        let mut written: HashSet<String> = HashSet::new();
        let mut committed: Vec<usize> = Vec::new();
        for (position, staged_write) in staged {
            if failed.contains(&position) {
                continue;
            }
            let write = &writes[position];
            let Some(target) = &write.target else {
                continue;
            };
            let outcome = match staged_write {
                Staged::Local(staged_write) => staged_write.commit().and_then(|()| {
                    self.mirror(|provider, spec| provider.write(spec, &write.content, self.roaming), target)
                }),
                Staged::Provider => self.with_provider(target, |provider, spec| {
                    provider.write(spec, &write.content, self.roaming)
                }),
            };
            match outcome {
                Ok(()) => {
                    log::debug!("Wrote scheme '{}' to {}", write.name, target.file_name());
                    written.insert(target.key());
                    committed.push(position);
                    result.changed.push(target.file_name());
                }
                Err(e) => {
                    result.add_error(write.name.clone(), write_error(&write.name, e));
                    failed.insert(position);
                    if let Some(old) = &write.old_file {
                        busy.insert(old.key());
                    }
                }
            }
        }

        let mut to_delete: BTreeMap<String, (String, Option<String>)> = BTreeMap::new();
        for file_name in &self.files_to_delete {
            to_delete.insert(file_name.to_lowercase(), (file_name.clone(), None));
        }
        for position in &committed {
            let write = &writes[*position];
            if let (Some(old), Some(target)) = (&write.old_file, &write.target) {
                if old != target {
                    to_delete.insert(old.key(), (old.file_name(), Some(write.name.clone())));
                }
            }
        }
        for (_, file) in &redundant {
            to_delete.insert(file.key(), (file.file_name(), None));
        }

        let mut deleted: HashSet<String> = HashSet::new();
        let mut settled: HashSet<String> = HashSet::new();
        for (key, (file_name, owner)) in to_delete {
            if written.contains(&key) || busy.contains(&key) {
                self.files_to_delete.remove(&file_name);
                continue;
            }
            let outcome = if exclusive {
                match self.applicable_provider() {
                    Some(provider) => provider.delete(&self.provider_spec(&file_name), self.roaming),
                    None => Ok(false),
                }
            } else {
                fs::delete_file(&self.dir.join(&file_name)).and_then(|removed| {
                    self.mirror_name(&file_name, |provider, spec| provider.delete(spec, self.roaming).map(|_| ()))?;
                    Ok(removed)
                })
            };
            match outcome {
                Ok(removed) => {
                    self.files_to_delete.remove(&file_name);
                    settled.insert(key.clone());
                    if removed {
                        log::debug!("Deleted scheme file {}", file_name);
                        deleted.insert(key);
                        result.changed.push(file_name);
                    }
                }
                Err(e) => {
                    let target = owner.unwrap_or_else(|| file_name.clone());
                    result.add_error(target, e);
                }
            }
        }

        for position in committed {
            let write = &writes[position];
            let entry = &mut self.entries[write.index];
            entry.file = write.target.clone();
            entry.persisted_digest = Some(write.digest.clone());
            if entry.bundled_digest.is_some() {
                entry.detached = true;
            }
        }
        for (index, file) in redundant {
            if settled.contains(&file.key()) {
                let entry = &mut self.entries[index];
                entry.file = None;
                entry.persisted_digest = None;
            }
        }

        if !deleted.is_empty() && !exclusive {
            if let Err(e) = self.remove_dir_if_unused() {
                result.add_error(self.dir.display().to_string(), e);
            }
        }
        result
    }

    fn remove_dir_if_unused(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(e, "read_dir", self.dir.clone())),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(e, "read_dir_entry", self.dir.clone()))?;
            if !fs::is_hidden(&entry.path()) {
                return Ok(());
            }
        }
        std::fs::remove_dir_all(&self.dir).map_err(|e| Error::io(e, "remove_dir_all", self.dir.clone()))?;
        log::debug!("Removed empty scheme directory {}", self.dir.display());
        Ok(())
    }

    fn with_provider<F>(&self, file: &SchemeFile, operation: F) -> Result<()>
    where
        F: FnOnce(&dyn StreamProvider, &str) -> Result<()>,
    {
        self.with_provider_name(&file.file_name(), operation)
    }

    fn with_provider_name<F>(&self, file_name: &str, operation: F) -> Result<()>
    where
        F: FnOnce(&dyn StreamProvider, &str) -> Result<()>,
    {
        match self.applicable_provider() {
            Some(provider) => operation(provider.as_ref(), &self.provider_spec(file_name)),
            None => Ok(()),
        }
    }

    fn mirror<F>(&self, operation: F, file: &SchemeFile) -> Result<()>
    where
        F: FnOnce(&dyn StreamProvider, &str) -> Result<()>,
    {
        self.mirror_name(&file.file_name(), operation)
    }

    fn mirror_name<F>(&self, file_name: &str, operation: F) -> Result<()>
    where
        F: FnOnce(&dyn StreamProvider, &str) -> Result<()>,
    {
        match self.applicable_provider().filter(|provider| !provider.is_exclusive()) {
            Some(provider) => operation(provider.as_ref(), &self.provider_spec(file_name)),
            None => Ok(()),
        }
    }
}

/// Fail writes whose target still holds data of a failed scheme, until no
/// more writes are affected
fn mark_busy_targets(
    writes: &[PendingWrite],
    failed: &mut HashSet<usize>,
    busy: &mut HashSet<String>,
    result: &mut SaveResult,
) {
    loop {
        let mut changed = false;
        for (position, write) in writes.iter().enumerate() {
            if failed.contains(&position) {
                continue;
            }
            let Some(target) = &write.target else {
                continue;
            };
            let own_file = write.old_file.as_ref().is_some_and(|old| old == target);
            if busy.contains(&target.key()) && !own_file {
                let error = SchemeError::TargetBusy {
                    name: write.name.clone(),
                    file: target.file_name(),
                };
                result.add_error(write.name.clone(), error.into());
                failed.insert(position);
                if let Some(old) = &write.old_file {
                    busy.insert(old.key());
                }
                changed = true;
            }
        }
        if !changed {
            return;
        }
    }
}

fn read_error(file: &SchemeFile, source: Error) -> SchemeError {
    SchemeError::Read {
        file: file.file_name(),
        source: Box::new(source),
    }
}

fn wrap_read(file_name: &str, source: Error) -> Error {
    SchemeError::Read {
        file: file_name.to_string(),
        source: Box::new(source),
    }
    .into()
}

fn write_error(name: &str, source: Error) -> Error {
    SchemeError::Write {
        name: name.to_string(),
        source: Box::new(source),
    }
    .into()
}
