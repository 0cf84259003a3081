use std::fmt::Debug;

use crate::kernel::error::Result;
use crate::storage::descriptor::RoamingType;

/// Receives the content of a read; `None` when the provider has no such entry
pub type ReadConsumer<'a> = dyn FnMut(Option<&[u8]>) -> Result<()> + 'a;

/// Receives `(name, content, read_only)` for each child entry; returns
/// `false` to stop the enumeration
pub type ChildProcessor<'a> = dyn FnMut(&str, &[u8], bool) -> Result<bool> + 'a;

/// Roaming or remote storage backend, supplied by the embedding application.
///
/// File specs passed here are the collapsed, `/`-separated specs of the
/// storages (for example `options/editor.xml`). An exclusive provider replaces
/// the local disk for every spec it reports applicable; a non-exclusive one
/// receives a copy of every local write and delete.
pub trait StreamProvider: Send + Sync + Debug {
    /// Whether local disk must be left untouched for applicable specs
    fn is_exclusive(&self) -> bool;

    fn is_applicable(&self, _file_spec: &str, roaming: RoamingType) -> bool {
        roaming.is_roamable()
    }

    fn write(&self, file_spec: &str, content: &[u8], roaming: RoamingType) -> Result<()>;

    fn read(&self, file_spec: &str, roaming: RoamingType, consumer: &mut ReadConsumer<'_>) -> Result<()>;

    /// Returns whether an entry was removed
    fn delete(&self, file_spec: &str, roaming: RoamingType) -> Result<bool>;

    /// Enumerate the direct children of `path_prefix` whose names pass `filter`
    fn process_children(
        &self,
        path_prefix: &str,
        roaming: RoamingType,
        filter: &dyn Fn(&str) -> bool,
        processor: &mut ChildProcessor<'_>,
    ) -> Result<()>;
}

/// Read an entry into an owned buffer
pub fn read_bytes(provider: &dyn StreamProvider, file_spec: &str, roaming: RoamingType) -> Result<Option<Vec<u8>>> {
    let mut content = None;
    provider.read(file_spec, roaming, &mut |data| {
        content = data.map(<[u8]>::to_vec);
        Ok(())
    })?;
    Ok(content)
}
