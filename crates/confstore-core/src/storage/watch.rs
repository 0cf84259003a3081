use std::fmt::Debug;
use std::path::Path;

/// Identifies one watch subscription
pub type WatchHandle = u64;

/// File-system watch service supplied by the embedding application.
///
/// The engine subscribes to the backing path of every storage it creates and
/// expects change notifications to be delivered to
/// [`ComponentStore::notify_files_changed`](crate::component::ComponentStore::notify_files_changed).
pub trait FileWatcher: Send + Sync + Debug {
    fn watch(&self, path: &Path) -> WatchHandle;
    fn unwatch(&self, handle: WatchHandle);
}
