use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;
use tempfile::TempDir;

use crate::component::{ComponentSpec, ComponentStore};
use crate::event::{StoreEvent, StoreListener};
use crate::storage::descriptor::StorageDescriptor;
use crate::storage::obsolete::{ObsoleteStorageDeclaration, ObsoleteStorageRegistry};
use crate::tests::common::{app_manager, MemoryStreamProvider, TestComponent};

const EDITOR_SPEC: &str = "$APP_CONFIG$/editor.xml";

fn editor_document(font: &str) -> String {
    format!("<application><component name=\"Editor\"><option name=\"font\" value=\"{font}\"/></component></application>")
}

#[derive(Debug, Default)]
struct EventLog(parking_lot::Mutex<Vec<String>>);

impl StoreListener for EventLog {
    fn on_event(&self, event: &StoreEvent) {
        self.0.lock().push(event.name().to_string());
    }
}

#[tokio::test]
async fn test_external_change_during_save_is_applied_after_it() {
    let tmp = TempDir::new().unwrap();
    let provider = MemoryStreamProvider::slow(Duration::from_millis(200));
    provider.put(EDITOR_SPEC, editor_document("Mono"));

    // Reading the never-loaded obsolete file keeps the save pass busy
    let registry = Arc::new(ObsoleteStorageRegistry::new());
    registry.register(ObsoleteStorageDeclaration::new("options/legacy.xml", &["Gone"], false));
    let manager = app_manager(tmp.path()).with_stream_provider(Some(provider.clone()));
    let store = ComponentStore::new(Arc::new(manager)).with_obsolete_registry(registry);
    let log = Arc::new(EventLog::default());
    store.events().register_listener(log.clone());

    let editor = TestComponent::new();
    store
        .register_component(
            ComponentSpec::new("Editor").storage(StorageDescriptor::new("options/editor.xml")),
            editor.clone(),
        )
        .unwrap();
    store.init_all_components().await.unwrap();
    assert_eq!(editor.option("font").as_deref(), Some("Mono"));

    let path = tmp.path().join("options").join("editor.xml");
    let (result, during) = tokio::join!(store.save(false), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        provider.put(EDITOR_SPEC, editor_document("Fira"));
        let reloaded = store.notify_files_changed(vec![path.clone()]).await;
        (reloaded, editor.option("font"))
    });

    assert!(result.is_ok(), "{:?}", result.errors);
    let (reloaded, font_during_save) = during;
    assert!(reloaded.unwrap().is_empty(), "the notification is queued");
    assert_eq!(font_during_save.as_deref(), Some("Mono"));
    assert_eq!(editor.option("font").as_deref(), Some("Fira"), "applied once the save completed");
    assert_eq!(
        log.0.lock().clone(),
        vec!["store.save_completed", "store.files_changed", "store.component_reloaded"]
    );
}

#[tokio::test]
async fn test_cancelled_load_leaves_component_untouched() {
    let tmp = TempDir::new().unwrap();
    let provider = MemoryStreamProvider::slow(Duration::from_millis(300));
    provider.put(EDITOR_SPEC, editor_document("Mono"));
    let manager = app_manager(tmp.path()).with_stream_provider(Some(provider));
    let store = ComponentStore::new(Arc::new(manager));
    let editor = TestComponent::new();
    store
        .register_component(
            ComponentSpec::new("Editor").storage(StorageDescriptor::new("options/editor.xml")),
            editor.clone(),
        )
        .unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(50), store.init_component("Editor")).await;
    assert!(cancelled.is_err(), "the load should still be reading");
    assert!(!store.is_loaded("Editor"));
    assert!(editor.state().is_none());
    assert_eq!(editor.loads.load(Ordering::SeqCst), 0);
    assert_eq!(editor.initialized.load(Ordering::SeqCst), 0);

    // Let the orphaned read finish before retrying
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(editor.state().is_none());

    store.init_component("Editor").await.unwrap();
    assert_eq!(editor.option("font").as_deref(), Some("Mono"));
    assert_eq!(editor.initialized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_saves_are_serialized() {
    let tmp = TempDir::new().unwrap();
    let store = ComponentStore::new(Arc::new(app_manager(tmp.path())));
    let editor = TestComponent::new();
    store
        .register_component(
            ComponentSpec::new("Editor").storage(StorageDescriptor::new("options/editor.xml")),
            editor.clone(),
        )
        .unwrap();
    store.init_all_components().await.unwrap();
    editor.set_option("font", "Mono");

    let results = join_all((0..3).map(|_| store.save(false))).await;
    assert!(results.iter().all(|result| result.is_ok()));
    let writes: usize = results.iter().map(|result| result.changed.len()).sum();
    assert_eq!(writes, 1, "later passes see the first one's result");
}
