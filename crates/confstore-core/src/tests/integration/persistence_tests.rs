use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;

use crate::component::{ComponentSpec, ComponentStore};
use crate::kernel::error::Error;
use crate::storage::descriptor::{RoamingType, StorageDescriptor};
use crate::storage::error::StorageSystemError;
use crate::tests::common::{app_store, read_string, TestComponent, TEST_OS};

fn options_file(root: &Path, name: &str) -> PathBuf {
    root.join("options").join(name)
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn register(store: &ComponentStore, name: &str, descriptors: Vec<StorageDescriptor>) -> std::sync::Arc<TestComponent> {
    let component = TestComponent::new();
    let spec = descriptors
        .into_iter()
        .fold(ComponentSpec::new(name), |spec, descriptor| spec.storage(descriptor));
    store.register_component(spec, component.clone()).unwrap();
    component
}

#[tokio::test]
async fn test_round_trip_then_idle_save_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let store = app_store(tmp.path());
    let editor = register(&store, "Editor", vec![StorageDescriptor::new("options/editor.xml")]);
    let keymap = register(&store, "Keymap", vec![StorageDescriptor::new("options/editor.xml")]);
    store.init_all_components().await.unwrap();

    editor.set_option("font", "Mono");
    keymap.set_option("active", "Emacs");
    let first = store.save(false).await;
    assert_eq!(first.changed, vec!["$APP_CONFIG$/editor.xml"]);

    let path = options_file(tmp.path(), "editor.xml");
    assert_eq!(
        read_string(&path),
        "\
<application>
  <component name=\"Editor\">
    <option name=\"font\" value=\"Mono\" />
  </component>
  <component name=\"Keymap\">
    <option name=\"active\" value=\"Emacs\" />
  </component>
</application>
"
    );
    let written = fs::metadata(&path).unwrap().modified().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let second = store.save(false).await;
    assert!(second.is_ok() && second.changed.is_empty());
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), written);

    let reopened = app_store(tmp.path());
    let restored = register(&reopened, "Keymap", vec![StorageDescriptor::new("$APP_CONFIG$/editor.xml")]);
    reopened.init_all_components().await.unwrap();
    assert_eq!(restored.option("active").as_deref(), Some("Emacs"));
}

#[tokio::test]
async fn test_component_moves_from_deprecated_file() {
    let tmp = TempDir::new().unwrap();
    let old = options_file(tmp.path(), "old.xml");
    write(
        &old,
        "<application>\
           <component name=\"A\"><option name=\"foo\" value=\"old\"/></component>\
           <component name=\"B\"><option name=\"bar\" value=\"kept\"/></component>\
         </application>",
    );
    let store = app_store(tmp.path());
    let a = register(
        &store,
        "A",
        vec![
            StorageDescriptor::new("options/new.xml"),
            StorageDescriptor::new("options/old.xml").deprecated(),
        ],
    );
    store.init_component("A").await.unwrap();
    assert_eq!(a.option("foo").as_deref(), Some("old"));

    a.set_option("foo", "newValue");
    let result = store.save(false).await;
    assert!(result.is_ok(), "{:?}", result.errors);

    let new = read_string(&options_file(tmp.path(), "new.xml"));
    assert!(new.contains("<option name=\"foo\" value=\"newValue\" />"), "{new}");
    let old = read_string(&old);
    assert!(!old.contains("name=\"A\""), "{old}");
    assert!(old.contains("<option name=\"bar\" value=\"kept\" />"), "{old}");
}

#[tokio::test]
async fn test_emptied_deprecated_file_is_deleted() {
    let tmp = TempDir::new().unwrap();
    let old = tmp.path().join("legacy").join("old.xml");
    write(
        &old,
        "<application><component name=\"A\"><option name=\"foo\" value=\"old\"/></component></application>",
    );
    let store = app_store(tmp.path());
    let a = register(
        &store,
        "A",
        vec![
            StorageDescriptor::new("options/new.xml"),
            StorageDescriptor::new("legacy/old.xml").deprecated(),
        ],
    );
    store.init_component("A").await.unwrap();
    assert_eq!(a.option("foo").as_deref(), Some("old"));

    store.save(false).await.into_result().unwrap();
    assert!(!old.exists());
    assert!(!old.parent().unwrap().exists(), "the emptied directory is pruned");
    assert!(read_string(&options_file(tmp.path(), "new.xml")).contains("value=\"old\""));
}

#[tokio::test]
async fn test_per_os_storage_migrates_legacy_file() {
    let tmp = TempDir::new().unwrap();
    let legacy = options_file(tmp.path(), "keymap.xml");
    write(
        &legacy,
        "<application><component name=\"Keymap\"><option name=\"active\" value=\"Emacs\"/></component></application>",
    );
    let store = app_store(tmp.path());
    let keymap = register(
        &store,
        "Keymap",
        vec![StorageDescriptor::new("options/keymap.xml").roaming(RoamingType::PerOs)],
    );
    store.init_all_components().await.unwrap();
    assert_eq!(keymap.option("active").as_deref(), Some("Emacs"));

    let result = store.save(false).await;
    assert!(result.is_ok(), "{:?}", result.errors);

    let per_os = tmp.path().join("options").join(TEST_OS).join("keymap.xml");
    assert!(read_string(&per_os).contains("value=\"Emacs\""));
    assert!(!legacy.exists(), "the legacy file is removed once migrated");
}

#[tokio::test]
async fn test_per_os_migration_runs_for_unchanged_tracking_component() {
    let tmp = TempDir::new().unwrap();
    let legacy = options_file(tmp.path(), "keymap.xml");
    write(
        &legacy,
        "<application><component name=\"Keymap\"><option name=\"active\" value=\"Emacs\"/></component></application>",
    );
    let store = app_store(tmp.path());
    let keymap = TestComponent::tracking();
    let spec = ComponentSpec::new("Keymap")
        .storage(StorageDescriptor::new("options/keymap.xml").roaming(RoamingType::PerOs));
    store.register_component(spec, keymap.clone()).unwrap();
    store.init_all_components().await.unwrap();
    assert_eq!(keymap.option("active").as_deref(), Some("Emacs"));

    let result = store.save(false).await;
    assert!(result.is_ok(), "{:?}", result.errors);

    let per_os = tmp.path().join("options").join(TEST_OS).join("keymap.xml");
    assert!(read_string(&per_os).contains("value=\"Emacs\""));
    assert!(!legacy.exists());
    assert!(keymap.state_reads.load(Ordering::SeqCst) > 0);

    let reads = keymap.state_reads.load(Ordering::SeqCst);
    store.save(false).await.into_result().unwrap();
    assert_eq!(keymap.state_reads.load(Ordering::SeqCst), reads, "nothing pending once migrated");
}

#[cfg(unix)]
#[tokio::test]
async fn test_read_only_file_fails_only_its_target() {
    let tmp = TempDir::new().unwrap();
    let locked = options_file(tmp.path(), "locked.xml");
    write(
        &locked,
        "<application><component name=\"Locked\"><option name=\"a\" value=\"1\"/></component></application>",
    );
    let mut permissions = fs::metadata(&locked).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(&locked, permissions).unwrap();

    let store = app_store(tmp.path());
    let locked_component = register(&store, "Locked", vec![StorageDescriptor::new("options/locked.xml")]);
    let free = register(&store, "Free", vec![StorageDescriptor::new("options/free.xml")]);
    store.init_all_components().await.unwrap();
    locked_component.set_option("a", "2");
    free.set_option("b", "3");

    let result = store.save(false).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].target, "$APP_CONFIG$/locked.xml");
    assert!(matches!(
        result.errors[0].error,
        Error::StorageSystem(StorageSystemError::ReadOnly(_))
    ));
    assert_eq!(result.changed, vec!["$APP_CONFIG$/free.xml"]);
    assert!(read_string(&locked).contains("value=\"1\""));
}

#[tokio::test]
async fn test_zero_length_file_means_no_state() {
    let tmp = TempDir::new().unwrap();
    let empty = options_file(tmp.path(), "editor.xml");
    write(&empty, "");

    let store = app_store(tmp.path());
    let editor = register(&store, "Editor", vec![StorageDescriptor::new("options/editor.xml")]);
    store.init_all_components().await.unwrap();
    assert_eq!(editor.defaults.load(Ordering::SeqCst), 1);

    let result = store.save(false).await;
    assert!(result.is_ok() && result.changed.is_empty());
    assert_eq!(fs::metadata(&empty).unwrap().len(), 0, "the empty file is left alone");

    editor.set_option("font", "Mono");
    store.save(false).await.into_result().unwrap();
    assert!(read_string(&empty).contains("value=\"Mono\""));
}

#[tokio::test]
async fn test_broken_state_does_not_block_other_components() {
    let tmp = TempDir::new().unwrap();
    write(
        &options_file(tmp.path(), "editor.xml"),
        "<application>\
           <component name=\"Broken\"><option name=\"a\" value=\"1\"/></component>\
           <component name=\"Fine\"><option name=\"b\" value=\"2\"/></component>\
         </application>",
    );
    let store = app_store(tmp.path());
    let broken = register(&store, "Broken", vec![StorageDescriptor::new("options/editor.xml")]);
    let fine = register(&store, "Fine", vec![StorageDescriptor::new("options/editor.xml")]);
    broken.fail_load.store(true, Ordering::SeqCst);

    assert!(store.init_all_components().await.is_err());
    assert!(store.is_loaded("Fine") && !store.is_loaded("Broken"));
    assert_eq!(fine.option("b").as_deref(), Some("2"));

    // The unloaded component's data survives a save of its neighbours
    fine.set_option("b", "3");
    store.save(false).await.into_result().unwrap();
    let content = read_string(&options_file(tmp.path(), "editor.xml"));
    assert!(content.contains("<component name=\"Broken\">"), "{content}");

    broken.fail_load.store(false, Ordering::SeqCst);
    store.init_all_components().await.unwrap();
    assert_eq!(broken.option("a").as_deref(), Some("1"));
}
