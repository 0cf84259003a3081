use std::fs;

use tempfile::TempDir;

use crate::kernel::error::Error;
use crate::storage::error::StorageSystemError;
use crate::utils::fs::{
    delete_file, is_hidden, list_files, read_if_exists, remove_dir_if_empty, sanitize_file_name, stage_write,
    write_atomically,
};

#[test]
fn test_read_missing_file_is_none() {
    let tmp = TempDir::new().unwrap();
    assert!(read_if_exists(&tmp.path().join("missing.xml")).unwrap().is_none());
}

#[test]
fn test_write_atomically_creates_parents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("a").join("b").join("file.xml");
    write_atomically(&path, b"<application />", false).unwrap();
    assert_eq!(read_if_exists(&path).unwrap().as_deref(), Some(&b"<application />"[..]));
}

#[test]
fn test_staged_write_is_invisible_until_commit() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("scheme.xml");
    fs::write(&path, "old").unwrap();

    let staged = stage_write(&path, b"new", false).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    staged.commit().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "new");

    drop(stage_write(&path, b"discarded", false).unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    assert_eq!(list_files(tmp.path()).unwrap(), vec![path], "dropped stage leaves no temp file");
}

#[cfg(unix)]
#[test]
fn test_read_only_target_is_rejected_unless_cleared() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("locked.xml");
    fs::write(&path, "old").unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(&path, permissions).unwrap();

    let err = write_atomically(&path, b"new", false).unwrap_err();
    assert!(matches!(err, Error::StorageSystem(StorageSystemError::ReadOnly(_))));

    write_atomically(&path, b"new", true).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "new");
}

#[test]
fn test_delete_and_prune() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("options");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.xml"), "x").unwrap();

    assert!(!remove_dir_if_empty(&dir).unwrap());
    assert!(delete_file(&dir.join("a.xml")).unwrap());
    assert!(!delete_file(&dir.join("a.xml")).unwrap());
    assert!(remove_dir_if_empty(&dir).unwrap());
    assert!(!dir.exists());
    assert!(!remove_dir_if_empty(&dir).unwrap());
}

#[test]
fn test_list_files_is_sorted_and_skips_dirs() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("b.xml"), "").unwrap();
    fs::write(tmp.path().join("a.xml"), "").unwrap();
    fs::create_dir(tmp.path().join("sub")).unwrap();

    let names: Vec<String> = list_files(tmp.path())
        .unwrap()
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.xml", "b.xml"]);
    assert!(list_files(&tmp.path().join("missing")).unwrap().is_empty());
}

#[test]
fn test_sanitize_file_name() {
    assert_eq!(sanitize_file_name("Darcula"), "Darcula");
    assert_eq!(sanitize_file_name("a/b\\c:d*e?"), "a_b_c_d_e_");
    assert_eq!(sanitize_file_name("trailing. "), "trailing");
    assert_eq!(sanitize_file_name("..."), "_");
    assert!(is_hidden(std::path::Path::new("/x/.hidden")));
    assert!(!is_hidden(std::path::Path::new("/x/visible.xml")));
}
