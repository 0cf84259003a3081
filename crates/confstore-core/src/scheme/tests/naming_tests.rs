use crate::scheme::digest::digest;
use crate::scheme::naming::{unique_name, SchemeFile};

#[test]
fn test_unique_name_appends_counter() {
    let taken = ["Dark", "Dark2"];
    assert_eq!(unique_name("Light", |name| taken.contains(&name)), "Light");
    assert_eq!(unique_name("Dark", |name| taken.contains(&name)), "Dark3");
}

#[test]
fn test_scheme_file_parse_prefers_extension() {
    let file = SchemeFile::parse("Dark.icls", ".icls").expect("preferred extension");
    assert_eq!(file.base, "Dark");
    assert_eq!(file.extension, ".icls");

    let fallback = SchemeFile::parse("Dark.xml", ".icls").expect("default extension");
    assert_eq!(fallback.extension, ".xml");

    assert!(SchemeFile::parse("notes.txt", ".icls").is_none());
    assert!(SchemeFile::parse(".xml", ".xml").is_none());
}

#[test]
fn test_scheme_file_key_folds_case() {
    assert_eq!(SchemeFile::new("Dark", ".xml").key(), SchemeFile::new("dark", ".XML").key());
}

#[test]
fn test_digest_is_stable_hex() {
    let first = digest(b"<scheme />");
    assert_eq!(first, digest(b"<scheme />"));
    assert_ne!(first, digest(b"<scheme/>"));
    assert_eq!(first.len(), 64);
}
