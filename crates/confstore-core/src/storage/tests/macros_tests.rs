use crate::storage::macros::{contains_macro, validate_file_spec, Macro, MacroPathResolver};

fn resolver() -> MacroPathResolver {
    MacroPathResolver::new(vec![
        Macro::new("$ROOT_CONFIG$", "/home/user/config"),
        Macro::new("$APP_CONFIG$", "$ROOT_CONFIG$/options"),
        Macro::new("$CACHE_DIR$", "/home/user/system/cache"),
    ])
}

#[test]
fn test_expand_resolves_nested_macros() {
    let macros = resolver();
    assert_eq!(
        macros.expand("$APP_CONFIG$/editor.xml").unwrap(),
        "/home/user/config/options/editor.xml"
    );
    assert_eq!(macros.expand("/plain/path.xml").unwrap(), "/plain/path.xml");
}

#[test]
fn test_expand_leaves_non_macro_dollars() {
    let macros = resolver();
    assert_eq!(macros.expand("/tmp/a$b/c$").unwrap(), "/tmp/a$b/c$");
    assert_eq!(macros.expand("/tmp/$lower$/x").unwrap(), "/tmp/$lower$/x");
}

#[test]
fn test_unknown_macro_is_an_error() {
    let err = resolver().expand("$MODULE_DIR$/a.iml").unwrap_err();
    assert!(err.is_unresolved_macro());
    let message = err.to_string();
    assert!(message.contains("$MODULE_DIR$"), "{message}");
    assert!(message.contains("$APP_CONFIG$=$ROOT_CONFIG$/options"), "{message}");
}

#[test]
fn test_self_referencing_macros_are_unresolved() {
    let macros = MacroPathResolver::new(vec![Macro::new("$A$", "$B$/x"), Macro::new("$B$", "$A$/y")]);
    assert!(macros.expand("$A$/file.xml").unwrap_err().is_unresolved_macro());
}

#[test]
fn test_collapse_prefers_longest_value_at_boundary() {
    let macros = resolver();
    assert_eq!(macros.collapse("/home/user/config/options/editor.xml"), "$APP_CONFIG$/editor.xml");
    assert_eq!(macros.collapse("/home/user/config/other.xml"), "$ROOT_CONFIG$/other.xml");
    assert_eq!(macros.collapse("/home/user/config/optionsX/a.xml"), "$ROOT_CONFIG$/optionsX/a.xml");
    assert_eq!(macros.collapse("/home/user/config"), "$ROOT_CONFIG$");
    assert_eq!(macros.collapse("/elsewhere/a.xml"), "/elsewhere/a.xml");
}

#[test]
fn test_set_macros_is_visible_immediately() {
    let mut macros = resolver();
    macros.set_macros(vec![
        Macro::new("$ROOT_CONFIG$", "/other"),
        Macro::new("$APP_CONFIG$", "$ROOT_CONFIG$/options"),
    ]);
    assert_eq!(macros.expand("$APP_CONFIG$/a.xml").unwrap(), "/other/options/a.xml");
    assert_eq!(macros.get("$APP_CONFIG$"), Some("$ROOT_CONFIG$/options"));
}

#[test]
fn test_validate_file_spec() {
    assert!(validate_file_spec("options/editor.xml").is_ok());
    assert!(validate_file_spec("$APP_CONFIG$/editor.xml").is_ok());
    for invalid in ["", "options\\editor.xml", "../editor.xml", "options/../../x.xml"] {
        assert!(validate_file_spec(invalid).is_err(), "{invalid:?} should be rejected");
    }
}

#[test]
fn test_contains_macro() {
    assert!(contains_macro("$APP_CONFIG$/a.xml"));
    assert!(!contains_macro("options/a.xml"));
    assert!(!contains_macro("price$5$"));
}
