use crate::xml::{parse, read_root_attributes, Element, XmlError};

#[test]
fn test_parse_strips_bom_and_prolog() {
    let mut input = b"\xEF\xBB\xBF".to_vec();
    input.extend_from_slice(
        b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- generated -->\n<application>\n  <component name=\"A\" />\n</application>\n",
    );

    let root = parse(&input).expect("parse");
    assert_eq!(root.name(), "application");
    assert_eq!(root.children().len(), 1);
    assert_eq!(root.children()[0].attribute("name"), Some("A"));
}

#[test]
fn test_prolog_variants_parse_to_the_same_tree() {
    let plain = parse(b"<a x=\"1\"><b /></a>").expect("plain");
    let with_prolog = parse(b"<?xml version='1.0'?>\r\n<a x='1'>\r\n  <b/>\r\n</a>").expect("prolog");
    assert_eq!(plain, with_prolog);
}

#[test]
fn test_text_and_entities() {
    let root = parse(b"<a><t>  spaced &amp; escaped  </t><c><![CDATA[<raw>]]></c></a>").expect("parse");
    assert_eq!(root.child("t").and_then(Element::text), Some("  spaced & escaped  "));
    assert_eq!(root.child("c").and_then(Element::text), Some("<raw>"));
    assert_eq!(root.text(), None, "whitespace between children is dropped");
}

#[test]
fn test_round_trip_through_canonical_form() {
    let source = b"<project version=\"4\">\n  <component name=\"B\" z=\"1\" a=\"2\">\n    <list>\n      <item value=\"x\" />\n    </list>\n  </component>\n</project>\n";
    let first = parse(source).expect("parse");
    let written = first.to_xml_string();
    let second = parse(written.as_bytes()).expect("reparse");
    assert_eq!(written, second.to_xml_string());
}

#[test]
fn test_whitespace_only_leaf_text_survives_a_round_trip() {
    let mut state = Element::new("state");
    let mut indent = Element::new("indent");
    indent.set_text(Some("    ".to_string()));
    state.add_child(indent);

    let written = state.to_xml_string();
    let reread = parse(written.as_bytes()).expect("reparse");
    assert_eq!(reread.child("indent").and_then(Element::text), Some("    "));
    assert_eq!(reread.to_xml_string(), written);
    assert_eq!(reread.text(), None, "indentation around children is not text");
}

#[test]
fn test_malformed_documents_are_rejected() {
    assert!(matches!(parse(b""), Err(XmlError::NoRootElement)));
    assert!(matches!(parse(b"<a><b></a>"), Err(XmlError::Syntax { .. })));
    assert!(matches!(
        parse(b"<a>"),
        Err(XmlError::Unclosed(_)) | Err(XmlError::Syntax { .. })
    ));
    assert!(matches!(parse(b"<a/><b/>"), Err(XmlError::TrailingContent(_))));
    assert!(matches!(parse(b"\xFF\xFE<a/>"), Err(XmlError::Encoding(_))));
}

#[test]
fn test_read_root_attributes_only() {
    let root = read_root_attributes(b"<scheme name=\"Darcula\" version=\"142\"><broken").expect("root");
    assert_eq!(root.name(), "scheme");
    assert_eq!(root.attribute("name"), Some("Darcula"));
    assert!(root.children().is_empty());
}
