use crate::xml::binary::{decode, encode};
use crate::xml::{Element, XmlError};

fn sample() -> Element {
    Element::new("component")
        .with_attribute("name", "RecentFiles")
        .with_attribute("b", "second")
        .with_attribute("a", "third")
        .with_child(
            Element::new("list")
                .with_child(Element::new("item").with_attribute("value", "/tmp/ünïcode"))
                .with_child(Element::new("item").with_text("")),
        )
        .with_child(Element::new("note").with_text("multi\nline"))
}

#[test]
fn test_binary_codec_preserves_structure_and_attribute_order() {
    let element = sample();
    let decoded = decode(&encode(&element)).expect("decode");

    // Structural equality is order-sensitive, so this also checks attribute order
    assert_eq!(decoded, element);
    assert_eq!(decoded.attributes()[1].0, "b");
    assert_eq!(decoded.children()[0].children()[1].text(), Some(""), "empty text is kept");
}

#[test]
fn test_truncated_input_is_corrupt() {
    let bytes = encode(&sample());
    for cut in [0, 3, 5, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            matches!(decode(&bytes[..cut]), Err(XmlError::CorruptBinary(_))),
            "cut at {cut} should be rejected"
        );
    }
}

#[test]
fn test_trailing_bytes_and_bad_header_are_corrupt() {
    let mut bytes = encode(&Element::new("a"));
    bytes.push(0);
    assert!(matches!(decode(&bytes), Err(XmlError::CorruptBinary(_))));

    assert!(matches!(decode(b"XYZ\x01"), Err(XmlError::CorruptBinary(_))));
    assert!(matches!(decode(b"CSB\x09"), Err(XmlError::CorruptBinary(_))));
}

#[test]
fn test_huge_declared_counts_do_not_allocate() {
    // tag "a", then an attribute count of u64::MAX-ish
    let mut bytes = b"CSB\x01\x01a".to_vec();
    bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
    assert!(matches!(decode(&bytes), Err(XmlError::CorruptBinary(_))));
}
