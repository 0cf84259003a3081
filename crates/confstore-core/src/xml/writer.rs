use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};

use crate::xml::Element;

const INDENT: &str = "  ";

/// Render an element in canonical form.
///
/// Attributes are sorted by name (stable, so duplicates keep their order),
/// empty elements are self-closing, text-only elements stay on one line.
pub fn write_element(element: &Element) -> String {
    let mut out = String::with_capacity(256);
    write_into(&mut out, element, 0);
    out
}

fn write_into(out: &mut String, element: &Element, depth: usize) {
    push_indent(out, depth);
    out.push('<');
    out.push_str(element.name());

    let mut attributes: Vec<&(String, String)> = element.attributes().iter().collect();
    attributes.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }

    match (element.children().is_empty(), element.text()) {
        (true, None) => out.push_str(" />\n"),
        (true, Some(text)) => {
            out.push('>');
            out.push_str(&escape_text(text));
            push_close(out, element);
        }
        (false, text) => {
            out.push_str(">\n");
            if let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) {
                push_indent(out, depth + 1);
                out.push_str(&escape_text(text));
                out.push('\n');
            }
            for child in element.children() {
                write_into(out, child, depth + 1);
            }
            push_indent(out, depth);
            push_close(out, element);
        }
    }
}

fn push_close(out: &mut String, element: &Element) {
    out.push_str("</");
    out.push_str(element.name());
    out.push_str(">\n");
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Escape an attribute value; whitespace control characters become character
/// references so that a re-read does not normalize them away.
fn escape_attribute(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\n', "&#10;")
            .replace('\r', "&#13;")
            .replace('\t', "&#9;"),
    )
}

fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = partial_escape(text);
    if !escaped.contains('\r') {
        return escaped;
    }
    Cow::Owned(escaped.replace('\r', "&#13;"))
}
