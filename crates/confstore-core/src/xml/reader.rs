use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::xml::{Element, XmlError};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Strip a UTF-8 byte-order mark, if present
pub fn strip_bom(input: &[u8]) -> &[u8] {
    input.strip_prefix(BOM).unwrap_or(input)
}

/// Parse a whole document into its root element.
///
/// The XML declaration, doctype, comments and processing instructions are
/// skipped. Text of an element that also has children is indentation around
/// them: it is trimmed, and dropped when only whitespace remains. Text of a
/// leaf element is kept as written.
pub fn parse(input: &[u8]) -> Result<Element, XmlError> {
    let text = std::str::from_utf8(strip_bom(input)).map_err(|e| XmlError::Encoding(e.to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(XmlError::TrailingContent(position));
                }
                stack.push(element_from_start(&start, position)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start, position)?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                let mut element = stack.pop().ok_or(XmlError::Syntax {
                    position,
                    message: "unmatched closing tag".to_string(),
                })?;
                normalize_text(&mut element);
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::Text(content) => {
                let unescaped = content.unescape().map_err(|e| XmlError::Syntax {
                    position,
                    message: e.to_string(),
                })?;
                match stack.last_mut() {
                    Some(current) => append_text(current, &unescaped),
                    None if unescaped.trim().is_empty() => {}
                    None => return Err(XmlError::TrailingContent(position)),
                }
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                match stack.last_mut() {
                    Some(current) => append_text(current, &String::from_utf8_lossy(&raw)),
                    None => return Err(XmlError::TrailingContent(position)),
                }
            }
            Event::Eof => break,
            // declaration, doctype, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name().to_string()));
    }
    root.ok_or(XmlError::NoRootElement)
}

/// Read only the root element's tag name and attributes, without parsing the
/// rest of the document.
pub fn read_root_attributes(input: &[u8]) -> Result<Element, XmlError> {
    let text = std::str::from_utf8(strip_bom(input)).map_err(|e| XmlError::Encoding(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(start) | Event::Empty(start) => return element_from_start(&start, position),
            Event::Eof => return Err(XmlError::NoRootElement),
            _ => {}
        }
    }
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Encoding(e.to_string()))?
        .to_string();
    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| XmlError::Encoding(e.to_string()))?
            .to_string();
        let value = attribute.unescape_value().map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        element.set_attribute(key, value.into_owned());
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.add_child(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::TrailingContent(position)),
    }
}

fn append_text(element: &mut Element, text: &str) {
    let combined = match element.text() {
        Some(existing) => format!("{existing}{text}"),
        None => text.to_string(),
    };
    element.set_text(Some(combined));
}

fn normalize_text(element: &mut Element) {
    if element.children().is_empty() {
        return;
    }
    let Some(text) = element.text() else {
        return;
    };
    let trimmed = text.trim();
    let normalized = (!trimmed.is_empty()).then(|| trimmed.to_string());
    element.set_text(normalized);
}
