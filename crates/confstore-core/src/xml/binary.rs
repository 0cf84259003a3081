//! Length-prefixed binary encoding of an [`Element`] tree.
//!
//! Layout: magic `CSB`, one version byte, then the root element encoded as
//!
//! ```text
//! element  := string(tag) varint(attr_count) (string(name) string(value))*
//!             varint(child_count) element* text
//! text     := 0x00 | 0x01 string(text)
//! string   := varint(byte_len) utf8_bytes
//! ```
//!
//! Varints are unsigned LEB128. Attribute order is preserved exactly.
use bytes::{Buf, BufMut, BytesMut};

use crate::xml::{Element, XmlError};

pub const MAGIC: &[u8; 3] = b"CSB";
pub const FORMAT_VERSION: u8 = 1;

// Nesting beyond this is treated as corruption rather than recursed into.
const MAX_DEPTH: usize = 512;

/// Encode an element tree
pub fn encode(element: &Element) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(MAGIC);
    buf.put_u8(FORMAT_VERSION);
    encode_element(&mut buf, element);
    buf.to_vec()
}

/// Decode bytes produced by [`encode`]
pub fn decode(input: &[u8]) -> Result<Element, XmlError> {
    let mut buf = input;
    if buf.remaining() < MAGIC.len() + 1 || &buf[..MAGIC.len()] != MAGIC {
        return Err(XmlError::CorruptBinary("missing header".to_string()));
    }
    buf.advance(MAGIC.len());
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(XmlError::CorruptBinary(format!("unsupported format version {version}")));
    }
    let element = decode_element(&mut buf, 0)?;
    if buf.has_remaining() {
        return Err(XmlError::CorruptBinary(format!(
            "{} trailing bytes after root element",
            buf.remaining()
        )));
    }
    Ok(element)
}

fn encode_element(buf: &mut BytesMut, element: &Element) {
    put_str(buf, element.name());
    put_varint(buf, element.attributes().len() as u64);
    for (name, value) in element.attributes() {
        put_str(buf, name);
        put_str(buf, value);
    }
    put_varint(buf, element.children().len() as u64);
    for child in element.children() {
        encode_element(buf, child);
    }
    match element.text() {
        None => buf.put_u8(0),
        Some(text) => {
            buf.put_u8(1);
            put_str(buf, text);
        }
    }
}

fn decode_element(buf: &mut &[u8], depth: usize) -> Result<Element, XmlError> {
    if depth > MAX_DEPTH {
        return Err(XmlError::CorruptBinary("tree is nested too deeply".to_string()));
    }
    let mut element = Element::new(get_str(buf)?);

    let attribute_count = get_count(buf)?;
    for _ in 0..attribute_count {
        let name = get_str(buf)?;
        let value = get_str(buf)?;
        element.set_attribute(name, value);
    }
    if element.attributes().len() != attribute_count {
        return Err(XmlError::CorruptBinary(format!(
            "duplicate attribute in <{}>",
            element.name()
        )));
    }

    let child_count = get_count(buf)?;
    for _ in 0..child_count {
        let child = decode_element(buf, depth + 1)?;
        element.add_child(child);
    }

    if !buf.has_remaining() {
        return Err(XmlError::CorruptBinary("missing text marker".to_string()));
    }
    match buf.get_u8() {
        0 => {}
        1 => element.set_text(Some(get_str(buf)?)),
        other => return Err(XmlError::CorruptBinary(format!("invalid text marker {other}"))),
    }
    Ok(element)
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn put_str(buf: &mut BytesMut, value: &str) {
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn get_varint(buf: &mut &[u8]) -> Result<u64, XmlError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(XmlError::CorruptBinary("truncated length".to_string()));
        }
        if shift >= 64 {
            return Err(XmlError::CorruptBinary("length overflows 64 bits".to_string()));
        }
        let byte = buf.get_u8();
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// A count can never exceed the bytes left, since every entry takes at least one byte
fn get_count(buf: &mut &[u8]) -> Result<usize, XmlError> {
    let count = get_varint(buf)?;
    if count > buf.remaining() as u64 {
        return Err(XmlError::CorruptBinary(format!(
            "count {count} exceeds remaining {} bytes",
            buf.remaining()
        )));
    }
    Ok(count as usize)
}

fn get_str(buf: &mut &[u8]) -> Result<String, XmlError> {
    let len = get_varint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(XmlError::CorruptBinary(format!(
            "string of {len} bytes exceeds remaining {} bytes",
            buf.remaining()
        )));
    }
    let len = len as usize;
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|e| XmlError::CorruptBinary(e.to_string()))?
        .to_string();
    buf.advance(len);
    Ok(value)
}
