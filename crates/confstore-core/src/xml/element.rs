use crate::xml::writer;

/// Tag used for `<option name="..." value="..."/>` property children.
pub const OPTION_TAG: &str = "option";

/// An owned XML element: tag name, ordered attributes, ordered children and
/// optional text content.
///
/// `PartialEq` is structural and order-sensitive. Storages compare states with
/// [`Element::canonical_eq`], which ignores attribute order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Create an empty element with the given tag name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Get an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value in place or appending a new one
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Builder form of [`Element::set_attribute`]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given tag name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn add_child(&mut self, child: Element) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text;
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// True when the element carries no attributes, no children and no text
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty() && self.text.is_none()
    }

    /// Like [`Element::is_empty`], but attributes named in `ignored` do not count
    pub fn is_empty_ignoring(&self, ignored: &[&str]) -> bool {
        self.children.is_empty()
            && self.text.is_none()
            && self
                .attributes
                .iter()
                .all(|(key, _)| ignored.contains(&key.as_str()))
    }

    /// Render the canonical XML text of this element
    pub fn to_xml_string(&self) -> String {
        writer::write_element(self)
    }

    /// Equality of the canonical renderings: attribute order does not matter
    pub fn canonical_eq(&self, other: &Element) -> bool {
        self.to_xml_string() == other.to_xml_string()
    }

    /// Value of the `<option name="..." value="..."/>` child with the given name
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.children_named(OPTION_TAG)
            .find(|option| option.attribute("name") == Some(name))
            .and_then(|option| option.attribute("value"))
    }

    /// Names of all `<option>` children, in document order
    pub fn option_names(&self) -> Vec<String> {
        self.children_named(OPTION_TAG)
            .filter_map(|option| option.attribute("name").map(str::to_owned))
            .collect()
    }

    /// Set or remove (`None`) an `<option>` child
    pub fn set_option(&mut self, name: &str, value: Option<&str>) {
        let existing = self
            .children
            .iter()
            .position(|child| child.name == OPTION_TAG && child.attribute("name") == Some(name));
        match (existing, value) {
            (Some(index), Some(value)) => {
                self.children[index].set_attribute("value", value);
            }
            (Some(index), None) => {
                self.children.remove(index);
            }
            (None, Some(value)) => {
                self.children.push(
                    Element::new(OPTION_TAG)
                        .with_attribute("name", name)
                        .with_attribute("value", value),
                );
            }
            (None, None) => {}
        }
    }
}
