// Immutable element tree that builders compose bottom-up in schema order
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::error::CodecError;

// One XML element. Attribute and child order is exactly the insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn attr_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    pub fn attr_if(self, condition: bool, name: &str, value: impl ToString) -> Self {
        if condition {
            self.attr(name, value)
        } else {
            self
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn child_opt(mut self, child: Option<Element>) -> Self {
        if let Some(c) = child {
            self.children.push(c);
        }
        self
    }

    pub fn children<I: IntoIterator<Item = Element>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }

    // Adds `wrapper` holding `children`, or nothing when there are no children.
    pub fn wrapped<I: IntoIterator<Item = Element>>(self, wrapper: &str, children: I) -> Self {
        let items: Vec<Element> = children.into_iter().collect();
        if items.is_empty() {
            self
        } else {
            self.child(Element::new(wrapper).children(items))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn child_elements(&self) -> &[Element] {
        &self.children
    }

    pub fn first(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    // Depth-first search, this element included.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect(name, found);
        }
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    // Serializes the tree with an XML declaration, indented when `pretty` is set.
    pub fn to_xml(&self, pretty: bool) -> Result<String, CodecError> {
        let mut writer = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| CodecError::Serialization(e.to_string()))?;
        self.write(&mut writer)?;

        String::from_utf8(writer.into_inner()).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), CodecError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| CodecError::Serialization(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| CodecError::Serialization(e.to_string()))?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| CodecError::Serialization(e.to_string()))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }
}
