//! XML output documents
//!
//! The builder assembles a [`Document`] in memory and serializes it with
//! `quick-xml`. Text nodes are stored already escaped; markup nodes hold
//! well-formed fragments inserted verbatim.

use std::io::Write;

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// Content of an element
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Child element
    Element(Element),
    /// Escaped character data
    Text(String),
    /// Well-formed markup fragment
    Markup(String),
}

/// XML Element in the document tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Element name
    pub name: String,
    /// Attributes, in insertion order
    pub attributes: IndexMap<String, String>,
    /// Child nodes
    pub children: Vec<Node>,
}

impl Element {
    /// Create a new element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute (unescaped value)
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get an attribute value by name
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append escaped text
    pub fn push_text(&mut self, escaped: impl Into<String>) {
        self.children.push(Node::Text(escaped.into()));
    }

    /// Append a markup fragment after checking that it is well-formed
    pub fn push_markup(&mut self, markup: impl Into<String>) -> Result<()> {
        let markup = markup.into();
        check_markup(&markup)?;
        self.children.push(Node::Markup(markup));
        Ok(())
    }

    /// Whether the element has neither children nor text
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Find child elements by name
    pub fn find_children(&self, name: &str) -> Vec<&Element> {
        self.elements().filter(|e| e.name == name).collect()
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Unescaped text content of the element's own text nodes
    pub fn text(&self) -> Result<String> {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(escaped) = node {
                let unescaped = quick_xml::escape::unescape(escaped)
                    .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                text.push_str(&unescaped);
            }
        }
        Ok(text)
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        for node in &self.children {
            match node {
                Node::Element(child) => child.write(writer)?,
                Node::Text(escaped) => writer
                    .write_event(Event::Text(BytesText::from_escaped(escaped.as_str())))
                    .map_err(xml_error)?,
                Node::Markup(markup) => writer.get_mut().write_all(markup.as_bytes())?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }
}

fn xml_error(e: quick_xml::Error) -> Error {
    Error::Xml(e.to_string())
}

/// XML Document representation
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// XML version written in the declaration
    pub version: String,
    /// Encoding written in the declaration
    pub encoding: String,
    /// Root element of the document
    pub root: Option<Element>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: "UTF-8".to_string(),
            root: None,
        }
    }

    /// Set the root element; a document has at most one
    pub fn set_root(&mut self, root: Element) -> Result<()> {
        if let Some(existing) = &self.root {
            return Err(Error::Xml(format!(
                "document already has a root element <{}>, cannot add <{}>",
                existing.name, root.name
            )));
        }
        self.root = Some(root);
        Ok(())
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// Serialize with an XML declaration
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new(&self.version, Some(&self.encoding), None)))
            .map_err(xml_error)?;
        writer.get_mut().write_all(b"\n")?;
        if let Some(root) = &self.root {
            root.write(&mut writer)?;
            writer.get_mut().write_all(b"\n")?;
        }
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(format!("Invalid UTF-8 output: {}", e)))
    }

    /// Parse an XML document from a string
    ///
    /// Whitespace-only text is dropped; markup comes back as elements.
    pub fn from_string(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut doc = Document::new();
        let mut element_stack: Vec<Element> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Decl(decl)) => {
                    if let Ok(version) = decl.version() {
                        doc.version = String::from_utf8_lossy(&version).into_owned();
                    }
                    if let Some(Ok(encoding)) = decl.encoding() {
                        doc.encoding = String::from_utf8_lossy(&encoding).into_owned();
                    }
                }
                Ok(Event::Start(e)) => {
                    element_stack.push(Self::parse_element(&e)?);
                }
                Ok(Event::End(_)) => {
                    if let Some(current) = element_stack.pop() {
                        match element_stack.last_mut() {
                            Some(parent) => parent.add_child(current),
                            None => doc.set_root(current)?,
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let element = Self::parse_element(&e)?;
                    match element_stack.last_mut() {
                        Some(parent) => parent.add_child(element),
                        None => doc.set_root(element)?,
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let raw = std::str::from_utf8(&e)
                            .map_err(|e| Error::Xml(format!("Invalid text: {}", e)))?;
                        current.push_text(raw);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // Ignore other events (comments, processing instructions, etc.)
            }
        }

        Ok(doc)
    }

    /// Parse element from BytesStart event
    fn parse_element(start: &BytesStart) -> Result<Element> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();

        let mut element = Element::new(name);
        for attr_result in start.attributes() {
            let attr = attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();
            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();
            element.set_attribute(attr_name, attr_value);
        }

        Ok(element)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that a fragment is a balanced, well-formed piece of markup
pub fn check_markup(fragment: &str) -> Result<()> {
    let mut reader = Reader::from_str(fragment);
    let mut depth: usize = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::Xml(format!("unbalanced closing tag in markup: {}", fragment)))?;
            }
            Ok(Event::Text(e)) => {
                e.unescape()
                    .map_err(|e| Error::Xml(format!("invalid character data in markup: {}", e)))?;
            }
            Ok(Event::Decl(_)) | Ok(Event::DocType(_)) => {
                return Err(Error::Xml("markup fragments cannot carry declarations".to_string()))
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Xml(format!(
                    "malformed markup at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    if depth != 0 {
        return Err(Error::Xml(format!("unclosed element in markup: {}", fragment)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_creation() {
        let doc = Document::new();
        assert!(doc.root.is_none());
        assert_eq!(doc.to_xml().unwrap(), "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }

    #[test]
    fn test_serialize_tree() {
        let mut title = Element::new("title");
        title.set_attribute("lang", "en & fr");
        title.push_text("Rex &#x0026; co");
        let mut root = Element::new("root");
        root.add_child(title);
        root.add_child(Element::new("empty"));

        let mut doc = Document::new();
        doc.set_root(root).unwrap();
        assert_eq!(
            doc.to_xml().unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <root><title lang=\"en &amp; fr\">Rex &#x0026; co</title><empty/></root>\n"
        );
    }

    #[test]
    fn test_single_root() {
        let mut doc = Document::new();
        doc.set_root(Element::new("a")).unwrap();
        assert!(matches!(doc.set_root(Element::new("b")), Err(Error::Xml(_))));
    }

    #[test]
    fn test_markup() {
        let mut p = Element::new("p");
        p.push_markup("<div>a <b>bold</b> move</div>").unwrap();
        let mut doc = Document::new();
        doc.set_root(p).unwrap();
        assert!(doc.to_xml().unwrap().contains("<p><div>a <b>bold</b> move</div></p>"));

        assert!(check_markup("<div><b>x</div>").is_err());
        assert!(check_markup("<div>").is_err());
        assert!(check_markup("<div>&bogus;</div>").is_err());
        assert!(check_markup("<div>&#x00E9;</div>").is_ok());
    }

    #[test]
    fn test_parse_round_trip() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root><title lang=\"en\">R&#x0026;D</title><x/><x/></root>\n";
        let doc = Document::from_string(xml).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.find_children("x").len(), 2);
        let title = root.child("title").unwrap();
        assert_eq!(title.get_attribute("lang"), Some("en"));
        assert_eq!(title.text().unwrap(), "R&D");
        assert_eq!(doc.to_xml().unwrap(), xml);
    }
}
