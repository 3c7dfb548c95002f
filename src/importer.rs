//! XSD import
//!
//! Derives a schema tree from the element declarations of an XSD document.
//! Only the parts of XSD that map onto the schema model are read: element
//! declarations with their occurrence bounds, named and inline types,
//! attributes and enumerations. Sequences (and `all`/`choice` groups) are
//! flattened into their parent.

use roxmltree::{Document, Node};

use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::loaders::{Loader, Location};
use crate::schema::node::{AttributeValue, Restrictions, SchemaNode, UNBOUNDED};
use crate::value::Value;

/// XML Schema namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const EXTENSION: &str = "extension";
    pub const ATTRIBUTE: &str = "attribute";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const RESTRICTION: &str = "restriction";
    pub const ENUMERATION: &str = "enumeration";
}

/// XSD attribute names
mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
    pub const FIXED: &str = "fixed";
    pub const VALUE: &str = "value";
}

/// Import a schema from an XSD location with default settings
pub fn import_xsd(location: &Location) -> Result<SchemaNode> {
    import_xsd_with(location, &Loader::new())
}

/// Import a schema from an XSD location through the given loader
pub fn import_xsd_with(location: &Location, loader: &Loader) -> Result<SchemaNode> {
    let text = loader.load(location)?;
    XsdImporter::new()
        .with_limits(loader.limits().clone())
        .with_source_name(location.describe())
        .parse_str(&text)
}

/// Converts XSD documents into schema trees
#[derive(Debug, Clone)]
pub struct XsdImporter {
    limits: Limits,
    source_name: String,
}

impl XsdImporter {
    /// Create an importer with default limits
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            source_name: "inline schema".to_string(),
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Name of the document, used in error locations
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Import a schema from XSD text
    pub fn parse_str(&self, text: &str) -> Result<SchemaNode> {
        self.limits.check_xsd_size(text.len())?;

        let doc = Document::parse(text).map_err(|e| {
            Error::Parse(
                ParseError::new(format!("Could not load/parse schema: {}", e)).with_location(&self.source_name),
            )
        })?;

        let root = doc.root_element();
        if !is_xsd(root, xsd_elements::SCHEMA) {
            return Err(Error::Parse(
                ParseError::new(format!(
                    "expected an xsd:schema root element, found '{}'",
                    root.tag_name().name()
                ))
                .with_location(&self.source_name),
            ));
        }

        let walker = Walker {
            doc: &doc,
            schema: root,
            limits: &self.limits,
            source_name: &self.source_name,
        };
        let mut node = SchemaNode::new();
        walker.create_elements(root, &mut node, 0, "root", false)?;
        node.validate("root")?;
        Ok(node)
    }
}

impl Default for XsdImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_xsd(node: Node, local_name: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XSD_NAMESPACE) && node.tag_name().name() == local_name
}

fn xsd_children<'a, 'input>(node: Node<'a, 'input>, local_name: &'static str) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |c| is_xsd(*c, local_name))
}

/// Split `prefix:local` into its namespace URI and local name
fn resolve_qname<'a>(context: Node<'a, '_>, name: &'a str) -> (Option<&'a str>, &'a str) {
    match name.split_once(':') {
        Some((prefix, local)) => (context.lookup_namespace_uri(Some(prefix)), local),
        None => (context.lookup_namespace_uri(None), name),
    }
}

fn enumeration_values(restriction: Node) -> Vec<Value> {
    xsd_children(restriction, xsd_elements::ENUMERATION)
        .filter_map(|e| e.attribute(xsd_attrs::VALUE))
        .map(Value::from)
        .collect()
}

struct Walker<'a, 'input> {
    doc: &'a Document<'input>,
    schema: Node<'a, 'input>,
    limits: &'a Limits,
    source_name: &'a str,
}

impl<'a, 'input> Walker<'a, 'input> {
    fn location(&self, node: Node) -> String {
        let pos = self.doc.text_pos_at(node.range().start);
        format!("{}:{}:{}", self.source_name, pos.row, pos.col)
    }

    fn parse_error(&self, node: Node, message: impl Into<String>) -> Error {
        Error::Parse(ParseError::new(message).with_location(self.location(node)))
    }

    /// Append the elements declared under `current` to `parent`
    ///
    /// With `optional` set the elements come from a choice and have their
    /// minimum occurrence lowered to zero.
    fn create_elements(
        &self,
        current: Node<'a, 'input>,
        parent: &mut SchemaNode,
        depth: usize,
        path: &str,
        optional: bool,
    ) -> Result<()> {
        self.limits.check_depth(depth, path)?;

        for child in current.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(XSD_NAMESPACE) {
                continue;
            }
            match child.tag_name().name() {
                xsd_elements::ELEMENT => {
                    let (tag, mut node) = self.create_element(child, depth, path)?;
                    if optional {
                        node.min_occurs = 0;
                    }
                    parent.push_child(tag, node);
                }
                xsd_elements::SEQUENCE | xsd_elements::ALL => {
                    self.create_elements(child, parent, depth + 1, path, optional)?;
                }
                xsd_elements::CHOICE => {
                    self.create_elements(child, parent, depth + 1, path, true)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn create_element(&self, element: Node<'a, 'input>, depth: usize, path: &str) -> Result<(String, SchemaNode)> {
        let declaration = match element.attribute(xsd_attrs::REF) {
            Some(reference) => self.global_element(element, reference)?,
            None => element,
        };
        let name = declaration
            .attribute(xsd_attrs::NAME)
            .ok_or_else(|| self.parse_error(element, "element declaration without a name"))?;
        let element_path = format!("{}>{}", path, name);
        self.limits.check_depth(depth + 1, &element_path)?;

        let mut node = if let Some(type_name) = declaration.attribute(xsd_attrs::TYPE) {
            self.resolve_type(declaration, type_name, depth + 1, &element_path)?
        } else {
            let inline: Vec<_> = xsd_children(declaration, xsd_elements::COMPLEX_TYPE).collect();
            match inline.as_slice() {
                [] => match xsd_children(declaration, xsd_elements::SIMPLE_TYPE).next() {
                    Some(simple) => self.parse_simple_type(simple),
                    None => SchemaNode::new(),
                },
                [complex] => self.parse_complex_type(*complex, name, depth + 1, &element_path)?,
                _ => {
                    return Err(Error::SchemaConfig(format!(
                        "{}: invalid XSD schema, more than one inline complexType",
                        element_path
                    )))
                }
            }
        };

        let (min_occurs, max_occurs) = self.parse_occurs(element)?;
        node.min_occurs = min_occurs;
        node.max_occurs = max_occurs;
        Ok((name.to_string(), node))
    }

    fn parse_occurs(&self, element: Node) -> Result<(u32, i32)> {
        let min = match element.attribute(xsd_attrs::MIN_OCCURS) {
            Some(s) => s
                .trim()
                .parse::<u32>()
                .map_err(|_| self.parse_error(element, format!("invalid minOccurs value '{}'", s)))?,
            None => 1,
        };
        let max = match element.attribute(xsd_attrs::MAX_OCCURS) {
            Some("unbounded") => UNBOUNDED,
            Some(s) => s
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| self.parse_error(element, format!("invalid maxOccurs value '{}'", s)))?,
            None => 1,
        };
        Ok((min, max))
    }

    fn global_element(&self, context: Node<'a, 'input>, reference: &str) -> Result<Node<'a, 'input>> {
        let (_, local) = resolve_qname(context, reference);
        xsd_children(self.schema, xsd_elements::ELEMENT)
            .find(|e| e.attribute(xsd_attrs::NAME) == Some(local))
            .ok_or_else(|| self.parse_error(context, format!("Parse error: could not find element {}", reference)))
    }

    /// Schema node for a named type
    fn resolve_type(&self, context: Node<'a, 'input>, type_name: &str, depth: usize, path: &str) -> Result<SchemaNode> {
        let (namespace, local) = resolve_qname(context, type_name);
        if namespace == Some(XSD_NAMESPACE) {
            return Ok(SchemaNode::new());
        }

        let named = |kind: &'static str| -> Vec<Node<'a, 'input>> {
            xsd_children(self.schema, kind)
                .filter(|t| t.attribute(xsd_attrs::NAME) == Some(local))
                .collect()
        };

        let simple = named(xsd_elements::SIMPLE_TYPE);
        let (definition, node) = match simple.as_slice() {
            [single] => (*single, SchemaNode::new()),
            [] => {
                let complex = named(xsd_elements::COMPLEX_TYPE);
                match complex.as_slice() {
                    [] => {
                        return Err(self.parse_error(context, format!("Parse error: could not find type {}", type_name)))
                    }
                    [single] => (*single, self.parse_complex_type(*single, type_name, depth, path)?),
                    _ => return Err(self.ambiguous_type(context, type_name)),
                }
            }
            _ => return Err(self.ambiguous_type(context, type_name)),
        };

        Ok(with_enumerations(node, definition))
    }

    fn ambiguous_type(&self, context: Node, type_name: &str) -> Error {
        self.parse_error(
            context,
            format!("Invalid XSD schema: more than one definition of type {}", type_name),
        )
    }

    fn parse_simple_type(&self, simple: Node) -> SchemaNode {
        with_enumerations(SchemaNode::new(), simple)
    }

    fn parse_complex_type(
        &self,
        complex: Node<'a, 'input>,
        display_name: &str,
        depth: usize,
        path: &str,
    ) -> Result<SchemaNode> {
        let mut node = SchemaNode::new();
        let mut restrictions = Restrictions::default();

        let extension_attributes = xsd_children(complex, xsd_elements::SIMPLE_CONTENT)
            .flat_map(|content| xsd_children(content, xsd_elements::EXTENSION))
            .flat_map(|extension| xsd_children(extension, xsd_elements::ATTRIBUTE));
        for attribute in xsd_children(complex, xsd_elements::ATTRIBUTE).chain(extension_attributes) {
            let Some(name) = attribute
                .attribute(xsd_attrs::NAME)
                .or_else(|| attribute.attribute(xsd_attrs::REF).map(|r| resolve_qname(attribute, r).1))
            else {
                continue;
            };

            let enumerations: Vec<Value> = xsd_children(attribute, xsd_elements::SIMPLE_TYPE)
                .flat_map(|simple| xsd_children(simple, xsd_elements::RESTRICTION))
                .flat_map(enumeration_values)
                .collect();
            let required = attribute.attribute(xsd_attrs::USE) == Some("required");

            let default = if let Some(fixed) = attribute.attribute(xsd_attrs::FIXED) {
                Value::from(fixed)
            } else if required && !enumerations.is_empty() {
                enumerations[0].clone()
            } else {
                Value::Null
            };

            if !enumerations.is_empty() {
                restrictions.attribute_enumerations.insert(name.to_string(), enumerations);
            }
            node.attributes.insert(name.to_string(), AttributeValue::Static(default));
        }

        let sequences: Vec<_> = xsd_children(complex, xsd_elements::SEQUENCE).collect();
        match sequences.as_slice() {
            [] => {
                for group in complex.children().filter(|c| is_xsd(*c, xsd_elements::ALL) || is_xsd(*c, xsd_elements::CHOICE)) {
                    let optional = is_xsd(group, xsd_elements::CHOICE);
                    self.create_elements(group, &mut node, depth + 1, path, optional)?;
                }
            }
            [sequence] => self.create_elements(*sequence, &mut node, depth + 1, path, false)?,
            _ => {
                return Err(Error::SchemaConfig(format!(
                    "XSD Schema parsing: we only support complex types with one sequence for type/inline {}",
                    display_name
                )))
            }
        }

        if !restrictions.is_empty() {
            node.restrictions = Some(restrictions);
        }
        Ok(node)
    }
}

/// Add the `restriction/enumeration` values of a type definition to a node
fn with_enumerations(mut node: SchemaNode, definition: Node) -> SchemaNode {
    let values: Vec<Value> = xsd_children(definition, xsd_elements::RESTRICTION)
        .flat_map(enumeration_values)
        .collect();
    if !values.is_empty() {
        node.restrictions
            .get_or_insert_with(Restrictions::default)
            .enumeration
            .extend(values);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ARTICLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <xsd:simpleType name="statusType">
    <xsd:restriction base="xsd:string">
      <xsd:enumeration value="draft"/>
      <xsd:enumeration value="published"/>
    </xsd:restriction>
  </xsd:simpleType>
  <xsd:complexType name="authorType">
    <xsd:attribute name="role" use="required">
      <xsd:simpleType>
        <xsd:restriction base="xsd:string">
          <xsd:enumeration value="main"/>
          <xsd:enumeration value="contributor"/>
        </xsd:restriction>
      </xsd:simpleType>
    </xsd:attribute>
    <xsd:attribute name="lang" type="xsd:string"/>
    <xsd:sequence>
      <xsd:element name="name" type="xsd:string"/>
      <xsd:element name="email" type="xsd:string" minOccurs="0"/>
    </xsd:sequence>
  </xsd:complexType>
  <xsd:element name="article">
    <xsd:complexType>
      <xsd:sequence>
        <xsd:element name="title" type="xsd:string"/>
        <xsd:element name="status" type="statusType"/>
        <xsd:element name="author" type="authorType" minOccurs="1" maxOccurs="unbounded"/>
        <xsd:sequence>
          <xsd:element name="keyword" type="xsd:string" minOccurs="0" maxOccurs="5"/>
        </xsd:sequence>
      </xsd:sequence>
    </xsd:complexType>
  </xsd:element>
</xsd:schema>"#;

    #[test]
    fn test_import_article() {
        let schema = XsdImporter::new().parse_str(ARTICLE_XSD).unwrap();
        assert_eq!(
            schema.to_tree(),
            json!({
                "article": {
                    "title": {},
                    "status": {"#restrictions": {"enumeration": ["draft", "published"]}},
                    "author": {
                        "#max_occurence": -1,
                        "#attributes": {"role": "main", "lang": null},
                        "#restrictions": {"attributes_enumerations": {"role": ["main", "contributor"]}},
                        "name": {},
                        "email": {"#min_occurence": 0}
                    },
                    "keyword": {"#min_occurence": 0, "#max_occurence": 5}
                }
            })
        );
    }

    #[test]
    fn test_unknown_type() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="a" type="missing"/>
        </xs:schema>"#;
        let err = XsdImporter::new().parse_str(xsd).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("could not find type missing"));
    }

    #[test]
    fn test_ambiguous_type() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:simpleType name="t"><xs:restriction base="xs:string"/></xs:simpleType>
            <xs:simpleType name="t"><xs:restriction base="xs:string"/></xs:simpleType>
            <xs:element name="a" type="t"/>
        </xs:schema>"#;
        let err = XsdImporter::new().parse_str(xsd).unwrap_err();
        assert!(err.to_string().contains("more than one definition of type t"));
    }

    #[test]
    fn test_two_sequences_rejected() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="a">
              <xs:complexType>
                <xs:sequence><xs:element name="b"/></xs:sequence>
                <xs:sequence><xs:element name="c"/></xs:sequence>
              </xs:complexType>
            </xs:element>
        </xs:schema>"#;
        let err = XsdImporter::new().parse_str(xsd).unwrap_err();
        assert!(matches!(err, Error::SchemaConfig(_)));
    }

    #[test]
    fn test_fixed_attribute_and_simple_content() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="price">
              <xs:complexType>
                <xs:simpleContent>
                  <xs:extension base="xs:decimal">
                    <xs:attribute name="currency" fixed="EUR"/>
                  </xs:extension>
                </xs:simpleContent>
              </xs:complexType>
            </xs:element>
        </xs:schema>"#;
        let schema = XsdImporter::new().parse_str(xsd).unwrap();
        assert_eq!(schema.to_tree(), json!({"price": {"#attributes": {"currency": "EUR"}}}));
    }

    #[test]
    fn test_choice_and_ref() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="note" type="xs:string"/>
            <xs:element name="doc">
              <xs:complexType>
                <xs:choice>
                  <xs:element name="a"/>
                  <xs:element ref="note" maxOccurs="2"/>
                </xs:choice>
              </xs:complexType>
            </xs:element>
        </xs:schema>"#;
        let schema = XsdImporter::new().parse_str(xsd).unwrap();
        let doc = schema.child("doc").unwrap();
        assert_eq!(
            doc.to_tree(),
            json!({"a": {"#min_occurence": 0}, "note": {"#min_occurence": 0, "#max_occurence": 2}})
        );
    }

    #[test]
    fn test_recursive_type_hits_depth_limit() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:complexType name="nodeType">
              <xs:sequence><xs:element name="node" type="nodeType" minOccurs="0"/></xs:sequence>
            </xs:complexType>
            <xs:element name="node" type="nodeType"/>
        </xs:schema>"#;
        let importer = XsdImporter::new().with_limits(Limits::new().with_max_depth(16));
        assert!(matches!(importer.parse_str(xsd), Err(Error::LimitExceeded(_))));
    }

    #[test]
    fn test_non_schema_root() {
        assert!(XsdImporter::new().parse_str("<root/>").is_err());
        assert!(XsdImporter::new().parse_str("").is_err());
    }

    #[test]
    fn test_import_from_location() {
        let location = Location::Inline(ARTICLE_XSD.to_string());
        let schema = import_xsd(&location).unwrap();
        assert!(schema.child("article").is_some());
    }
}
