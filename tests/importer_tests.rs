//! XSD import from files, and building with imported schemas

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::NamedTempFile;

use schemaxml::importer::import_xsd_with;
use schemaxml::loaders::Loader;
use schemaxml::{import_xsd, merge_schema, BuildOptions, Builder, Error, Limits, Location, MemoryEntity, SchemaNode};

const BOOK_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="formatType">
    <xs:restriction base="xs:string">
      <xs:enumeration value="hardcover"/>
      <xs:enumeration value="paperback"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:element name="book">
    <xs:complexType>
      <xs:attribute name="version" fixed="2"/>
      <xs:sequence>
        <xs:element name="title" type="xs:string"/>
        <xs:element name="author" type="xs:string" maxOccurs="unbounded"/>
        <xs:element name="format" type="formatType" minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn xsd_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(BOOK_XSD.as_bytes()).unwrap();
    file
}

fn expected_tree() -> serde_json::Value {
    json!({"book": {
        "#attributes": {"version": "2"},
        "title": {},
        "author": {"#max_occurence": -1},
        "format": {"#min_occurence": 0, "#restrictions": {"enumeration": ["hardcover", "paperback"]}}
    }})
}

#[test]
fn test_import_from_path() {
    let file = xsd_file();
    let location = Location::parse(file.path().to_str().unwrap()).unwrap();
    let schema = import_xsd(&location).unwrap();
    assert_eq!(schema.to_tree(), expected_tree());
}

#[test]
fn test_import_from_file_url() {
    let file = xsd_file();
    let url = url::Url::from_file_path(file.path()).unwrap();
    let location = Location::parse(url.as_str()).unwrap();
    assert!(matches!(location, Location::Path(_)));
    assert_eq!(import_xsd(&location).unwrap().to_tree(), expected_tree());
}

#[test]
fn test_missing_file() {
    let location = Location::parse("/nonexistent/dir/book.xsd").unwrap();
    assert!(import_xsd(&location).is_err());
}

#[test]
fn test_remote_location_not_loaded() {
    let location = Location::parse("https://example.com/book.xsd").unwrap();
    assert!(location.is_remote());
    assert!(matches!(import_xsd(&location), Err(Error::Resource(_))));
}

#[test]
fn test_size_limit() {
    let file = xsd_file();
    let location = Location::Path(file.path().to_path_buf());
    let mut limits = Limits::new();
    limits.max_xsd_size = 64;
    let loader = Loader::new().with_limits(limits);
    assert!(matches!(import_xsd_with(&location, &loader), Err(Error::LimitExceeded(_))));
}

#[test]
fn test_imported_schema_drives_a_build() {
    let imported = import_xsd(&Location::Inline(BOOK_XSD.to_string())).unwrap();
    let mapping = SchemaNode::from_tree(&json!({"book": {
        "title": {"#field": "title"},
        "author": {"#field": "authors"},
        "format": {"#field": "format"}
    }}))
    .unwrap();
    let schema = merge_schema(&imported, &mapping).unwrap();

    let entity = MemoryEntity::new("node", "1")
        .with_field("title", json!("Dune"))
        .with_field("authors", json!(["Frank Herbert"]))
        .with_field("format", json!("ebook"));
    let mut builder = Builder::new("book", Arc::new(schema), BuildOptions::default());
    let xml = builder.build(entity.into_ref()).unwrap();

    assert_eq!(
        xml,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <book version=\"2\"><title>Dune</title><author>Frank Herbert</author><format>ebook</format></book>\n"
    );
    // "ebook" is outside the imported enumeration
    assert_eq!(builder.warnings().len(), 1);
}
