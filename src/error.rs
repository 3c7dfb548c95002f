//! Error types for schemaxml
//!
//! This module defines all error types used throughout the library.
//! Schema configuration errors are always fatal; occurrence and field errors
//! may be downgraded to warnings depending on the build options.

use std::fmt;
use thiserror::Error;

/// Result type alias using schemaxml Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for schemaxml operations
#[derive(Error, Debug)]
pub enum Error {
    /// Mutually exclusive directives combined, or an unsupported schema shape
    #[error("schema configuration error: {0}")]
    SchemaConfig(String),

    /// Resolved occurrence count outside of the node's bounds
    #[error("{0}")]
    Occurrence(#[from] ConstraintError),

    /// Named field absent from both the accessor and the raw record
    #[error("field '{field}' not found at path {path}")]
    FieldNotFound {
        /// Field name
        field: String,
        /// Schema path where the field was read
        path: String,
    },

    /// An entity loader callable failed
    #[error("entity load error: {0}")]
    EntityLoad(String),

    /// Aggregated XSD validation failures
    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    /// XSD parsing/importing error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Relation query error
    #[error("relation error: {0}")]
    Relation(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing or writing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the build options may downgrade this error to a warning
    pub fn is_suppressible(&self) -> bool {
        matches!(
            self,
            Error::Occurrence(_) | Error::FieldNotFound { .. } | Error::EntityLoad(_)
        )
    }
}

/// Occurrence constraint violation with the schema path where it happened
#[derive(Debug, Clone)]
pub struct ConstraintError {
    /// Name of the document being generated
    pub document: String,
    /// Human readable description of the violation
    pub message: String,
    /// Schema path from the root, joined with `>`
    pub path: String,
    /// Number of resolved occurrences
    pub count: usize,
    /// Minimum number of occurrences
    pub min_occurs: u32,
    /// Maximum number of occurrences (-1 for unbounded)
    pub max_occurs: i32,
}

impl ConstraintError {
    /// Create a new constraint error
    pub fn new(message: impl Into<String>, count: usize, min_occurs: u32, max_occurs: i32) -> Self {
        Self {
            document: String::new(),
            message: message.into(),
            path: String::new(),
            count,
            min_occurs,
            max_occurs,
        }
    }

    /// Set the document name
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = document.into();
        self
    }

    /// Set the schema path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The XML for {} could not be generated, because {}. (XML path where error occurred: {})",
            self.document, self.message, self.path
        )
    }
}

impl std::error::Error for ConstraintError {}

/// Severity reported by an XSD validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// Validation warning
    Warning,
    /// Validation error
    #[default]
    Error,
    /// Fatal validation error
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// One problem reported by an XSD validator
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Validator error code
    pub code: i32,
    /// Validator message
    pub message: String,
    /// 1-based line in the validated text (0 when unknown)
    pub line: usize,
    /// Severity
    pub severity: Severity,
    /// Source lines leading up to and including the offending line
    pub context: Vec<String>,
}

impl ValidationIssue {
    /// Create a new validation issue
    pub fn new(code: i32, message: impl Into<String>, line: usize) -> Self {
        Self {
            code,
            message: message.into(),
            line,
            severity: Severity::Error,
            context: Vec::new(),
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the source context lines
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "XML validation {}: {} - {}",
            self.severity,
            self.code,
            self.message.trim_end()
        )?;
        if self.line > 0 {
            write!(f, " (line {})", self.line)?;
        }
        for line in &self.context {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Aggregate of every issue reported while validating a generated document
#[derive(Debug, Clone, Default)]
pub struct ValidationFailure {
    /// Schema the document was validated against
    pub schema_url: String,
    /// Reported issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Create a new validation failure
    pub fn new(schema_url: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            schema_url: schema_url.into(),
            issues,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generated XML does not validate against {} ({} issue(s))",
            self.schema_url,
            self.issues.len()
        )?;
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// XSD parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the schema file
    pub location: Option<String>,
    /// Schema source that caused the error
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        if let Some(ref src) = self.source {
            write!(f, "\n\nSource:\n{}", src)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_error_display() {
        let err = ConstraintError::new("the field name is required", 0, 1, 1)
            .with_document("article")
            .with_path("root>title");

        let msg = format!("{}", err);
        assert!(msg.contains("The XML for article could not be generated"));
        assert!(msg.contains("the field name is required"));
        assert!(msg.contains("root>title"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("could not find type tns:missing")
            .with_location("schema.xsd")
            .with_source("<xsd:element name='x' type='tns:missing'/>");

        let msg = format!("{}", err);
        assert!(msg.contains("could not find type"));
        assert!(msg.contains("Location:"));
        assert!(msg.contains("Source:"));
    }

    #[test]
    fn test_validation_failure_display() {
        let failure = ValidationFailure::new(
            "article.xsd",
            vec![ValidationIssue::new(1871, "Element 'x': This element is not expected.", 3)
                .with_context(vec!["<root>".to_string(), "<x/>".to_string()])],
        );

        let msg = failure.to_string();
        assert!(msg.contains("article.xsd"));
        assert!(msg.contains("1871"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("<x/>"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ConstraintError::new("x", 0, 1, 1).into();
        assert!(matches!(err, Error::Occurrence(_)));
        assert!(err.is_suppressible());
        assert!(!Error::SchemaConfig("x".into()).is_suppressible());
    }
}
