//! Validation of generated documents
//!
//! XSD validation itself is delegated to an [`XsdValidator`] supplied by the
//! host. This module prepares the document so reported line numbers are
//! useful, and turns the reported problems into a [`ValidationFailure`].

use regex::Regex;

use crate::error::{Error, Result, Severity, ValidationFailure, ValidationIssue};

/// Number of lines shown before the offending line
pub const CONTEXT_LINES: usize = 5;

lazy_static::lazy_static! {
    static ref CLOSING_TAG: Regex = Regex::new(r"(</[^>]*>)").unwrap();
}

/// Validates XML text against an XSD
pub trait XsdValidator {
    /// Problems found in `xml`, empty when it is valid
    fn validate(&self, xml: &str, schema_url: &str) -> Result<Vec<ValidationIssue>>;
}

/// Break the document after every closing tag
///
/// Only positions between a closing tag and whatever follows are touched,
/// so text content (and thus enumerated values) is left unchanged.
pub fn split_lines(xml: &str) -> String {
    CLOSING_TAG.replace_all(xml, "$1\n").into_owned()
}

/// Lines leading up to and including `line` (1-based)
pub fn context_for(lines: &[&str], line: usize) -> Vec<String> {
    if line == 0 || line > lines.len() {
        return Vec::new();
    }
    let mut context = Vec::new();
    if line > 1 {
        let count = CONTEXT_LINES.min(line - 1);
        context.extend(lines[line - count - 1..line - 1].iter().map(|l| l.to_string()));
    }
    context.push(lines[line - 1].to_string());
    context
}

/// Validate a generated document
///
/// Errors and fatal errors fail the validation with every reported issue
/// attached; warnings alone are logged.
pub fn validate_document(validator: &dyn XsdValidator, xml: &str, schema_url: &str) -> Result<()> {
    let prepared = split_lines(xml);
    let issues = validator.validate(&prepared, schema_url)?;
    if issues.is_empty() {
        return Ok(());
    }

    let lines: Vec<&str> = prepared.lines().collect();
    let issues: Vec<ValidationIssue> = issues
        .into_iter()
        .map(|issue| {
            let context = context_for(&lines, issue.line);
            issue.with_context(context)
        })
        .collect();

    if issues.iter().all(|i| i.severity == Severity::Warning) {
        for issue in &issues {
            tracing::warn!(schema = schema_url, "{}", issue);
        }
        return Ok(());
    }

    Err(Error::Validation(ValidationFailure::new(schema_url, issues)))
}
