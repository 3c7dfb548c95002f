//! XSD resource loading
//!
//! `import_xsd` accepts a file path, a `file://` URL or inline XSD text.
//! Remote URLs are recognized but only loaded when explicitly allowed,
//! and there is no HTTP client, so they currently fail with a resource error.

use std::fs;
use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};
use crate::limits::Limits;

/// Where an XSD document comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// Remote URL (http, https, ...)
    Url(Url),
    /// Inline document text
    Inline(String),
}

impl Location {
    /// Interpret a location string
    ///
    /// Text starting with `<` is inline XSD; `file://` URLs become paths;
    /// any other parseable URL is remote; everything else is a path.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim_start();
        if trimmed.starts_with('<') {
            return Ok(Location::Inline(s.to_string()));
        }

        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Resource(format!("invalid file URL '{}'", s)))?;
                return Ok(Location::Path(path));
            }
            // Windows drive letters parse as a one-letter scheme
            if url.scheme().len() > 1 {
                return Ok(Location::Url(url));
            }
        }

        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Describe the location for error messages
    pub fn describe(&self) -> String {
        match self {
            Location::Path(p) => p.display().to_string(),
            Location::Url(u) => u.to_string(),
            Location::Inline(_) => "<inline>".to_string(),
        }
    }

    /// Check if this is a remote location
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }
}

/// Loader for XSD documents
#[derive(Debug, Clone)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: false,
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Limits applied to loaded documents
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        let content = match location {
            Location::Path(path) => fs::read_to_string(path).map_err(|e| {
                Error::Resource(format!("could not load schema at '{}': {}", path.display(), e))
            })?,
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(format!(
                        "remote schemas are not allowed: {}",
                        url
                    )));
                }
                return Err(Error::Resource(format!(
                    "no transport available to fetch {}",
                    url
                )));
            }
            Location::Inline(text) => text.clone(),
        };

        self.limits.check_xsd_size(content.len())?;
        Ok(content)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_location_kinds() {
        assert!(matches!(Location::parse("/tmp/schema.xsd").unwrap(), Location::Path(_)));
        assert!(matches!(Location::parse("schemas/a.xsd").unwrap(), Location::Path(_)));
        assert!(Location::parse("http://example.com/schema.xsd").unwrap().is_remote());
        assert!(matches!(
            Location::parse("<xsd:schema/>").unwrap(),
            Location::Inline(_)
        ));
        assert_eq!(
            Location::parse("file:///tmp/schema.xsd").unwrap(),
            Location::Path(PathBuf::from("/tmp/schema.xsd"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<xsd:schema/>").unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let content = Loader::new().load(&location).unwrap();

        assert!(content.contains("<xsd:schema/>"));
    }

    #[test]
    fn test_missing_file() {
        let location = Location::Path(PathBuf::from("/nonexistent/schema.xsd"));
        let err = Loader::new().load(&location).unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn test_remote_rejected() {
        let location = Location::parse("https://example.com/a.xsd").unwrap();
        assert!(Loader::new().load(&location).is_err());
        assert!(Loader::new().with_allow_remote(true).load(&location).is_err());
    }

    #[test]
    fn test_size_limit() {
        let location = Location::Inline("x".repeat(11 * 1024 * 1024));
        let loader = Loader::new().with_limits(Limits::strict());

        // Strict limits (10 MB max) should reject 11MB of text
        assert!(matches!(loader.load(&location), Err(Error::LimitExceeded(_))));
    }
}
