//! Limits and constraints for document generation
//!
//! Self-referential entity loaders can make the recursive descent run
//! forever; the depth limit bounds it. The size limit protects the XSD
//! importer against oversized inputs.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum depth of the build context stack
    pub max_depth: usize,

    /// Maximum XSD file size in bytes
    pub max_xsd_size: usize,

    /// Maximum number of occurrences resolved for a single node
    pub max_occurrences: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_xsd_size: 100 * 1024 * 1024, // 100 MB
            max_occurrences: 100_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_depth: 64,
            max_xsd_size: 10 * 1024 * 1024, // 10 MB
            max_occurrences: 10_000,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_depth: 4096,
            max_xsd_size: 1024 * 1024 * 1024, // 1 GB
            max_occurrences: 10_000_000,
        }
    }

    /// Set the maximum context depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Check if the context depth is within limits
    pub fn check_depth(&self, depth: usize, path: &str) -> Result<()> {
        if depth > self.max_depth {
            Err(Error::LimitExceeded(format!(
                "schema depth {} exceeds maximum {} at {}",
                depth, self.max_depth, path
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an XSD document size is within limits
    pub fn check_xsd_size(&self, size: usize) -> Result<()> {
        if size > self.max_xsd_size {
            Err(Error::LimitExceeded(format!(
                "XSD size {} bytes exceeds maximum {} bytes",
                size, self.max_xsd_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the occurrence count of a node is within limits
    pub fn check_occurrences(&self, count: usize, path: &str) -> Result<()> {
        if count > self.max_occurrences {
            Err(Error::LimitExceeded(format!(
                "{} occurrences exceed maximum {} at {}",
                count, self.max_occurrences, path
            )))
        } else {
            Ok(())
        }
    }
}
