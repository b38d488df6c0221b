//! Error types for loading and validating specifications.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or parsing a specification.
///
/// Loading never checks model invariants; see [`crate::validate`].
#[derive(Debug, Error)]
pub enum SpecError {
    /// The specification file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON document is malformed.
    #[error("invalid JSON specification: {0}")]
    Json(#[from] serde_json::Error),

    /// The YAML document is malformed.
    #[error("invalid YAML specification: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A single invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("application name cannot be empty")]
    EmptyName,

    #[error("service #{index} has no name")]
    UnnamedService { index: usize },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("serve target '{0}' does not match any service")]
    UnknownServeTarget(String),

    #[error("{service}: container #{index} has no image")]
    MissingImage { service: String, index: usize },

    #[error("{0}: replicas and shards are mutually exclusive")]
    ReplicasAndShards(String),
}

impl ValidationError {
    /// Name of the service the violation belongs to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            ValidationError::DuplicateService(name)
            | ValidationError::ReplicasAndShards(name) => Some(name),
            ValidationError::MissingImage { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Every violation found in one specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "specification is invalid ({} error(s))", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
