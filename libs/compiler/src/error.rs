//! Error types for compiling and executing plans.

use std::path::PathBuf;

use thiserror::Error;
use topo_spec::ValidationError;

use crate::exec::ExecError;
use crate::kubernetes::ClusterError;

/// Result alias used throughout the compiler.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while compiling, executing or tailing a plan.
#[derive(Debug, Error)]
pub enum Error {
    /// The service violates a model invariant.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The backend cannot express what the service asks for.
    #[error("{service}: {backend} backend does not support {feature}")]
    Unsupported {
        backend: &'static str,
        service: String,
        feature: &'static str,
    },

    /// The backend cannot render plans without a live connection.
    #[error("{backend} plans cannot be dumped")]
    DumpUnsupported { backend: &'static str },

    /// A sharded service needs a port to build shard addresses.
    #[error("{0}: sharded services must declare at least one port")]
    MissingShardPort(String),

    /// The backend needs exactly one container and got none.
    #[error("{0}: service declares no containers")]
    NoContainers(String),

    /// Log tailing needs at least one service.
    #[error("application '{0}' has no services")]
    NoServices(String),

    /// A rendered artifact could not be serialized.
    #[error("failed to render {artifact}: {source}")]
    Render {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    /// A rendered artifact could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log output sink failed.
    #[error("log output failed: {0}")]
    Sink(#[source] std::io::Error),

    /// The cluster rejected or failed a call.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A backend command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl Error {
    /// Name of the service the error belongs to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Error::Invalid(err) => err.service(),
            Error::Unsupported { service, .. } => Some(service),
            Error::MissingShardPort(service) | Error::NoContainers(service) => Some(service),
            _ => None,
        }
    }
}
