//! The backend-agnostic compiler and plan interfaces.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use topo_spec::ApplicationSpec;

use crate::error::Result;
use crate::kubernetes::SHARDER_IMAGE;

/// Destination for streamed log output.
pub type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Options shared by every backend.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory receiving rendered artifacts. `None` renders to stdout.
    pub working_dir: Option<PathBuf>,

    /// Namespace resources are created in (orchestrator backend only).
    pub namespace: String,

    /// Image run by shard routers (orchestrator backend only).
    pub router_image: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            router_image: SHARDER_IMAGE.to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Whether a plan creates or removes resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    Create,
    Delete,
}

/// Translates application specifications for one backend.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Build a creation plan. Never contacts the backend.
    fn compile(&self, options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>>;

    /// Build a teardown plan, removing resources in reverse creation order.
    fn delete(&self, options: &CompileOptions, spec: &ApplicationSpec) -> Result<Box<dyn Plan>>;

    /// Stream logs for the first service until cancelled or a fatal error.
    async fn logs(&self, spec: &ApplicationSpec, out: LogSink, err: LogSink) -> Result<()>;
}

/// A compiled, immutable set of backend operations.
#[async_trait]
pub trait Plan: Send + Sync {
    fn mode(&self) -> PlanMode;

    /// Apply every operation in order. With `dry_run` nothing with side
    /// effects runs, but artifacts are still rendered.
    async fn execute(&self, dry_run: bool) -> Result<()>;

    /// Write the rendered operations into `dir`.
    fn dump(&self, dir: &Path) -> Result<()>;
}
