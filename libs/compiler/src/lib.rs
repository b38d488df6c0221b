//! # topo-compiler
//!
//! Turns an [`ApplicationSpec`](topo_spec::ApplicationSpec) into a backend
//! specific [`Plan`] and applies it.
//!
//! ## Pipeline
//!
//! 1. `Compiler::compile` / `Compiler::delete` translate the specification
//!    without touching the backend.
//! 2. `Plan::execute(dry_run)` applies every operation in a fixed order, or
//!    only renders them when `dry_run` is set.
//! 3. `Plan::dump(dir)` writes the rendered operations to disk.
//!
//! ## Backends
//!
//! - [`kubernetes`]: Deployments, StatefulSets and Services, including the
//!   sharded routing layout
//! - [`aci`]: managed container instances through the `az` CLI
//! - [`docker`]: the local container runtime through the `docker` CLI
//!
//! The [`exec`] and [`logs`] modules hold the pieces every backend shares:
//! artifact persistence, process invocation and the log-tailing harness.

pub mod aci;
mod compiler;
pub mod docker;
mod error;
pub mod exec;
pub mod kubernetes;
pub mod logs;

pub use compiler::{CompileOptions, Compiler, LogSink, Plan, PlanMode, DEFAULT_NAMESPACE};
pub use error::{Error, Result};
