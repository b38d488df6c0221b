//! # topo-spec
//!
//! The declarative application model consumed by the topo compilers.
//!
//! ## Design Principles
//!
//! - Specifications are plain data: no behaviour beyond loading and lookup
//! - Validation is a separate function so callers can swap or skip it
//! - The wire format is camelCase JSON (YAML is accepted for local files)
//!
//! ## Model
//!
//! - [`ApplicationSpec`]: one distributed application
//! - [`ServiceSpec`]: a replicated or sharded deployable unit
//! - [`ShardSpec`]: fixed shard cardinality plus routing hints
//! - [`Container`]: image, environment and volume mounts

mod error;
mod types;
mod validate;

pub use error::{SpecError, ValidationError, ValidationErrors};
pub use types::*;
pub use validate::{validate, validate_service};
