//! topo registry library.
//!
//! The crate ships the `topo-registry` binary. The router and state are
//! exposed so integration tests can drive the API without a socket.

pub mod api;
pub mod config;
pub mod state;
