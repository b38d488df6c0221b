use std::net::SocketAddr;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("TOPO_REGISTRY_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("TOPO_REGISTRY_BIND must be a socket address")?;

        let log_level = std::env::var("TOPO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            log_level,
        })
    }
}
