//! Specification data types and loaders.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

// =============================================================================
// Application
// =============================================================================

/// A complete distributed application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Unique identifier assigned by the author.
    #[serde(default)]
    pub guid: i64,

    /// Application name. Required and non-empty.
    pub name: String,

    /// Which service (if any) gets an externally reachable endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve: Option<ServeDirective>,

    /// Services in creation order.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl ApplicationSpec {
    /// Parse a specification from JSON.
    pub fn from_json_str(contents: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Parse a specification from YAML.
    pub fn from_yaml_str(contents: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a specification from disk.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, SpecError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Returns true if `service` is the public serve target.
    ///
    /// At most one service per application can satisfy this.
    pub fn is_public(&self, service: &ServiceSpec) -> bool {
        self.serve
            .as_ref()
            .is_some_and(|serve| serve.public && serve.name == service.name)
    }
}

/// Designates the service that receives a load-balanced endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeDirective {
    pub name: String,

    #[serde(default)]
    pub public: bool,
}

// =============================================================================
// Services
// =============================================================================

/// One deployable unit: either a replica set or a shard set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub name: String,

    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default)]
    pub ports: Vec<Port>,

    /// Stateless replica count. Mutually exclusive with `shard_spec`.
    #[serde(default)]
    pub replicas: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_spec: Option<ShardSpec>,

    /// Persistent volumes available to the containers' volume mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl ServiceSpec {
    /// Returns true if the service runs as a non-empty shard set.
    pub fn is_sharded(&self) -> bool {
        self.shard_spec.as_ref().is_some_and(|s| s.shards > 0)
    }

    /// Returns true if both replicas and a shard spec are set.
    pub fn has_conflicting_scale(&self) -> bool {
        self.replicas > 0 && self.shard_spec.is_some()
    }

    /// The first declared port, used for shard addressing.
    pub fn first_port(&self) -> Option<&Port> {
        self.ports.first()
    }
}

/// Shard set configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardSpec {
    /// Fixed number of shards.
    pub shards: u32,

    /// Optional request-path pattern forwarded to the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
}

/// A declared service port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub number: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl Port {
    pub fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Some(Protocol::Tcp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A service-level persistent volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: String,
}

// =============================================================================
// Containers
// =============================================================================

/// A container image plus its runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,

    #[serde(default)]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl Container {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable, preserving declaration order.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}
