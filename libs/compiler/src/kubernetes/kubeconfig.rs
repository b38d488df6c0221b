//! Minimal kubeconfig loading.
//!
//! Resolves the current context to one cluster endpoint and one set of
//! credentials. Exec plugins and auth providers are not supported.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use super::client::ClusterError;

/// Connection settings for the current context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeConfig {
    pub server: String,
    /// Namespace named by the context, if any.
    pub namespace: Option<String>,
    /// PEM-encoded certificate authority bundle.
    pub certificate_authority: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    pub token: Option<String>,
    /// PEM-encoded client certificate.
    pub client_certificate: Option<Vec<u8>>,
    /// PEM-encoded client key.
    pub client_key: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<Named<RawClusterEntry>>,
    #[serde(default)]
    contexts: Vec<Named<RawContextEntry>>,
    #[serde(default)]
    users: Vec<Named<RawUserEntry>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(flatten)]
    entry: T,
}

#[derive(Debug, Deserialize)]
struct RawClusterEntry {
    cluster: RawCluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCluster {
    server: String,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct RawContextEntry {
    context: RawContext,
}

#[derive(Debug, Deserialize)]
struct RawContext {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUserEntry {
    #[serde(default)]
    user: RawUser,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key_data: Option<String>,
}

impl KubeConfig {
    /// Read and resolve a kubeconfig file.
    pub fn load(path: &Path) -> Result<Self, ClusterError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::Config(format!("cannot read kubeconfig {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ClusterError> {
        let raw: RawConfig = serde_yaml::from_str(contents)
            .map_err(|e| ClusterError::Config(format!("invalid kubeconfig: {e}")))?;

        let context_name = raw
            .current_context
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ClusterError::Config("kubeconfig has no current-context".to_string()))?;

        let context = raw
            .contexts
            .into_iter()
            .find(|c| c.name == context_name)
            .map(|c| c.entry.context)
            .ok_or_else(|| ClusterError::Config(format!("context '{context_name}' not found")))?;

        let cluster = raw
            .clusters
            .into_iter()
            .find(|c| c.name == context.cluster)
            .map(|c| c.entry.cluster)
            .ok_or_else(|| {
                ClusterError::Config(format!("cluster '{}' not found", context.cluster))
            })?;

        let user = match &context.user {
            Some(name) => raw
                .users
                .into_iter()
                .find(|u| &u.name == name)
                .map(|u| u.entry.user)
                .ok_or_else(|| ClusterError::Config(format!("user '{name}' not found")))?,
            None => RawUser::default(),
        };

        Ok(Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            namespace: context.namespace,
            certificate_authority: decode("certificate-authority-data", cluster.certificate_authority_data)?,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            token: user.token,
            client_certificate: decode("client-certificate-data", user.client_certificate_data)?,
            client_key: decode("client-key-data", user.client_key_data)?,
        })
    }
}

fn decode(field: &str, value: Option<String>) -> Result<Option<Vec<u8>>, ClusterError> {
    value
        .map(|v| {
            STANDARD
                .decode(v.trim())
                .map_err(|e| ClusterError::Config(format!("invalid {field}: {e}")))
        })
        .transpose()
}
